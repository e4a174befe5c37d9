mod database;
mod force;

pub use database::Database;
pub use force::{Failure, Force};
