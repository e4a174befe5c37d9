pub mod error;
pub mod row;
pub mod value;

pub use error::{FieldErrors, Operation, PersistError, Result, SqlError};
pub use row::Row;
pub use value::Value;
