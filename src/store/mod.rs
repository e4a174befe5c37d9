mod category;

pub use category::{CategoryChanges, CategoryStore, slugify};
