//! The model contract.
//!
//! A model is a plain struct with `#[derive(Model)]`. Each persisted field
//! maps to a column; the derive generates the change-set builder, named
//! parameter lookup, row scanning and struct validation.
//!
//! ```ignore
//! #[derive(Debug, Clone, Default, Model)]
//! #[model(table = "categories")]
//! pub struct Category {
//!     pub id: i64,
//!     #[column(validate(required, gte = 3, lte = 128))]
//!     pub title: String,
//!     #[column(unique = "categories_slug_unique")]
//!     pub slug: String,
//! }
//! ```

mod column;
pub mod validate;

pub use column::ColumnType;

use crate::change::{ChangeMode, ChangeSet};
use crate::core::{FieldErrors, Result, Row, Value};

/// Static description of one persisted column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMeta {
    pub field: &'static str,
    pub column: &'static str,
    /// Unique constraint names guarding this column.
    pub unique: &'static [&'static str],
    /// Foreign-key constraint name guarding this column.
    pub foreign: Option<&'static str>,
    /// `validate(required)`.
    pub required: bool,
}

pub trait Model: Default + Clone + Send + Sync + 'static {
    fn table_name() -> &'static str;

    /// Persisted columns in declaration order, the id column included.
    fn columns() -> &'static [ColumnMeta];

    /// Server-assigned identifier; `None` for models keyed by another column.
    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    /// Diffs `self` (the original) against `requested` and copies every
    /// changed value onto `self`. The id field never takes part.
    fn compute_changes(&mut self, requested: &Self, mode: ChangeMode) -> ChangeSet;

    /// Current value of a persisted column, used to bind named parameters.
    fn column_value(&self, column: &str) -> Option<Value>;

    /// Assigns a column from a result row. Returns `false` for unknown columns.
    fn assign(&mut self, column: &str, value: &Value) -> Result<bool>;

    /// Struct-level validation rules (`required`, `gte`, `lte`, `email`).
    fn validate(&self) -> std::result::Result<(), FieldErrors>;

    fn scan(&mut self, row: &Row) -> Result<()> {
        for (column, value) in row.iter() {
            self.assign(column, value)?;
        }
        Ok(())
    }

    fn from_row(row: &Row) -> Result<Self> {
        let mut model = Self::default();
        model.scan(row)?;
        Ok(model)
    }

    fn column_meta(column: &str) -> Option<&'static ColumnMeta> {
        Self::columns().iter().find(|meta| meta.column == column)
    }
}
