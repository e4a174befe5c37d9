//! Maps database constraint violations back onto model fields.

use crate::core::{FieldErrors, PersistError};
use crate::model::Model;

pub const UNIQUE_VIOLATION: &str = "23505";
pub const FOREIGN_KEY_VIOLATION: &str = "23503";
pub const NOT_NULL_VIOLATION: &str = "23502";

pub const ALREADY_TAKEN: &str = "has been already taken";
pub const DOES_NOT_EXIST: &str = "does not exists";
pub const IS_NOT_NULL: &str = "is not null";

/// Field errors for a unique / foreign-key / not-null violation reported
/// against `M`'s table, or `None` when the error names nothing on `M`.
pub fn validate_constraint<M: Model>(err: &PersistError) -> Option<FieldErrors> {
    let sql = err.sql()?;
    let code = sql.code.as_deref()?;

    let mut errors = FieldErrors::new();
    for meta in M::columns() {
        let hit = match code {
            UNIQUE_VIOLATION => sql
                .constraint
                .as_deref()
                .is_some_and(|name| meta.unique.contains(&name))
                .then_some(ALREADY_TAKEN),
            FOREIGN_KEY_VIOLATION => sql
                .constraint
                .as_deref()
                .is_some_and(|name| meta.foreign == Some(name))
                .then_some(DOES_NOT_EXIST),
            NOT_NULL_VIOLATION => sql
                .column
                .as_deref()
                .is_some_and(|column| meta.column == column)
                .then_some(IS_NOT_NULL),
            _ => None,
        };
        if let Some(reason) = hit {
            errors.insert(meta.field.to_string(), reason.to_string());
        }
    }

    (!errors.is_empty()).then_some(errors)
}

/// Turns a matching driver error into `ConstraintViolation`; anything else
/// is returned untouched.
pub fn map_constraint<M: Model>(err: PersistError) -> PersistError {
    match validate_constraint::<M>(&err) {
        Some(errors) => PersistError::ConstraintViolation(errors),
        None => err,
    }
}
