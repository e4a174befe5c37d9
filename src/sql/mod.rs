//! INSERT / UPDATE synthesis over a change set's column list.
//!
//! Statements use `:column` named placeholders; [`NamedStatement`] rewrites
//! them to the driver's positional form and binds values from a model.

mod named;

pub use named::NamedStatement;

use crate::core::{PersistError, Result};
use lazy_static::lazy_static;
use regex::Regex;

pub const DEFAULT_WHERE: &str = "id = :id";

lazy_static! {
    static ref IDENTIFIER: Regex =
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?$")
            .expect("identifier pattern compiles");
}

fn check_identifier(kind: &str, name: &str) -> Result<()> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(PersistError::Statement(format!("invalid {} name '{}'", kind, name)))
    }
}

fn returning_clause(returning: &str) -> Result<String> {
    let returning = returning.trim();
    if returning.is_empty() {
        return Ok(String::new());
    }
    for key in returning.split(',').map(str::trim) {
        if key != "*" {
            check_identifier("returning column", key)?;
        }
    }
    Ok(format!(" returning {}", returning))
}

/// `insert into <table> (<c1>, <c2> ) values (:c1, :c2 ) [returning ...]`
pub fn build_insert<S: AsRef<str>>(columns: &[S], table: &str, returning: &str) -> Result<String> {
    check_identifier("table", table)?;
    for column in columns {
        check_identifier("column", column.as_ref())?;
    }

    let returning = returning_clause(returning)?;
    if columns.is_empty() {
        return Ok(format!("insert into {} default values{}", table, returning));
    }

    let names = columns
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = columns
        .iter()
        .map(|c| format!(":{}", c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "insert into {} ({} ) values ({} ){}",
        table, names, placeholders, returning
    ))
}

/// `update <table> set <c1> = :c1, ... where <where_clause> [returning ...]`
///
/// `where_clause` is caller-supplied SQL and is not validated.
pub fn build_update<S: AsRef<str>>(
    columns: &[S],
    table: &str,
    where_clause: &str,
    returning: &str,
) -> Result<String> {
    check_identifier("table", table)?;
    if columns.is_empty() {
        return Err(PersistError::Statement(format!(
            "update of {} has no columns to set",
            table
        )));
    }
    for column in columns {
        check_identifier("column", column.as_ref())?;
    }
    if where_clause.trim().is_empty() {
        return Err(PersistError::Statement("update requires a where clause".into()));
    }

    let assignments = columns
        .iter()
        .map(|c| format!("{0} = :{0}", c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!(
        "update {} set {} where {}{}",
        table,
        assignments,
        where_clause.trim(),
        returning_clause(returning)?
    ))
}

/// `delete from <table> where <where_clause>`
pub fn build_delete(table: &str, where_clause: &str) -> Result<String> {
    check_identifier("table", table)?;
    if where_clause.trim().is_empty() {
        return Err(PersistError::Statement("delete requires a where clause".into()));
    }
    Ok(format!("delete from {} where {}", table, where_clause.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_shape() {
        let sql = build_insert(&["title", "slug"], "categories", "id").unwrap();
        assert_eq!(
            sql,
            "insert into categories (title, slug ) values (:title, :slug ) returning id"
        );
    }

    #[test]
    fn test_insert_without_returning() {
        let sql = build_insert(&["title"], "categories", "").unwrap();
        assert_eq!(sql, "insert into categories (title ) values (:title )");
    }

    #[test]
    fn test_update_shape() {
        let sql = build_update(
            &["title", "description"],
            "categories",
            DEFAULT_WHERE,
            "id, updated_at",
        )
        .unwrap();
        assert_eq!(
            sql,
            "update categories set title = :title, description = :description where id = :id returning id, updated_at"
        );
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        assert!(build_insert(&["title; drop table x"], "categories", "id").is_err());
        assert!(build_insert(&["title"], "categories", "id) --").is_err());
        assert!(build_update::<&str>(&[], "categories", DEFAULT_WHERE, "").is_err());
    }
}
