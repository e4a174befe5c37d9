//! Field rules called from derived `Model::validate`.
//!
//! Each rule returns the reason string stored under the field name, in the
//! `tag` or `tag: param` form.

use super::ColumnType;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref EMAIL: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("email pattern compiles");
}

pub fn required<T: ColumnType>(value: &T) -> Option<String> {
    value.is_blank().then(|| "required".to_string())
}

pub fn gte<T: ColumnType>(value: &T, bound: i64) -> Option<String> {
    match value.measure() {
        Some(measure) if measure < bound => Some(format!("gte: {}", bound)),
        _ => None,
    }
}

pub fn lte<T: ColumnType>(value: &T, bound: i64) -> Option<String> {
    match value.measure() {
        Some(measure) if measure > bound => Some(format!("lte: {}", bound)),
        _ => None,
    }
}

pub fn email<T: ColumnType>(value: &T) -> Option<String> {
    match value.as_text() {
        Some(text) if !EMAIL.is_match(text) => Some("email".to_string()),
        _ => None,
    }
}
