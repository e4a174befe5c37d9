use crate::change::ChangeMode;
use crate::core::{PersistError, Result, Value};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A Rust type that can live in a persisted column.
///
/// The change rules of the diff builder are expressed per type here, so the
/// derived `Model::compute_changes` only has to call `is_changed` per field.
pub trait ColumnType: Clone + PartialEq + Default + Send + Sync + 'static {
    /// Emitted in insert mode even when the value looks empty (foreign keys).
    const ALWAYS_ON_INSERT: bool = false;

    fn to_value(&self) -> Value;

    fn from_value(value: &Value) -> Result<Self>;

    /// Inserts look at `requested` alone; updates diff against `original`.
    fn is_changed(original: &Self, requested: &Self, mode: ChangeMode) -> bool {
        match mode {
            ChangeMode::Insert => *requested != Self::default(),
            ChangeMode::Update => original != requested,
        }
    }

    /// Whether a `Some(value)` counts as a real value for nullable columns.
    fn is_present(&self) -> bool {
        true
    }

    /// Zero value as far as `required` validation is concerned.
    fn is_blank(&self) -> bool;

    /// Length for text, magnitude for integers; used by `gte` / `lte`.
    fn measure(&self) -> Option<i64> {
        None
    }

    fn as_text(&self) -> Option<&str> {
        None
    }
}

fn mismatch<T>(expected: &str, value: &Value) -> Result<T> {
    Err(PersistError::Decode(format!(
        "expected {}, got {}",
        expected,
        value.type_name()
    )))
}

impl ColumnType for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Text(s) => Ok(s.clone()),
            Value::Null => Ok(String::new()),
            other => mismatch("TEXT", other),
        }
    }

    fn is_present(&self) -> bool {
        !self.is_empty()
    }

    fn is_blank(&self) -> bool {
        self.is_empty()
    }

    fn measure(&self) -> Option<i64> {
        Some(self.chars().count() as i64)
    }

    fn as_text(&self) -> Option<&str> {
        Some(self)
    }
}

impl ColumnType for i64 {
    const ALWAYS_ON_INSERT: bool = true;

    fn to_value(&self) -> Value {
        Value::Integer(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(i) => Ok(*i),
            Value::Null => Ok(0),
            other => mismatch("INTEGER", other),
        }
    }

    fn is_present(&self) -> bool {
        *self != 0
    }

    fn is_blank(&self) -> bool {
        *self == 0
    }

    fn measure(&self) -> Option<i64> {
        Some(*self)
    }
}

impl ColumnType for i32 {
    const ALWAYS_ON_INSERT: bool = true;

    fn to_value(&self) -> Value {
        Value::Integer(*self as i64)
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Integer(i) => i32::try_from(*i)
                .map_err(|_| PersistError::Decode(format!("{} overflows a 32-bit column", i))),
            Value::Null => Ok(0),
            other => mismatch("INTEGER", other),
        }
    }

    fn is_present(&self) -> bool {
        *self != 0
    }

    fn is_blank(&self) -> bool {
        *self == 0
    }

    fn measure(&self) -> Option<i64> {
        Some(*self as i64)
    }
}

impl ColumnType for bool {
    fn to_value(&self) -> Value {
        Value::Boolean(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Boolean(b) => Ok(*b),
            Value::Null => Ok(false),
            other => mismatch("BOOLEAN", other),
        }
    }

    // `false` is a real value, so inserts always carry it.
    fn is_changed(original: &Self, requested: &Self, mode: ChangeMode) -> bool {
        mode == ChangeMode::Insert || original != requested
    }

    fn is_blank(&self) -> bool {
        !*self
    }
}

impl ColumnType for Decimal {
    fn to_value(&self) -> Value {
        Value::Decimal(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Decimal(d) => Ok(*d),
            Value::Integer(i) => Ok(Decimal::from(*i)),
            Value::Null => Ok(Decimal::ZERO),
            other => mismatch("DECIMAL", other),
        }
    }

    fn is_blank(&self) -> bool {
        self.is_zero()
    }
}

impl ColumnType for DateTime<Utc> {
    fn to_value(&self) -> Value {
        Value::Timestamp(*self)
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Timestamp(t) => Ok(*t),
            Value::Text(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|err| PersistError::Decode(format!("invalid timestamp '{}': {}", s, err))),
            Value::Null => Ok(DateTime::<Utc>::default()),
            other => mismatch("TIMESTAMP", other),
        }
    }

    fn is_blank(&self) -> bool {
        *self == DateTime::<Utc>::default()
    }
}

/// Nullable column: `None` is SQL NULL and never produces a change.
impl<T: ColumnType> ColumnType for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(value) => value.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }

    fn is_changed(original: &Self, requested: &Self, mode: ChangeMode) -> bool {
        let Some(value) = requested else {
            return false;
        };
        match mode {
            ChangeMode::Insert => T::ALWAYS_ON_INSERT || value.is_present(),
            ChangeMode::Update => original != requested && value.is_present(),
        }
    }

    fn is_blank(&self) -> bool {
        self.as_ref().is_none_or(T::is_blank)
    }

    fn measure(&self) -> Option<i64> {
        self.as_ref().and_then(T::measure)
    }

    fn as_text(&self) -> Option<&str> {
        self.as_ref().and_then(T::as_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nullable_text_needs_non_empty_request() {
        let original = Some("old".to_string());
        assert!(!Option::<String>::is_changed(&original, &Some(String::new()), ChangeMode::Update));
        assert!(!Option::<String>::is_changed(&original, &None, ChangeMode::Update));
        assert!(Option::<String>::is_changed(&original, &Some("new".into()), ChangeMode::Update));
    }

    #[test]
    fn test_nullable_int_zero_only_on_insert() {
        assert!(!Option::<i64>::is_changed(&None, &Some(0), ChangeMode::Update));
        assert!(Option::<i64>::is_changed(&None, &Some(0), ChangeMode::Insert));
        assert!(Option::<i64>::is_changed(&Some(1), &Some(2), ChangeMode::Update));
        assert!(!Option::<i64>::is_changed(&Some(2), &Some(2), ChangeMode::Update));
    }

    #[test]
    fn test_bool_compares_on_update() {
        assert!(!bool::is_changed(&true, &true, ChangeMode::Update));
        assert!(bool::is_changed(&false, &true, ChangeMode::Update));
        assert!(bool::is_changed(&false, &false, ChangeMode::Insert));
        assert!(Option::<bool>::is_changed(&None, &Some(false), ChangeMode::Update));
        assert!(!Option::<bool>::is_changed(&Some(false), &Some(false), ChangeMode::Update));
    }

    #[test]
    fn test_decode_roundtrip_types() {
        assert_eq!(i32::from_value(&Value::Integer(5)).unwrap(), 5);
        assert!(i32::from_value(&Value::Integer(i64::MAX)).is_err());
        assert_eq!(String::from_value(&Value::Null).unwrap(), "");
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert!(bool::from_value(&Value::Text("x".into())).is_err());
    }
}
