use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Field name -> reason, e.g. `{"slug": "has been already taken"}`.
pub type FieldErrors = BTreeMap<String, String>;

/// Which executor primitive produced a driver error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Query,
    Row,
    Insert,
    Update,
    Delete,
    Transaction,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Query => "query",
            Self::Row => "row",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Transaction => "transaction",
        };
        f.write_str(name)
    }
}

/// Error reported by a SQL driver.
///
/// `code` is the vendor SQLSTATE (`23505`, `23503`, ...) and `constraint` /
/// `column` carry the names the server attached to a violation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlError {
    pub code: Option<String>,
    pub constraint: Option<String>,
    pub column: Option<String>,
    pub message: String,
    pub operation: Option<Operation>,
}

impl SqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraint = Some(constraint.into());
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn during(mut self, operation: Operation) -> Self {
        self.operation = Some(operation);
        self
    }
}

impl fmt::Display for SqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.code, &self.constraint) {
            (Some(code), Some(constraint)) => {
                write!(f, "{} (sqlstate {}, constraint {})", self.message, code, constraint)
            }
            (Some(code), None) => write!(f, "{} (sqlstate {})", self.message, code),
            _ => f.write_str(&self.message),
        }
    }
}

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0:?}")]
    ConstraintViolation(FieldErrors),

    #[error("Validation failed: {0:?}")]
    Validation(FieldErrors),

    #[error("SQL error: {0}")]
    Sql(SqlError),

    #[error("Statement error: {0}")]
    Statement(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, PersistError>;

impl PersistError {
    pub fn sql(&self) -> Option<&SqlError> {
        match self {
            Self::Sql(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<SqlError> for PersistError {
    fn from(err: SqlError) -> Self {
        Self::Sql(err)
    }
}

impl From<std::io::Error> for PersistError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PersistError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
