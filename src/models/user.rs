use crate::core::{FieldErrors, PersistError, Result};
use chrono::{DateTime, Utc};
use forumdb_derive::Model;
use serde::{Deserialize, Serialize};

const PASSWORD_COST: u32 = 11;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(table = "users")]
pub struct User {
    pub id: i64,
    #[column(unique = "users_username_unique_index", validate(required))]
    pub username: String,
    #[serde(skip_serializing)]
    pub password_digest: Option<String>,
    /// Plain password from a registration request; never persisted.
    #[column(skip)]
    #[serde(skip_serializing, default)]
    pub password: String,
    #[column(unique = "users_email_unique_index", validate(required, email))]
    pub email: String,
    pub is_active: bool,
    pub avatar: Option<String>,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// An active user whose digest is the bcrypt hash of `password`.
    pub fn with_password(username: &str, email: &str, password: &str) -> Result<Self> {
        if password.is_empty() {
            let mut errors = FieldErrors::new();
            errors.insert("password".to_string(), "required".to_string());
            return Err(PersistError::Validation(errors));
        }
        let digest = bcrypt::hash(password, PASSWORD_COST).map_err(|err| {
            let mut errors = FieldErrors::new();
            errors.insert("password".to_string(), err.to_string());
            PersistError::Validation(errors)
        })?;

        Ok(Self {
            username: username.to_string(),
            email: email.to_string(),
            password_digest: Some(digest),
            is_active: true,
            ..Self::default()
        })
    }

    pub fn verify_password(&self, password: &str) -> bool {
        self.password_digest
            .as_deref()
            .is_some_and(|digest| bcrypt::verify(password, digest).unwrap_or(false))
    }
}
