use chrono::{DateTime, Utc};
use forumdb_derive::Model;
use serde::{Deserialize, Serialize};

/// A named role such as `user`, `moderator` or `superadmin`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(table = "roles")]
pub struct Role {
    pub id: i64,
    #[column(unique = "roles_code_unique", validate(required, lte = 32))]
    pub code: String,
    #[column(validate(required, lte = 64))]
    pub name: String,
    pub inserted_at: DateTime<Utc>,
}
