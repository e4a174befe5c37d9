use chrono::{DateTime, Utc};
use forumdb_derive::Model;
use serde::{Deserialize, Serialize};

/// Grants `role_id` access to one controller method.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(table = "role_permissions")]
pub struct RolePermission {
    pub id: i64,
    #[column(foreign = "fk_role_permissions_role_id", validate(required))]
    pub role_id: i64,
    #[column(validate(required, gte = 1, lte = 200))]
    pub controller: String,
    #[column(validate(required, gte = 1, lte = 10))]
    pub method: String,
    pub inserted_at: DateTime<Utc>,
}

impl RolePermission {
    pub fn new(role_id: i64, controller: &str, method: &str) -> Self {
        Self {
            role_id,
            controller: controller.to_string(),
            method: method.to_string(),
            ..Self::default()
        }
    }
}
