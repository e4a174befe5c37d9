use chrono::{DateTime, Utc};
use forumdb_derive::Model;
use serde::{Deserialize, Serialize};

/// A controller known to the authorization tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(table = "routes")]
pub struct Route {
    pub id: i64,
    #[column(unique = "routes_name_unique", validate(required, lte = 200))]
    pub name: String,
    pub inserted_at: DateTime<Utc>,
}

impl Route {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}
