use chrono::{DateTime, Utc};
use forumdb_derive::Model;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Model)]
#[model(table = "categories")]
pub struct Category {
    pub id: i64,
    #[column(validate(required, gte = 3, lte = 128))]
    pub title: String,
    #[column(validate(lte = 240))]
    pub description: Option<String>,
    #[column(unique = "categories_slug_unique")]
    pub slug: String,
    pub inserted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Category {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }
}
