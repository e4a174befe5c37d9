use crate::cache::{self, Cache};
use crate::constraint::map_constraint;
use crate::core::{Result, Value};
use crate::executor::Database;
use crate::model::Model;
use crate::models::Category;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

const RETURNING: &str = "id, inserted_at, updated_at";

/// `"Create Category"` -> `"create-category"`.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Fields a category update may touch; `None` leaves the column alone.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub slug: Option<String>,
}

/// Category persistence with a read-through cache: `category:<id>` holds the
/// JSON record and the `categories` set lists cached ids.
pub struct CategoryStore {
    cache: Arc<dyn Cache>,
}

impl CategoryStore {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    /// Inserts `category`, generating the slug from the title when empty.
    pub async fn create(&self, db: &mut Database, mut category: Category) -> Result<Category> {
        if category.slug.is_empty() {
            category.slug = slugify(&category.title);
        }

        db.insert(&mut category, RETURNING)
            .await
            .map_err(map_constraint::<Category>)?;

        self.refresh(&category).await;
        Ok(category)
    }

    pub async fn update(
        &self,
        db: &mut Database,
        id: i64,
        changes: CategoryChanges,
    ) -> Result<Category> {
        let mut category = self.load(db, id).await?;

        let mut data = category.clone();
        if let Some(title) = changes.title {
            data.title = title;
        }
        if let Some(description) = changes.description {
            data.description = Some(description);
        }
        if let Some(slug) = changes.slug {
            data.slug = slug;
        }
        if data == category {
            return Ok(category);
        }
        data.updated_at = Utc::now();

        db.update(&mut category, &mut data, None, "updated_at")
            .await
            .map_err(map_constraint::<Category>)?;

        self.refresh(&category).await;
        Ok(category)
    }

    pub async fn delete(&self, db: &mut Database, id: i64) -> Result<()> {
        db.delete(Category::table_name(), "id = $1", &[Value::from(id)])
            .await?;

        let keys = [cache::category_key(id), cache::CATEGORIES_LOADED.to_string()];
        if let Err(err) = self.cache.del(&keys).await {
            warn!(error = %err, id, "category cache delete failed");
        }
        if let Err(err) = self.cache.srem(cache::CATEGORIES, &id.to_string()).await {
            warn!(error = %err, id, "categories set update failed");
        }
        Ok(())
    }

    /// Cached record first, then the database.
    pub async fn show(&self, db: &mut Database, id: i64) -> Result<Category> {
        match self.cache.get(&cache::category_key(id)).await {
            Ok(Some(json)) => match serde_json::from_str(&json) {
                Ok(category) => return Ok(category),
                Err(err) => warn!(error = %err, id, "discarding undecodable cached category"),
            },
            Ok(None) => {}
            Err(err) => warn!(error = %err, id, "category cache read failed"),
        }

        let category = self.load(db, id).await?;
        self.refresh(&category).await;
        Ok(category)
    }

    /// Every category, served from the cache once a full load has marked
    /// the `categories` set complete and every listed record is present.
    pub async fn cached_all(&self, db: &mut Database) -> Result<Vec<Category>> {
        if let Some(categories) = self.cached_list().await {
            debug!(count = categories.len(), "categories served from cache");
            return Ok(categories);
        }

        let categories = db
            .query_as::<Category>("select * from categories order by id", &[])
            .await?;
        for category in &categories {
            self.refresh(category).await;
        }
        if let Err(err) = self.cache.set(cache::CATEGORIES_LOADED, "true", None).await {
            warn!(error = %err, "categories marker write failed");
        }
        Ok(categories)
    }

    async fn cached_list(&self) -> Option<Vec<Category>> {
        match self.cache.get(cache::CATEGORIES_LOADED).await {
            Ok(Some(_)) => {}
            Ok(None) => return None,
            Err(err) => {
                warn!(error = %err, "categories marker read failed");
                return None;
            }
        }

        let ids = match self.cache.smembers(cache::CATEGORIES).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "categories set read failed");
                return None;
            }
        };

        let mut categories = Vec::with_capacity(ids.len());
        for id in &ids {
            let Ok(Some(json)) = self.cache.get(&format!("{}:{}", cache::CATEGORY, id)).await
            else {
                return None;
            };
            categories.push(serde_json::from_str::<Category>(&json).ok()?);
        }
        categories.sort_by_key(|c| c.id);
        Some(categories)
    }

    async fn load(&self, db: &mut Database, id: i64) -> Result<Category> {
        db.query_row_as::<Category>(
            "select c.* from categories as c where c.id = $1",
            &[Value::from(id)],
        )
        .await
    }

    async fn refresh(&self, category: &Category) {
        let json = match serde_json::to_string(category) {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, id = category.id, "category encode failed");
                return;
            }
        };
        if let Err(err) = self
            .cache
            .set(&cache::category_key(category.id), &json, None)
            .await
        {
            warn!(error = %err, id = category.id, "category cache write failed");
            return;
        }
        if let Err(err) = self
            .cache
            .sadd(cache::CATEGORIES, &category.id.to_string())
            .await
        {
            warn!(error = %err, id = category.id, "categories set update failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Create Category"), "create-category");
        assert_eq!(slugify("  Rust & Go: tips!  "), "rust-go-tips");
        assert_eq!(slugify("Çay Saati"), "çay-saati");
        assert_eq!(slugify("---"), "");
    }
}
