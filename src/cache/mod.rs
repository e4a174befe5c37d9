//! Key/value cache contract and its drivers.
//!
//! Values are opaque strings (JSON for cached records). Set-typed keys back
//! list caches and the per-actor permission index.

mod memory;
mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

use crate::core::Result;
use async_trait::async_trait;
use std::time::Duration;

pub const PERMISSION_NAMESPACE: &str = "user:permission";
pub const ACTOR_PERMISSIONS: &str = "user:permissions";
pub const CATEGORIES: &str = "categories";
/// Present once the `categories` set lists every row of the table.
pub const CATEGORIES_LOADED: &str = "categories:loaded";
pub const CATEGORY: &str = "category";
pub const ROUTES: &str = "routes";

#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// `ttl: None` keeps the value until it is deleted or evicted.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    async fn del(&self, keys: &[String]) -> Result<()>;

    async fn sadd(&self, key: &str, member: &str) -> Result<()>;

    async fn srem(&self, key: &str, member: &str) -> Result<()>;

    async fn smembers(&self, key: &str) -> Result<Vec<String>>;
}

/// `user:permission:<role>:<actor>:<controller>:<method>`
pub fn permission_key(role: &str, actor_id: i64, controller: &str, method: &str) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        PERMISSION_NAMESPACE, role, actor_id, controller, method
    )
}

/// `user:permissions:<actor>`, the set of an actor's cached grant keys.
pub fn actor_permissions_key(actor_id: i64) -> String {
    format!("{}:{}", ACTOR_PERMISSIONS, actor_id)
}

pub fn category_key(id: i64) -> String {
    format!("{}:{}", CATEGORY, id)
}

pub fn route_key(name: &str) -> String {
    format!("{}:{}", ROUTES, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_key_layout() {
        assert_eq!(
            permission_key("moderator", 7, "categories", "update"),
            "user:permission:moderator:7:categories:update"
        );
        assert_eq!(actor_permissions_key(7), "user:permissions:7");
        assert_eq!(category_key(3), "category:3");
    }
}
