//! Role-based access checks with a positive-result cache.

pub mod assignments;

use crate::cache::{self, Cache};
use crate::core::{Result, Value};
use crate::executor::Database;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const SUPER_ROLE: &str = "superadmin";

const PERMISSION_QUERY: &str = "select r.id, r.code from user_role_assignments as ra \
     inner join roles as r on ra.role_id = r.id \
     inner join role_permissions as rp on rp.role_id = r.id \
     where ra.is_current and rp.controller = :controller and rp.method = :method \
     and ra.user_id = :actor_id and ra.role_id = :role_id \
     limit 1";

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    /// Role code, e.g. `user` or `moderator`.
    pub role: String,
    pub role_id: i64,
}

#[derive(Debug, Clone)]
pub struct AuthorizationConfig {
    /// Role that bypasses permission checks.
    pub super_role: String,
    /// Lifetime of a cached grant; `None` keeps it until invalidated.
    pub permission_ttl: Option<Duration>,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            super_role: SUPER_ROLE.to_string(),
            permission_ttl: None,
        }
    }
}

/// Answers "may this actor call `controller`/`method`".
///
/// Only grants are cached. A denial always goes back to the database, so a
/// permission granted later takes effect on the next check.
pub struct PermissionResolver {
    cache: Arc<dyn Cache>,
    config: AuthorizationConfig,
}

impl PermissionResolver {
    pub fn new(cache: Arc<dyn Cache>, config: AuthorizationConfig) -> Self {
        Self { cache, config }
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    pub async fn is_allowed(
        &self,
        db: &mut Database,
        actor: &Actor,
        controller: &str,
        method: &str,
    ) -> Result<bool> {
        if actor.role == self.config.super_role {
            return Ok(true);
        }

        let key = cache::permission_key(&actor.role, actor.id, controller, method);
        match self.cache.get(&key).await {
            Ok(Some(_)) => {
                debug!(%key, "permission cache hit");
                return Ok(true);
            }
            Ok(None) => {}
            Err(err) => warn!(error = %err, %key, "permission cache read failed"),
        }

        let params = BTreeMap::from([
            ("controller".to_string(), Value::from(controller)),
            ("method".to_string(), Value::from(method)),
            ("actor_id".to_string(), Value::from(actor.id)),
            ("role_id".to_string(), Value::from(actor.role_id)),
        ]);
        let granted = !db.query_named(PERMISSION_QUERY, &params).await?.is_empty();

        if granted {
            self.remember(actor.id, &key).await;
        }
        debug!(actor = actor.id, controller, method, granted, "permission resolved");
        Ok(granted)
    }

    async fn remember(&self, actor_id: i64, key: &str) {
        if let Err(err) = self.cache.set(key, "true", self.config.permission_ttl).await {
            warn!(error = %err, %key, "permission cache write failed");
            return;
        }
        let index = cache::actor_permissions_key(actor_id);
        if let Err(err) = self.cache.sadd(&index, key).await {
            warn!(error = %err, %index, "permission index write failed");
        }
    }

    /// Drops every cached grant of `actor_id`.
    pub async fn invalidate_actor(&self, actor_id: i64) -> Result<()> {
        let index = cache::actor_permissions_key(actor_id);
        let mut keys = self.cache.smembers(&index).await?;
        keys.push(index);
        self.cache.del(&keys).await?;
        debug!(actor = actor_id, keys = keys.len() - 1, "permission cache invalidated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;

    #[test]
    fn test_invalidate_actor_leaves_other_actors() {
        tokio_test::block_on(async {
            let cache = Arc::new(MemoryCache::default());
            let resolver = PermissionResolver::new(cache.clone(), AuthorizationConfig::default());
            let own = cache::permission_key("user", 7, "categories", "index");
            let other = cache::permission_key("user", 8, "categories", "index");
            resolver.remember(7, &own).await;
            resolver.remember(8, &other).await;

            resolver.invalidate_actor(7).await.unwrap();

            assert!(cache.get(&own).await.unwrap().is_none());
            assert!(cache.get(&other).await.unwrap().is_some());
            assert!(cache.smembers(&cache::actor_permissions_key(7)).await.unwrap().is_empty());
        });
    }
}
