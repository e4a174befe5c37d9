// ============================================================================
// forumdb
// ============================================================================

extern crate self as forumdb;

pub mod authorization;
pub mod cache;
pub mod change;
pub mod config;
pub mod connection;
pub mod constraint;
pub mod core;
pub mod executor;
pub mod migrate;
pub mod model;
pub mod models;
pub mod sql;
pub mod store;
pub mod tasks;

pub use authorization::assignments::{AssignmentState, Currency, RoleAssignments};
pub use authorization::{Actor, AuthorizationConfig, PermissionResolver};
pub use cache::{Cache, MemoryCache, RedisCache};
pub use change::{ChangeMode, ChangeSet};
pub use config::{CacheConfig, Config};
pub use connection::config::DatabaseConfig;
pub use connection::pool::{ConnectionPool, PoolGuard, PoolStats};
pub use connection::postgres::PgConnector;
pub use connection::scripted::{Reply, ScriptedConnector};
pub use connection::{Connector, SqlConnection};
pub use constraint::{map_constraint, validate_constraint};
pub use crate::core::{FieldErrors, Operation, PersistError, Result, Row, SqlError, Value};
pub use executor::{Database, Failure, Force};
pub use forumdb_derive::Model;
pub use model::{ColumnMeta, ColumnType, Model};
pub use store::{CategoryChanges, CategoryStore};

use std::sync::Arc;

// ============================================================================
// Application handle
// ============================================================================

/// Everything a request handler needs: the executor pool, the cache and the
/// services built on them.
///
/// # Examples
///
/// ```no_run
/// # async fn run() -> forumdb::Result<()> {
/// use forumdb::{Actor, Config, Forum};
///
/// let forum = Forum::connect(Config::from_env()?).await?;
/// let mut db = forum.database();
///
/// let actor = Actor { id: 7, role: "moderator".into(), role_id: 3 };
/// if forum.permissions().is_allowed(&mut db, &actor, "categories", "update").await? {
///     // ...
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Forum {
    pool: ConnectionPool,
    cache: Arc<dyn Cache>,
    permissions: Arc<PermissionResolver>,
}

impl Forum {
    /// Connects to PostgreSQL and the configured cache.
    pub async fn connect(config: Config) -> Result<Self> {
        let cache = config.cache.connect().await?;
        Self::with_connector(config, Arc::new(PgConnector), cache).await
    }

    pub async fn with_connector(
        config: Config,
        connector: Arc<dyn Connector>,
        cache: Arc<dyn Cache>,
    ) -> Result<Self> {
        let pool = ConnectionPool::new(config.database, connector).await?;
        let permissions = Arc::new(PermissionResolver::new(
            cache.clone(),
            config.authorization,
        ));
        Ok(Self {
            pool,
            cache,
            permissions,
        })
    }

    /// A fresh executor handle; each concurrent task takes its own.
    pub fn database(&self) -> Database {
        Database::new(self.pool.clone())
    }

    pub fn cache(&self) -> Arc<dyn Cache> {
        self.cache.clone()
    }

    pub fn permissions(&self) -> Arc<PermissionResolver> {
        self.permissions.clone()
    }

    pub fn categories(&self) -> CategoryStore {
        CategoryStore::new(self.cache.clone())
    }

    pub fn role_assignments(&self) -> RoleAssignments {
        RoleAssignments::new(self.permissions.clone())
    }

    pub async fn stats(&self) -> PoolStats {
        self.pool.stats().await
    }
}
