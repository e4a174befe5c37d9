//! Process configuration read from the environment.
//!
//! A `.env` file in the working directory is loaded first when present;
//! variables already set in the environment win.

use crate::authorization::{AuthorizationConfig, SUPER_ROLE};
use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::connection::config::DatabaseConfig;
use crate::core::{PersistError, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const REDIS_URL: &str = "REDIS_URL";
pub const CACHE_CAPACITY: &str = "CACHE_CAPACITY";
pub const PERMISSION_TTL_SECS: &str = "PERMISSION_TTL_SECS";
pub const SUPER_ROLE_VAR: &str = "SUPER_ROLE";
pub const MIGRATIONS_DIR: &str = "MIGRATIONS_DIR";
pub const MAX_CONNECTIONS: &str = "DATABASE_MAX_CONNECTIONS";

const DEFAULT_MIGRATIONS_DIR: &str = "migrations/postgres";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheConfig {
    /// In-process LRU cache with the given capacity.
    Memory(usize),
    Redis(String),
}

impl CacheConfig {
    pub async fn connect(&self) -> Result<Arc<dyn Cache>> {
        match self {
            Self::Memory(capacity) => {
                info!(capacity, "using in-process cache");
                Ok(Arc::new(MemoryCache::new(*capacity)))
            }
            Self::Redis(url) => {
                let cache = RedisCache::connect(url).await?;
                info!("connected to redis");
                Ok(Arc::new(cache))
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub authorization: AuthorizationConfig,
    pub migrations_dir: PathBuf,
}

impl Config {
    /// Loads `.env` (if any) and reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(&std::env::vars().collect())
    }

    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let url = vars
            .get(DATABASE_URL)
            .ok_or_else(|| PersistError::Config(format!("{} is not set", DATABASE_URL)))?;
        let mut database = DatabaseConfig::from_url(url)?;
        if let Some(max) = parse_var::<usize>(vars, MAX_CONNECTIONS)? {
            database = database.max_connections(max).max_idle(max);
        }
        database.validate()?;

        let cache = match vars.get(REDIS_URL).filter(|url| !url.is_empty()) {
            Some(url) => CacheConfig::Redis(url.clone()),
            None => CacheConfig::Memory(parse_var(vars, CACHE_CAPACITY)?.unwrap_or(10_000)),
        };

        let authorization = AuthorizationConfig {
            super_role: vars
                .get(SUPER_ROLE_VAR)
                .cloned()
                .unwrap_or_else(|| SUPER_ROLE.to_string()),
            permission_ttl: parse_var::<u64>(vars, PERMISSION_TTL_SECS)?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
        };

        let migrations_dir = vars
            .get(MIGRATIONS_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATIONS_DIR));

        Ok(Self {
            database,
            cache,
            authorization,
            migrations_dir,
        })
    }
}

fn parse_var<T: std::str::FromStr>(vars: &HashMap<String, String>, name: &str) -> Result<Option<T>> {
    match vars.get(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| PersistError::Config(format!("{} has an invalid value '{}'", name, raw))),
    }
}
