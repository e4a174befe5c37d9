use super::Cache;
use crate::core::{PersistError, Result};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, Client, RedisError};
use std::time::Duration;

/// Redis-backed cache over a reconnecting connection manager.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

fn cache_error(err: RedisError) -> PersistError {
    PersistError::Cache(err.to_string())
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let config = ConnectionManagerConfig::new().set_number_of_retries(1);

        let client = Client::open(redis_url).map_err(cache_error)?;
        let connecting = client.get_connection_manager_with_config(config);
        let connection = tokio::time::timeout(Duration::from_secs(2), connecting)
            .await
            .map_err(|_| PersistError::Cache(format!("timed out connecting to {}", redis_url)))?
            .map_err(cache_error)?;

        Ok(Self { connection })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut connection = self.connection.clone();
        connection.get(key).await.map_err(cache_error)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut connection = self.connection.clone();
        match ttl {
            Some(ttl) => connection
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(cache_error),
            None => connection
                .set::<_, _, ()>(key, value)
                .await
                .map_err(cache_error),
        }
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut connection = self.connection.clone();
        connection
            .del::<_, ()>(keys)
            .await
            .map_err(cache_error)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        connection
            .sadd::<_, _, ()>(key, member)
            .await
            .map_err(cache_error)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<()> {
        let mut connection = self.connection.clone();
        connection
            .srem::<_, _, ()>(key, member)
            .await
            .map_err(cache_error)
    }

    async fn smembers(&self, key: &str) -> Result<Vec<String>> {
        let mut connection = self.connection.clone();
        connection.smembers(key).await.map_err(cache_error)
    }
}
