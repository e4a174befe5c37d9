use super::{Connector, SqlConnection, config::DatabaseConfig};
use crate::core::{Operation, PersistError, Result};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

type Idle = Arc<Mutex<VecDeque<PooledConnection>>>;

/// Connection pool
///
/// Hands out driver connections up to `max_connections`, keeps at most
/// `max_idle` of them once returned and retires connections that sat idle or
/// lived too long.
#[derive(Clone)]
pub struct ConnectionPool {
    config: Arc<DatabaseConfig>,
    connector: Arc<dyn Connector>,
    available: Idle,
    total_connections: Arc<AtomicUsize>,
}

struct PooledConnection {
    connection: Box<dyn SqlConnection>,
    created_at: Instant,
    last_used: Instant,
}

impl PooledConnection {
    fn new(connection: Box<dyn SqlConnection>, created_at: Instant) -> Self {
        Self {
            connection,
            created_at,
            last_used: Instant::now(),
        }
    }

    fn is_expired(&self, max_lifetime: Option<Duration>) -> bool {
        max_lifetime.is_some_and(|lifetime| self.created_at.elapsed() > lifetime)
    }

    fn is_idle_too_long(&self, idle_timeout: Option<Duration>) -> bool {
        idle_timeout.is_some_and(|timeout| self.last_used.elapsed() > timeout)
    }
}

impl ConnectionPool {
    pub async fn new(config: DatabaseConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;

        let pool = Self {
            config: Arc::new(config),
            connector,
            available: Arc::new(Mutex::new(VecDeque::new())),
            total_connections: Arc::new(AtomicUsize::new(0)),
        };

        pool.ensure_min_connections().await?;

        Ok(pool)
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Waits up to `connect_timeout` for a free connection.
    pub async fn get_connection(&self) -> Result<PoolGuard> {
        let start = Instant::now();

        loop {
            if let Some(pooled) = self.try_get_available().await {
                return Ok(self.guard(pooled.connection, pooled.created_at));
            }

            if let Some(connection) = self.try_create_connection().await? {
                return Ok(self.guard(connection, Instant::now()));
            }

            if start.elapsed() > self.config.connect_timeout {
                return Err(PersistError::Pool(
                    "Connection pool timeout: no connections available".into(),
                ));
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    fn guard(&self, connection: Box<dyn SqlConnection>, created_at: Instant) -> PoolGuard {
        PoolGuard {
            connection: Some(connection),
            created_at,
            in_transaction: false,
            pool: self.available.clone(),
            total_connections: self.total_connections.clone(),
            max_idle: self.config.max_idle,
        }
    }

    async fn try_get_available(&self) -> Option<PooledConnection> {
        let mut available = self.available.lock().await;

        let before = available.len();
        available.retain(|pooled| {
            !(pooled.is_expired(self.config.max_lifetime)
                || pooled.is_idle_too_long(self.config.idle_timeout)
                || pooled.connection.is_closed())
        });
        let removed = before - available.len();

        if removed > 0 {
            debug!(removed, "retired pooled connections");
            self.total_connections.fetch_sub(removed, Ordering::SeqCst);
        }

        available.pop_front()
    }

    async fn try_create_connection(&self) -> Result<Option<Box<dyn SqlConnection>>> {
        let reserved = self
            .total_connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |total| {
                (total < self.config.max_connections).then_some(total + 1)
            })
            .is_ok();
        if !reserved {
            return Ok(None);
        }

        match self.connector.connect(&self.config).await {
            Ok(connection) => Ok(Some(connection)),
            Err(err) => {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                Err(err)
            }
        }
    }

    async fn ensure_min_connections(&self) -> Result<()> {
        let mut available = self.available.lock().await;

        while self.total_connections.load(Ordering::SeqCst) < self.config.min_connections {
            let connection = self.connector.connect(&self.config).await?;
            available.push_back(PooledConnection::new(connection, Instant::now()));
            self.total_connections.fetch_add(1, Ordering::SeqCst);
        }

        Ok(())
    }

    pub async fn stats(&self) -> PoolStats {
        let available = self.available.lock().await;
        let total = self.total_connections.load(Ordering::SeqCst);

        PoolStats {
            total_connections: total,
            available_connections: available.len(),
            active_connections: total.saturating_sub(available.len()),
            max_connections: self.config.max_connections,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub total_connections: usize,
    pub available_connections: usize,
    pub active_connections: usize,
    pub max_connections: usize,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool Stats: {}/{} active, {} available, max {}",
            self.active_connections,
            self.total_connections,
            self.available_connections,
            self.max_connections
        )
    }
}

/// RAII guard for pooled connections
///
/// Returns the connection to the pool when dropped. A guard dropped inside an
/// open transaction discards its connection; call [`PoolGuard::close`] to roll
/// back and keep it.
pub struct PoolGuard {
    connection: Option<Box<dyn SqlConnection>>,
    created_at: Instant,
    in_transaction: bool,
    pool: Idle,
    total_connections: Arc<AtomicUsize>,
    max_idle: usize,
}

impl PoolGuard {
    pub fn connection(&mut self) -> Result<&mut dyn SqlConnection> {
        match self.connection.as_mut() {
            Some(connection) => Ok(&mut **connection),
            None => Err(PersistError::Pool("Connection already returned to pool".into())),
        }
    }

    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub async fn begin(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(PersistError::Transaction("Transaction already active".into()));
        }
        self.control("begin").await?;
        self.in_transaction = true;
        Ok(())
    }

    pub async fn commit(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(PersistError::Transaction("No active transaction".into()));
        }
        let outcome = self.control("commit").await;
        self.in_transaction = false;
        outcome
    }

    pub async fn rollback(&mut self) -> Result<()> {
        if !self.in_transaction {
            return Err(PersistError::Transaction("No active transaction".into()));
        }
        let outcome = self.control("rollback").await;
        self.in_transaction = false;
        outcome
    }

    async fn control(&mut self, statement: &str) -> Result<()> {
        self.connection()?
            .batch_execute(statement)
            .await
            .map_err(|err| PersistError::Sql(err.during(Operation::Transaction)))
    }

    /// Rolls back an open transaction and returns the connection to the pool.
    pub async fn close(mut self) -> Result<()> {
        let outcome = if self.in_transaction {
            self.rollback().await
        } else {
            Ok(())
        };

        if let Some(connection) = self.connection.take() {
            if outcome.is_err() || connection.is_closed() {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
                return outcome;
            }
            let mut pool = self.pool.lock().await;
            if pool.len() < self.max_idle {
                pool.push_back(PooledConnection::new(connection, self.created_at));
            } else {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
        outcome
    }
}

impl Drop for PoolGuard {
    fn drop(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        if self.in_transaction {
            warn!("PoolGuard dropped with an open transaction; discarding connection");
            self.total_connections.fetch_sub(1, Ordering::SeqCst);
            return;
        }

        match self.pool.try_lock() {
            Ok(mut pool) if pool.len() < self.max_idle && !connection.is_closed() => {
                pool.push_back(PooledConnection::new(connection, self.created_at));
            }
            Ok(_) => {
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
            Err(_) => {
                warn!("PoolGuard dropped while the pool lock was busy; discarding connection");
                self.total_connections.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }
}
