//! In-process driver whose answers come from a closure.
//!
//! Lets the executor run without a server. Every statement is recorded in
//! order.

use super::{Connector, SqlConnection, config::DatabaseConfig};
use crate::core::{Result, Row, SqlError, Value};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// What the handler answers for one statement.
#[derive(Debug, Clone)]
pub enum Reply {
    Rows(Vec<Row>),
    Affected(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
    pub connection: usize,
    pub sql: String,
    pub params: Vec<Value>,
}

type Handler = dyn Fn(&str, &[Value]) -> std::result::Result<Reply, SqlError> + Send + Sync;

pub struct ScriptedConnector {
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<ExecutedStatement>>>,
    opened: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> std::result::Result<Reply, SqlError> + Send + Sync + 'static,
    {
        Self {
            handler: Arc::new(handler),
            log: Arc::new(Mutex::new(Vec::new())),
            opened: AtomicUsize::new(0),
        }
    }

    /// Every statement sent so far, transaction control included.
    pub fn statements(&self) -> Vec<ExecutedStatement> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Statements other than `begin` / `commit` / `rollback`.
    pub fn queries(&self) -> Vec<ExecutedStatement> {
        self.statements()
            .into_iter()
            .filter(|s| !matches!(s.sql.as_str(), "begin" | "commit" | "rollback"))
            .collect()
    }

    pub fn clear(&self) {
        if let Ok(mut log) = self.log.lock() {
            log.clear();
        }
    }

    pub fn connections_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _config: &DatabaseConfig) -> Result<Box<dyn SqlConnection>> {
        let id = self.opened.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Box::new(ScriptedConnection {
            id,
            handler: self.handler.clone(),
            log: self.log.clone(),
        }))
    }
}

struct ScriptedConnection {
    id: usize,
    handler: Arc<Handler>,
    log: Arc<Mutex<Vec<ExecutedStatement>>>,
}

impl ScriptedConnection {
    fn record(&self, sql: &str, params: &[Value]) {
        if let Ok(mut log) = self.log.lock() {
            log.push(ExecutedStatement {
                connection: self.id,
                sql: sql.to_string(),
                params: params.to_vec(),
            });
        }
    }
}

#[async_trait]
impl SqlConnection for ScriptedConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> std::result::Result<Vec<Row>, SqlError> {
        self.record(sql, params);
        match (self.handler)(sql, params)? {
            Reply::Rows(rows) => Ok(rows),
            Reply::Affected(_) => Ok(Vec::new()),
        }
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> std::result::Result<u64, SqlError> {
        self.record(sql, params);
        match (self.handler)(sql, params)? {
            Reply::Rows(rows) => Ok(rows.len() as u64),
            Reply::Affected(count) => Ok(count),
        }
    }

    async fn batch_execute(&mut self, sql: &str) -> std::result::Result<(), SqlError> {
        self.record(sql, &[]);
        Ok(())
    }
}
