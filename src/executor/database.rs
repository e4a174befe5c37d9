use crate::change::ChangeMode;
use crate::connection::Connector;
use crate::connection::config::DatabaseConfig;
use crate::connection::pool::{ConnectionPool, PoolGuard};
use crate::core::{Operation, PersistError, Result, Row, SqlError, Value};
use crate::model::Model;
use crate::sql::{self, NamedStatement};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Executor handle
///
/// Statements outside a transaction borrow a pooled connection for their
/// own duration. Inside [`Database::transaction`] the handle pins one
/// connection until commit or rollback.
pub struct Database {
    pool: ConnectionPool,
    tx: TxState,
    last_error: Option<String>,
}

/// Transaction state of a handle.
enum TxState {
    Idle,
    Open(PoolGuard),
    /// Rolled back after a failed statement; everything else the callback
    /// sends is rejected until the outermost `transaction` returns.
    Aborted,
}

const ABORTED: &str = "transaction was rolled back after a failed statement";

impl Database {
    pub fn new(pool: ConnectionPool) -> Self {
        Self {
            pool,
            tx: TxState::Idle,
            last_error: None,
        }
    }

    pub async fn connect(config: DatabaseConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        Ok(Self::new(ConnectionPool::new(config, connector).await?))
    }

    /// A fresh handle on the same pool, with no open transaction.
    pub fn handle(&self) -> Self {
        Self::new(self.pool.clone())
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    pub fn in_transaction(&self) -> bool {
        !matches!(self.tx, TxState::Idle)
    }

    /// Message of the last failed statement on this handle.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Rows of a positional (`$n`) query, columns in select order.
    pub async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.fetch(Operation::Query, sql, params).await
    }

    /// Like [`Database::query`] with `:name` placeholders bound from `params`.
    pub async fn query_named(
        &mut self,
        sql: &str,
        params: &BTreeMap<String, Value>,
    ) -> Result<Vec<Row>> {
        let statement = NamedStatement::parse(sql);
        let values = statement.bind_map(params)?;
        self.fetch(Operation::Query, statement.sql(), &values).await
    }

    /// First row, or `NotFound` when the query returns nothing.
    pub async fn query_row(&mut self, sql: &str, params: &[Value]) -> Result<Row> {
        self.fetch(Operation::Row, sql, params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PersistError::NotFound(summarize(sql)))
    }

    pub async fn query_as<M: Model>(&mut self, sql: &str, params: &[Value]) -> Result<Vec<M>> {
        self.query(sql, params)
            .await?
            .iter()
            .map(M::from_row)
            .collect()
    }

    pub async fn query_row_as<M: Model>(&mut self, sql: &str, params: &[Value]) -> Result<M> {
        let row = self.query_row(sql, params).await?;
        M::from_row(&row)
    }

    pub async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64> {
        self.run(Operation::Query, sql, params).await
    }

    /// Runs parameterless statements such as migration scripts.
    pub async fn batch_execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %summarize(sql), "batch");
        let outcome = match &mut self.tx {
            TxState::Open(guard) => guard.connection()?.batch_execute(sql).await,
            TxState::Aborted => return Err(PersistError::Transaction(ABORTED.into())),
            TxState::Idle => {
                let mut guard = self.pool.get_connection().await?;
                let outcome = guard.connection()?.batch_execute(sql).await;
                guard.close().await?;
                outcome
            }
        };
        match outcome {
            Ok(()) => Ok(()),
            Err(err) => Err(self.fail(err.during(Operation::Query)).await),
        }
    }

    /// Inserts every populated field of `data` and scans the `returning`
    /// columns (for example `"id, inserted_at"`) back into it.
    pub async fn insert<M: Model>(&mut self, data: &mut M, returning: &str) -> Result<()> {
        data.validate().map_err(PersistError::Validation)?;

        let mut blank = M::default();
        let changes = blank.compute_changes(data, ChangeMode::Insert);
        let named = sql::build_insert(&changes.columns, M::table_name(), returning)?;
        let statement = NamedStatement::parse(&named);
        let params = statement.bind(data)?;

        if returning.trim().is_empty() {
            self.run(Operation::Insert, statement.sql(), &params).await?;
            return Ok(());
        }

        let rows = self
            .fetch(Operation::Insert, statement.sql(), &params)
            .await?;
        if let Some(row) = rows.first() {
            data.scan(row)?;
        }
        Ok(())
    }

    /// Writes the fields of `data` that differ from `model`.
    ///
    /// `model` receives the merged row once the statement succeeds; `data`
    /// gets `model`'s id and the `returning` columns. Nothing is sent when no
    /// field changed. An update that matches no row is `NotFound`.
    pub async fn update<M: Model>(
        &mut self,
        model: &mut M,
        data: &mut M,
        where_override: Option<&str>,
        returning: &str,
    ) -> Result<()> {
        if let Some(id) = model.id() {
            data.set_id(id);
        }

        let mut merged = model.clone();
        let changes = merged.compute_changes(data, ChangeMode::Update);
        if changes.is_empty() {
            debug!(table = M::table_name(), "update skipped, nothing changed");
            return Ok(());
        }
        merged.validate().map_err(PersistError::Validation)?;

        let named = sql::build_update(
            &changes.columns,
            M::table_name(),
            where_override.unwrap_or(sql::DEFAULT_WHERE),
            returning,
        )?;
        let statement = NamedStatement::parse(&named);
        let params = statement.bind(&merged)?;

        if returning.trim().is_empty() {
            let affected = self.run(Operation::Update, statement.sql(), &params).await?;
            if affected == 0 {
                return Err(PersistError::NotFound(format!("{} row to update", M::table_name())));
            }
        } else {
            let rows = self
                .fetch(Operation::Update, statement.sql(), &params)
                .await?;
            let row = rows.first().ok_or_else(|| {
                PersistError::NotFound(format!("{} row to update", M::table_name()))
            })?;
            merged.scan(row)?;
            data.scan(row)?;
        }

        *model = merged;
        Ok(())
    }

    /// `delete from <table> where <where_clause>`; no matching row is `NotFound`.
    pub async fn delete(&mut self, table: &str, where_clause: &str, args: &[Value]) -> Result<u64> {
        let statement = sql::build_delete(table, where_clause)?;
        let affected = self.run(Operation::Delete, &statement, args).await?;
        if affected == 0 {
            return Err(PersistError::NotFound(format!("{} row to delete", table)));
        }
        Ok(affected)
    }

    /// Runs `f` inside a transaction: `Err` rolls back and is returned
    /// unchanged, `Ok` commits.
    ///
    /// Called on a handle that already has an open transaction, `f` joins it
    /// and the outer call decides the outcome. The future returned by `f` may
    /// only borrow the handle; move anything else into it.
    pub async fn transaction<T, F>(&mut self, f: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut Database) -> BoxFuture<'a, Result<T>>,
    {
        if self.in_transaction() {
            return f(self).await;
        }

        let mut guard = self.pool.get_connection().await?;
        if let Err(err) = guard.begin().await {
            self.last_error = Some(err.to_string());
            guard.close().await.ok();
            return Err(err);
        }
        debug!("transaction started");
        self.tx = TxState::Open(guard);

        let outcome = f(self).await;

        match (outcome, std::mem::replace(&mut self.tx, TxState::Idle)) {
            (Ok(value), TxState::Open(mut guard)) => {
                if let Err(err) = guard.commit().await {
                    self.last_error = Some(err.to_string());
                    guard.close().await.ok();
                    return Err(err);
                }
                guard.close().await?;
                debug!("transaction committed");
                Ok(value)
            }
            (Ok(_), _) => Err(PersistError::Transaction(ABORTED.into())),
            (Err(err), TxState::Open(guard)) => {
                if let Err(rollback) = guard.close().await {
                    warn!(error = %rollback, "rollback failed");
                }
                debug!(error = %err, "transaction rolled back");
                Err(err)
            }
            (Err(err), _) => Err(err),
        }
    }

    async fn fetch(&mut self, operation: Operation, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        debug!(%operation, sql = %summarize(sql), params = params.len(), "query");
        let outcome = match &mut self.tx {
            TxState::Open(guard) => guard.connection()?.query(sql, params).await,
            TxState::Aborted => return Err(PersistError::Transaction(ABORTED.into())),
            TxState::Idle => {
                let mut guard = self.pool.get_connection().await?;
                let outcome = guard.connection()?.query(sql, params).await;
                guard.close().await?;
                outcome
            }
        };
        match outcome {
            Ok(rows) => Ok(rows),
            Err(err) => Err(self.fail(err.during(operation)).await),
        }
    }

    async fn run(&mut self, operation: Operation, sql: &str, params: &[Value]) -> Result<u64> {
        debug!(%operation, sql = %summarize(sql), params = params.len(), "execute");
        let outcome = match &mut self.tx {
            TxState::Open(guard) => guard.connection()?.execute(sql, params).await,
            TxState::Aborted => return Err(PersistError::Transaction(ABORTED.into())),
            TxState::Idle => {
                let mut guard = self.pool.get_connection().await?;
                let outcome = guard.connection()?.execute(sql, params).await;
                guard.close().await?;
                outcome
            }
        };
        match outcome {
            Ok(affected) => Ok(affected),
            Err(err) => Err(self.fail(err.during(operation)).await),
        }
    }

    /// Records the error and rolls back an open transaction, leaving the
    /// handle aborted.
    async fn fail(&mut self, err: SqlError) -> PersistError {
        warn!(error = %err, "statement failed");
        self.last_error = Some(err.to_string());
        if let TxState::Open(guard) = std::mem::replace(&mut self.tx, TxState::Idle) {
            if let Err(rollback) = guard.close().await {
                warn!(error = %rollback, "rollback failed");
            }
            self.tx = TxState::Aborted;
        }
        PersistError::Sql(err)
    }
}

fn summarize(sql: &str) -> String {
    let compact = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    if compact.chars().count() > 120 {
        format!("{}...", compact.chars().take(120).collect::<String>())
    } else {
        compact
    }
}
