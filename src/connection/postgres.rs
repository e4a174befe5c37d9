//! `tokio-postgres` driver.
//!
//! Each statement is prepared first so values can be encoded for the
//! parameter types the server inferred.

use super::{Connector, SqlConnection, config::DatabaseConfig};
use crate::core::{PersistError, Result, Row, SqlError, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, NoTls, Statement};
use tracing::error;

type Param = Box<dyn ToSql + Sync + Send>;

#[derive(Debug, Default, Clone, Copy)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    async fn connect(&self, config: &DatabaseConfig) -> Result<Box<dyn SqlConnection>> {
        let connection_string = config.connection_string();
        let connecting = tokio_postgres::connect(&connection_string, NoTls);
        let (client, connection) = tokio::time::timeout(config.connect_timeout, connecting)
            .await
            .map_err(|_| PersistError::Pool(format!("timed out connecting to {}", config.to_url())))?
            .map_err(|err| PersistError::Pool(format!("connect {}: {}", config.to_url(), err)))?;

        tokio::spawn(async move {
            if let Err(err) = connection.await {
                error!(error = %err, "postgres connection closed");
            }
        });

        Ok(Box::new(PgConnection { client }))
    }
}

pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    async fn prepare(&self, sql: &str, params: &[Value]) -> std::result::Result<(Statement, Vec<Param>), SqlError> {
        let statement = self.client.prepare(sql).await.map_err(driver_error)?;
        if statement.params().len() != params.len() {
            return Err(SqlError::new(format!(
                "statement expects {} parameters, got {}",
                statement.params().len(),
                params.len()
            )));
        }
        let encoded = statement
            .params()
            .iter()
            .zip(params)
            .map(|(ty, value)| encode(value, ty))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok((statement, encoded))
    }
}

#[async_trait]
impl SqlConnection for PgConnection {
    async fn query(&mut self, sql: &str, params: &[Value]) -> std::result::Result<Vec<Row>, SqlError> {
        let (statement, encoded) = self.prepare(sql, params).await?;
        let refs = encoded
            .iter()
            .map(|p| &**p as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        let rows = self
            .client
            .query(&statement, &refs)
            .await
            .map_err(driver_error)?;

        let columns: Arc<[String]> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        rows.iter()
            .map(|row| {
                let values = statement
                    .columns()
                    .iter()
                    .enumerate()
                    .map(|(index, column)| decode(row, index, column.type_()))
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(Row::new(columns.clone(), values))
            })
            .collect()
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> std::result::Result<u64, SqlError> {
        let (statement, encoded) = self.prepare(sql, params).await?;
        let refs = encoded
            .iter()
            .map(|p| &**p as &(dyn ToSql + Sync))
            .collect::<Vec<_>>();
        self.client
            .execute(&statement, &refs)
            .await
            .map_err(driver_error)
    }

    async fn batch_execute(&mut self, sql: &str) -> std::result::Result<(), SqlError> {
        self.client.batch_execute(sql).await.map_err(driver_error)
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

/// Keeps SQLSTATE, constraint and column from server errors.
fn driver_error(err: tokio_postgres::Error) -> SqlError {
    match err.as_db_error() {
        Some(db) => {
            let mut mapped = SqlError::new(db.message()).with_code(db.code().code());
            if let Some(constraint) = db.constraint() {
                mapped = mapped.with_constraint(constraint);
            }
            if let Some(column) = db.column() {
                mapped = mapped.with_column(column);
            }
            mapped
        }
        None => SqlError::new(err.to_string()),
    }
}

fn integer(value: &Value) -> Option<Option<i64>> {
    match value {
        Value::Null => Some(None),
        Value::Integer(n) => Some(Some(*n)),
        _ => None,
    }
}

fn encode(value: &Value, ty: &Type) -> std::result::Result<Param, SqlError> {
    let mismatch = || SqlError::new(format!("cannot bind {} as {}", value.type_name(), ty));

    let param: Param = match *ty {
        Type::BOOL => match value {
            Value::Null => Box::new(None::<bool>),
            Value::Boolean(b) => Box::new(Some(*b)),
            _ => return Err(mismatch()),
        },
        Type::INT2 => {
            let n = integer(value).ok_or_else(mismatch)?;
            Box::new(n.map(i16::try_from).transpose().map_err(|_| mismatch())?)
        }
        Type::INT4 => {
            let n = integer(value).ok_or_else(mismatch)?;
            Box::new(n.map(i32::try_from).transpose().map_err(|_| mismatch())?)
        }
        Type::INT8 => Box::new(integer(value).ok_or_else(mismatch)?),
        Type::NUMERIC => match value {
            Value::Null => Box::new(None::<Decimal>),
            Value::Decimal(d) => Box::new(Some(*d)),
            Value::Integer(n) => Box::new(Some(Decimal::from(*n))),
            _ => return Err(mismatch()),
        },
        Type::TIMESTAMPTZ => match value {
            Value::Null => Box::new(None::<DateTime<Utc>>),
            Value::Timestamp(ts) => Box::new(Some(*ts)),
            _ => return Err(mismatch()),
        },
        Type::TIMESTAMP => match value {
            Value::Null => Box::new(None::<NaiveDateTime>),
            Value::Timestamp(ts) => Box::new(Some(ts.naive_utc())),
            _ => return Err(mismatch()),
        },
        _ => match value {
            Value::Null => Box::new(None::<String>),
            Value::Text(s) => Box::new(Some(s.clone())),
            other => Box::new(Some(other.to_string())),
        },
    };
    Ok(param)
}

fn decode(row: &tokio_postgres::Row, index: usize, ty: &Type) -> std::result::Result<Value, SqlError> {
    let decoded = match *ty {
        Type::BOOL => row
            .try_get::<_, Option<bool>>(index)
            .map(|v| v.map(Value::Boolean)),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(index)
            .map(|v| v.map(|n| Value::Integer(n.into()))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(index)
            .map(|v| v.map(|n| Value::Integer(n.into()))),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(index)
            .map(|v| v.map(Value::Integer)),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(index)
            .map(|v| v.map(Value::Decimal)),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(index)
            .map(|v| v.map(Value::Timestamp)),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(index)
            .map(|v| v.map(|ts| Value::Timestamp(ts.and_utc()))),
        _ => row
            .try_get::<_, Option<String>>(index)
            .map(|v| v.map(Value::Text)),
    };

    decoded
        .map(|value| value.unwrap_or(Value::Null))
        .map_err(|err| SqlError::new(format!("decode column {} ({}): {}", index, ty, err)))
}
