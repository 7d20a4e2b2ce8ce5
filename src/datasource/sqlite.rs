use super::{DataSource, prepare_query, single_row};
use crate::config::DataSourceConfig;
use crate::context::RunContext;
use crate::errors::DataSourceError;
use crate::value::{FetchedRow, FieldValue};
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::sync::atomic::{AtomicBool, Ordering};

/// SQLite-backed [`DataSource`]. Values are converted by storage class.
pub struct SqliteDataSource {
    pool: SqlitePool,
    closed: AtomicBool,
}

impl SqliteDataSource {
    pub async fn connect(ctx: &RunContext, config: &DataSourceConfig) -> Result<Self, DataSourceError> {
        let in_memory = is_in_memory(&config.dsn);
        // Every in-memory connection is its own database, so the pool must hold exactly one.
        let options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };
        let pool = ctx
            .run(options.connect(&config.dsn))
            .await?
            .map_err(DataSourceError::Connect)?;
        tracing::debug!(in_memory, "sqlite pool ready");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn fetch(&self, ctx: &RunContext, query: &str) -> Result<FetchedRow, DataSourceError> {
        if self.closed.load(Ordering::SeqCst) {
            tracing::warn!("attempted to fetch data on a closed data source");
            return Err(DataSourceError::Closed);
        }
        let query = prepare_query(query)?;
        tracing::debug!(sql = query, "executing query");

        let row = ctx
            .run(single_row(sqlx::query(query).fetch(&self.pool)))
            .await??;
        convert_row(&row)
    }

    async fn close(&self) -> Result<(), DataSourceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.pool.close().await;
        Ok(())
    }
}

fn is_in_memory(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

fn convert_row(row: &SqliteRow) -> Result<FetchedRow, DataSourceError> {
    let mut fields = FetchedRow::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let declared = column.type_info().name().to_ascii_uppercase();
        let raw = row.try_get_raw(idx).map_err(DataSourceError::Query)?;
        let value = if raw.is_null() {
            FieldValue::Null
        } else {
            let storage = raw.type_info().name().to_ascii_uppercase();
            convert_value(row, idx, &storage, &declared)?
        };
        fields.insert(column.name().to_string(), value);
    }
    Ok(fields)
}

fn convert_value(
    row: &SqliteRow,
    idx: usize,
    storage: &str,
    declared: &str,
) -> Result<FieldValue, DataSourceError> {
    let value = match storage {
        "INTEGER" | "INT8" | "BIGINT" | "BOOLEAN" => {
            let n: i64 = row.try_get_unchecked(idx).map_err(DataSourceError::Query)?;
            if declared == "BOOLEAN" || declared == "BOOL" {
                FieldValue::Bool(n != 0)
            } else {
                FieldValue::Int(n)
            }
        }
        "REAL" | "FLOAT" | "DOUBLE" => {
            FieldValue::Float(row.try_get_unchecked(idx).map_err(DataSourceError::Query)?)
        }
        "BLOB" => FieldValue::Bytes(row.try_get_unchecked(idx).map_err(DataSourceError::Query)?),
        _ => FieldValue::Text(row.try_get_unchecked(idx).map_err(DataSourceError::Query)?),
    };
    Ok(value)
}
