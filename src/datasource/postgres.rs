use super::{DataSource, prepare_query, single_row};
use crate::config::DataSourceConfig;
use crate::context::RunContext;
use crate::errors::DataSourceError;
use crate::value::{FetchedRow, FieldValue};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::{Decimal, Uuid};
use sqlx::{Column, Connection, Row, TypeInfo, ValueRef};
use std::sync::atomic::{AtomicBool, Ordering};

/// PostgreSQL-backed [`DataSource`] using a sqlx connection pool.
pub struct PostgresDataSource {
    pool: PgPool,
    closed: AtomicBool,
}

impl PostgresDataSource {
    /// Build the pool and ping the server once before returning.
    pub async fn connect(ctx: &RunContext, config: &DataSourceConfig) -> Result<Self, DataSourceError> {
        let pool = ctx
            .run(
                PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.dsn),
            )
            .await?
            .map_err(DataSourceError::Connect)?;

        tracing::debug!("pinging database");
        let ping = ctx
            .run(async {
                let mut conn = pool.acquire().await?;
                conn.ping().await
            })
            .await;
        match ping {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                pool.close().await;
                return Err(DataSourceError::Connect(err));
            }
            Err(reason) => {
                pool.close().await;
                return Err(reason.into());
            }
        }

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DataSource for PostgresDataSource {
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
        let fields = convert_row(&row)?;
        tracing::debug!(fields = fields.len(), "query returned one row");
        Ok(fields)
    }

    async fn close(&self) -> Result<(), DataSourceError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.pool.close().await;
        tracing::debug!("postgres pool closed");
        Ok(())
    }
}

fn convert_row(row: &PgRow) -> Result<FetchedRow, DataSourceError> {
    let mut fields = FetchedRow::with_capacity(row.columns().len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = convert_value(row, idx, column.name(), column.type_info().name())?;
        fields.insert(column.name().to_string(), value);
    }
    Ok(fields)
}

fn convert_value(
    row: &PgRow,
    idx: usize,
    name: &str,
    type_name: &str,
) -> Result<FieldValue, DataSourceError> {
    let raw = row.try_get_raw(idx).map_err(DataSourceError::Query)?;
    if raw.is_null() {
        return Ok(FieldValue::Null);
    }

    let value = match type_name {
        "BOOL" => FieldValue::Bool(get(row, idx)?),
        "INT2" => FieldValue::Int(i64::from(get::<i16>(row, idx)?)),
        "INT4" => FieldValue::Int(i64::from(get::<i32>(row, idx)?)),
        "INT8" => FieldValue::Int(get(row, idx)?),
        "FLOAT4" => FieldValue::Float(f64::from(get::<f32>(row, idx)?)),
        "FLOAT8" => FieldValue::Float(get(row, idx)?),
        "NUMERIC" => numeric(row, idx, name),
        "DATE" => date(row, idx)?,
        "TIMESTAMP" | "TIMESTAMPTZ" => timestamp(row, idx, type_name)?,
        "JSON" | "JSONB" => FieldValue::from_json(get::<serde_json::Value>(row, idx)?),
        "BYTEA" => FieldValue::Bytes(get(row, idx)?),
        "UUID" => FieldValue::Text(get::<Uuid>(row, idx)?.to_string()),
        _ => match row.try_get::<String, _>(idx) {
            Ok(text) => FieldValue::Text(text),
            Err(err) => {
                tracing::warn!(
                    field = name,
                    pg_type = type_name,
                    error = %err,
                    "unsupported column type, using null; cast the column to text in the query"
                );
                FieldValue::Null
            }
        },
    };
    Ok(value)
}

fn get<'r, T>(row: &'r PgRow, idx: usize) -> Result<T, DataSourceError>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    row.try_get(idx).map_err(DataSourceError::Query)
}

fn numeric(row: &PgRow, idx: usize, name: &str) -> FieldValue {
    let converted = row
        .try_get::<Decimal, _>(idx)
        .map_err(|err| err.to_string())
        .and_then(|decimal| {
            decimal
                .to_string()
                .parse::<f64>()
                .map_err(|err| err.to_string())
        });
    match converted {
        Ok(n) if n.is_finite() => FieldValue::Float(n),
        Ok(n) => {
            tracing::warn!(field = name, value = n, "numeric value is not finite, using null");
            FieldValue::Null
        }
        Err(error) => {
            tracing::warn!(field = name, error = %error, "failed to convert numeric to float, using null");
            FieldValue::Null
        }
    }
}

// Binary DATE is days since 2000-01-01 with i32::MAX/MIN reserved for ±infinity.
fn date(row: &PgRow, idx: usize) -> Result<FieldValue, DataSourceError> {
    let days: i32 = row.try_get_unchecked(idx).map_err(DataSourceError::Query)?;
    Ok(match days {
        i32::MAX => FieldValue::Infinity,
        i32::MIN => FieldValue::NegativeInfinity,
        _ => FieldValue::Date(get::<NaiveDate>(row, idx)?),
    })
}

// Binary TIMESTAMP[TZ] is microseconds since 2000-01-01 with i64::MAX/MIN for ±infinity.
fn timestamp(row: &PgRow, idx: usize, type_name: &str) -> Result<FieldValue, DataSourceError> {
    let micros: i64 = row.try_get_unchecked(idx).map_err(DataSourceError::Query)?;
    Ok(match micros {
        i64::MAX => FieldValue::Infinity,
        i64::MIN => FieldValue::NegativeInfinity,
        _ if type_name == "TIMESTAMPTZ" => {
            FieldValue::DateTime(get::<DateTime<Utc>>(row, idx)?.naive_utc())
        }
        _ => FieldValue::DateTime(get::<NaiveDateTime>(row, idx)?),
    })
}
