mod postgres;
mod sqlite;

pub use postgres::PostgresDataSource;
pub use sqlite::SqliteDataSource;

use crate::config::DataSourceConfig;
use crate::context::RunContext;
use crate::errors::DataSourceError;
use crate::value::FetchedRow;
use async_trait::async_trait;
use futures::TryStreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Executes one query and returns exactly one row.
///
/// Implementations must honour the run context so a cancelled or expired run
/// does not wait on an in-flight query.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch(&self, ctx: &RunContext, query: &str) -> Result<FetchedRow, DataSourceError>;

    /// Release pooled connections. Calling it twice is a no-op; any later
    /// `fetch` fails with [`DataSourceError::Closed`].
    async fn close(&self) -> Result<(), DataSourceError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl Backend {
    pub fn from_dsn(dsn: &str) -> Result<Self, DataSourceError> {
        let lower = dsn.trim().to_ascii_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Ok(Backend::Postgres)
        } else if lower.starts_with("sqlite:") {
            Ok(Backend::Sqlite)
        } else {
            let scheme = lower
                .split_once(':')
                .map(|(scheme, _)| scheme.to_string())
                .unwrap_or_default();
            Err(DataSourceError::UnsupportedDsn(scheme))
        }
    }
}

/// Open the backend named by the DSN scheme.
pub async fn connect(
    ctx: &RunContext,
    config: &DataSourceConfig,
) -> Result<Arc<dyn DataSource>, DataSourceError> {
    let backend = Backend::from_dsn(&config.dsn)?;
    tracing::info!(
        backend = ?backend,
        dsn = %config.redacted_dsn(),
        max_connections = config.max_connections,
        "initializing data source"
    );
    let source: Arc<dyn DataSource> = match backend {
        Backend::Postgres => Arc::new(PostgresDataSource::connect(ctx, config).await?),
        Backend::Sqlite => Arc::new(SqliteDataSource::connect(ctx, config).await?),
    };
    tracing::info!("data source connection established");
    Ok(source)
}

/// Pull at most two rows from a result stream and enforce the one-row contract.
pub(crate) async fn single_row<R>(
    mut rows: BoxStream<'_, Result<R, sqlx::Error>>,
) -> Result<R, DataSourceError> {
    let first = rows
        .try_next()
        .await
        .map_err(DataSourceError::Query)?
        .ok_or(DataSourceError::NoRows)?;
    if rows
        .try_next()
        .await
        .map_err(DataSourceError::Query)?
        .is_some()
    {
        return Err(DataSourceError::MultipleRows);
    }
    Ok(first)
}

pub(crate) fn prepare_query(query: &str) -> Result<&str, DataSourceError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(DataSourceError::EmptyQuery);
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use futures::stream;

    #[test]
    fn backend_is_chosen_by_scheme() {
        assert_eq!(
            Backend::from_dsn("postgres://u:p@localhost/db").unwrap(),
            Backend::Postgres
        );
        assert_eq!(
            Backend::from_dsn("PostgreSQL://localhost/db").unwrap(),
            Backend::Postgres
        );
        assert_eq!(Backend::from_dsn("sqlite::memory:").unwrap(), Backend::Sqlite);
        assert_eq!(Backend::from_dsn("sqlite://data.db").unwrap(), Backend::Sqlite);
        assert_matches!(
            Backend::from_dsn("mysql://localhost/db"),
            Err(DataSourceError::UnsupportedDsn(scheme)) if scheme == "mysql"
        );
    }

    #[tokio::test]
    async fn single_row_contract() {
        let none: BoxStream<'_, Result<i32, sqlx::Error>> = Box::pin(stream::iter(vec![]));
        assert_matches!(single_row(none).await, Err(DataSourceError::NoRows));

        let one: BoxStream<'_, Result<i32, sqlx::Error>> = Box::pin(stream::iter(vec![Ok(1)]));
        assert_matches!(single_row(one).await, Ok(1));

        let many: BoxStream<'_, Result<i32, sqlx::Error>> =
            Box::pin(stream::iter(vec![Ok(1), Ok(2), Ok(3)]));
        assert_matches!(single_row(many).await, Err(DataSourceError::MultipleRows));
    }

    #[test]
    fn blank_queries_are_rejected() {
        assert_matches!(prepare_query("  \n "), Err(DataSourceError::EmptyQuery));
        assert_eq!(prepare_query(" SELECT 1;\n").unwrap(), "SELECT 1;");
    }
}
