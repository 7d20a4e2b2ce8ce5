//! PostgreSQL data source tests against a throwaway container.
//!
//! These tests need a Docker daemon and only build with the feature enabled:
//! ```
//! cargo test --features docker-tests --test postgres_docker
//! ```
#![cfg(feature = "docker-tests")]

use anyhow::Result;
use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveDateTime};
use serde_json::json;
use sheet_report::config::DataSourceConfig;
use sheet_report::datasource::{self, PostgresDataSource};
use sheet_report::errors::DataSourceError;
use sheet_report::{DataSource, FieldValue, RunContext};
use std::time::Duration;
use testcontainers::core::{IntoContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};

struct Postgres {
    _container: ContainerAsync<GenericImage>,
    host: String,
    port: u16,
}

impl Postgres {
    async fn start() -> Result<Self> {
        let container = GenericImage::new("postgres", "16-alpine")
            .with_exposed_port(5432.tcp())
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_env_var("POSTGRES_USER", "report")
            .with_env_var("POSTGRES_PASSWORD", "s3cret")
            .with_env_var("POSTGRES_DB", "sales")
            .start()
            .await?;
        let host = container.get_host().await?.to_string();
        let port = container.get_host_port_ipv4(5432.tcp()).await?;
        Ok(Self {
            _container: container,
            host,
            port,
        })
    }

    fn dsn(&self, password: &str) -> String {
        format!(
            "postgres://report:{password}@{}:{}/sales",
            self.host, self.port
        )
    }

    /// The image restarts once after init, so early connects can be refused.
    async fn connect(&self) -> Result<PostgresDataSource> {
        let config = DataSourceConfig::new(self.dsn("s3cret"));
        let ctx = RunContext::background();
        let mut attempts = 0;
        loop {
            match PostgresDataSource::connect(&ctx, &config).await {
                Ok(source) => return Ok(source),
                Err(err) if attempts < 20 => {
                    attempts += 1;
                    eprintln!("postgres not ready yet ({err}), retrying");
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[tokio::test]
async fn converts_postgres_column_types() -> Result<()> {
    let pg = Postgres::start().await?;
    let source = pg.connect().await?;

    let row = source
        .fetch(
            &RunContext::background(),
            r#"
            SELECT 150.00::numeric AS "Total",
                   'NaN'::numeric AS not_a_number,
                   42::int4 AS small,
                   9000000000::int8 AS big,
                   1.5::float4 AS ratio,
                   true AS active,
                   DATE '2024-06-30' AS as_of,
                   TIMESTAMP '2024-06-30 12:34:56' AS stamped,
                   TIMESTAMPTZ '2024-06-30 12:34:56+02' AS stamped_tz,
                   '{"owner": "ops", "tags": ["a"]}'::jsonb AS meta,
                   '\x6869'::bytea AS raw,
                   'a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11'::uuid AS id,
                   'north'::text AS region,
                   NULL::text AS note,
                   interval '1 day' AS span
            "#,
        )
        .await?;

    let at = |s: &str| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap();
    assert_eq!(row["Total"], FieldValue::Float(150.0));
    assert_eq!(row["not_a_number"], FieldValue::Null);
    assert_eq!(row["small"], FieldValue::Int(42));
    assert_eq!(row["big"], FieldValue::Int(9_000_000_000));
    assert_eq!(row["ratio"], FieldValue::Float(1.5));
    assert_eq!(row["active"], FieldValue::Bool(true));
    assert_eq!(
        row["as_of"],
        FieldValue::Date(NaiveDate::from_ymd_opt(2024, 6, 30).unwrap())
    );
    assert_eq!(row["stamped"], FieldValue::DateTime(at("2024-06-30 12:34:56")));
    assert_eq!(row["stamped_tz"], FieldValue::DateTime(at("2024-06-30 10:34:56")));
    assert_eq!(
        row["meta"],
        FieldValue::Json(json!({"owner": "ops", "tags": ["a"]}))
    );
    assert_eq!(row["raw"], FieldValue::Bytes(b"hi".to_vec()));
    assert_eq!(
        row["id"],
        FieldValue::Text("a0eebc99-9c0b-4ef8-bb6d-6bb9bd380a11".into())
    );
    assert_eq!(row["region"], FieldValue::Text("north".into()));
    assert_eq!(row["note"], FieldValue::Null);
    assert_eq!(row["span"], FieldValue::Null);

    source.close().await?;
    Ok(())
}

#[tokio::test]
async fn infinite_dates_and_timestamps_become_sentinels() -> Result<()> {
    let pg = Postgres::start().await?;
    let source = pg.connect().await?;

    let row = source
        .fetch(
            &RunContext::background(),
            "SELECT 'infinity'::date AS open_date,
                    '-infinity'::date AS since_date,
                    'infinity'::timestamp AS open_at,
                    '-infinity'::timestamptz AS since_at",
        )
        .await?;

    assert_eq!(row["open_date"], FieldValue::Infinity);
    assert_eq!(row["since_date"], FieldValue::NegativeInfinity);
    assert_eq!(row["open_at"], FieldValue::Infinity);
    assert_eq!(row["since_at"], FieldValue::NegativeInfinity);
    Ok(())
}

#[tokio::test]
async fn single_row_contract_and_close() -> Result<()> {
    let pg = Postgres::start().await?;
    // Wait for readiness through the concrete type, then go through the dispatcher.
    pg.connect().await?.close().await?;
    let source = datasource::connect(
        &RunContext::background(),
        &DataSourceConfig::new(pg.dsn("s3cret")),
    )
    .await?;
    let ctx = RunContext::background();

    assert_matches!(
        source.fetch(&ctx, "SELECT 1 AS one WHERE false").await,
        Err(DataSourceError::NoRows)
    );
    assert_matches!(
        source.fetch(&ctx, "SELECT generate_series(1, 2) AS n").await,
        Err(DataSourceError::MultipleRows)
    );
    assert_matches!(
        source.fetch(&ctx, "SELECT * FROM missing_table").await,
        Err(DataSourceError::Query(_))
    );

    source.close().await?;
    source.close().await?;
    assert_matches!(
        source.fetch(&ctx, "SELECT 1 AS one").await,
        Err(DataSourceError::Closed)
    );
    Ok(())
}

#[tokio::test]
async fn connect_fails_on_bad_credentials() -> Result<()> {
    let pg = Postgres::start().await?;
    pg.connect().await?.close().await?;

    let result = PostgresDataSource::connect(
        &RunContext::background(),
        &DataSourceConfig::new(pg.dsn("wrong")),
    )
    .await;

    match result {
        Err(DataSourceError::Connect(_)) => Ok(()),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("connect with a wrong password should fail"),
    }
}
