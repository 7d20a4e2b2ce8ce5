//! Process-level runner: connects the data source, wires shutdown signals
//! into the run context and maps failures to operator-facing messages.

pub mod errors;

use crate::config::{AppConfig, format_duration};
use crate::context::RunContext;
use crate::datasource;
use crate::report::{ReportGenerator, ReportSummary};
use anyhow::{Context, Result};

pub async fn run(config: AppConfig) -> Result<ReportSummary> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        dsn = %config.datasource.redacted_dsn(),
        template = %config.report.template_path.display(),
        output = %config.report.output_path.display(),
        timeout = %format_duration(config.report.timeout),
        on_fetch_error = %config.report.fetch_error_policy,
        "starting sheet-report"
    );

    let root = RunContext::background();
    let work = async {
        let source = datasource::connect(&root, &config.datasource)
            .await
            .context("initialize data source")?;

        let generator = ReportGenerator::new(source.clone(), config.report.clone());
        let ctx = root.with_timeout(config.report.timeout);
        let result = generator.generate(&ctx).await;

        tracing::debug!("closing data source");
        if let Err(err) = source.close().await {
            tracing::warn!(error = %err, "error closing data source");
        }

        result.map_err(|err| errors::describe(err, config.report.timeout))
    };

    let watch_signals = async {
        shutdown_signal().await;
        tracing::warn!("shutdown signal received, cancelling report generation");
        root.cancel();
        // The run observes the cancellation and finishes through `work`.
        std::future::pending::<Result<ReportSummary>>().await
    };

    tokio::select! {
        result = work => result,
        result = watch_signals => result,
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to install SIGTERM handler");
                ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
