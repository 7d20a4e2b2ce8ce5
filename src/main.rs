use anyhow::Result;
use clap::Parser;
use sheet_report::cli;
use sheet_report::config::{AppConfig, CliArgs};
use sheet_report::logging;
use tracing::instrument::WithSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let config = AppConfig::from_args(CliArgs::parse())?;
    let dispatch = logging::dispatch(config.verbose);
    cli::run(config).with_subscriber(dispatch).await?;
    Ok(())
}
