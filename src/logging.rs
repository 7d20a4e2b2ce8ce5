use tracing::Dispatch;
use tracing_subscriber::EnvFilter;

/// Build the dispatcher for one process run without installing it globally.
///
/// `RUST_LOG` wins when set; otherwise `verbose` selects debug output with
/// source locations and the default is info. Logs go to stderr.
pub fn dispatch(verbose: bool) -> Dispatch {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .with_file(verbose)
        .with_line_number(verbose)
        .finish();
    Dispatch::new(subscriber)
}
