//! Logging bootstrap for CLI commands.

use tracing_subscriber::EnvFilter;

/// Console logging with RUST_LOG override. `--verbose` drops the default
/// level to debug.
pub fn init_cli_logging(verbose: bool) {
  let default_level = if verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env().add_directive(default_level.into()))
    .with_writer(std::io::stderr)
    .init();
}
