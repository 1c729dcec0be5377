use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Logs go to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` wins over `verbose` when set.
pub fn init(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("verbabridge={}", default_level)));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .try_init();
    Ok(())
}
