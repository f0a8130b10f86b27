use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. `RUST_LOG` wins when set; otherwise `debug` when
/// verbose and `info` when not. A subscriber installed earlier is left alone.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
