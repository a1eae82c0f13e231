use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` overrides `default_level`.
/// Output goes to stderr so it stays out of the rendered tables.
pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn log_config_loaded(run_mode: &str, backend: &str) {
    tracing::info!("Configuration loaded (mode={}, backend={})", run_mode, backend);
}

pub fn log_export_written(path: &str, rows: usize) {
    tracing::info!("Exported {} rows to {}", rows, path);
}
