//! Subscriber installation.
//!
//! `RUST_LOG` overrides the default filter. Output is JSON lines unless the
//! host asks for the human-readable format. Installing twice is a no-op, so
//! tests can call [`init`] freely.

use tracing_subscriber::EnvFilter;

/// Stock operations at `info`, everything else at `warn`.
pub const DEFAULT_FILTER: &str = "warn,larder_infra=info,larder_stock=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

pub fn init() {
    init_with(LogFormat::Json);
}

pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(true);

    // Another subscriber may already be installed.
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.try_init(),
    };
}
