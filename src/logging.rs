use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub fn log_request_summary(method: &str, path: &str, status: u16, elapsed: Duration) {
    info!(
        method = %method,
        path = %path,
        status,
        duration_ms = elapsed.as_millis(),
        "request summary"
    );

    if status >= 500 {
        warn!(method = %method, path = %path, status, "request failed");
    }
}
