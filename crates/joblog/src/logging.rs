//! Process-wide log and trace output.

use std::sync::Once;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

static INIT: Once = Once::new();

/// Installs a stderr subscriber filtered by `RUST_LOG`, falling back to
/// `default_filter` (e.g. `"joblog=info"`), and routes `log` records into it.
///
/// Only the first call has an effect. If the host already installed a global
/// subscriber or logger, that one is kept.
pub fn init(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = Registry::default()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(true));

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            log::debug!("Global tracing subscriber already installed");
        }
        if tracing_log::LogTracer::init().is_err() {
            tracing::debug!("A log implementation is already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("joblog=debug");
        init("joblog=trace");
        log::info!("logging initialized");
        tracing::info!("tracing initialized");
    }
}
