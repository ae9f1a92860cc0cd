//! Tracing setup shared by the binaries.

use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "info";

/// Install the global subscriber. Reporting to Sentry is enabled only when
/// `SENTRY_DSN` is set; the returned guard must be kept alive for events to flush.
pub fn init_tracing() -> Option<sentry::ClientInitGuard> {
    let sentry_guard = std::env::var("SENTRY_DSN")
        .ok()
        .filter(|dsn| !dsn.trim().is_empty())
        .map(|dsn| {
            sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    ..Default::default()
                },
            ))
        });

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let sentry_layer = sentry_guard
        .as_ref()
        .map(|_| sentry_tracing::layer().with_filter(EnvFilter::new("warn")));

    let result = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .with(sentry_layer)
        .try_init();

    if let Err(e) = result {
        // A subscriber installed by a test harness or an embedding binary wins.
        eprintln!("tracing already initialised: {e}");
    }

    sentry_guard
}
