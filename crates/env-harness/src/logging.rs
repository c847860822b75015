//! Tracing subscriber setup for test binaries.

use std::sync::Once;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "env_harness=info,env_tests=info";

static INIT: Once = Once::new();

/// Install a subscriber that writes through the test harness capture.
///
/// Safe to call from every test; only the first call has an effect, and an
/// already-installed global subscriber is left in place.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
            )
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .try_init();
    });
}
