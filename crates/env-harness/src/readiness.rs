//! Polling helpers for environments that become healthy asynchronously.
//!
//! Backoff strategy:
//! - Initial delay: 500ms
//! - Exponential multiplier: 2x
//! - Each delay is capped at the time remaining in the budget

use crate::descriptor::EnvironmentDescriptor;
use crate::error::HarnessError;
use crate::health::HealthProbe;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

const INITIAL_DELAY: Duration = Duration::from_millis(500);

/// Poll `condition` until it returns true or `budget` elapses.
///
/// The condition is evaluated at least once. Returns the number of attempts.
pub async fn poll_until<F, Fut>(budget: Duration, mut condition: F) -> Result<u32, Duration>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    let mut delay = INITIAL_DELAY;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        if condition().await {
            return Ok(attempts);
        }

        let elapsed = start.elapsed();
        if elapsed >= budget {
            return Err(elapsed);
        }

        let remaining = budget.saturating_sub(elapsed);
        sleep(delay.min(remaining)).await;
        delay *= 2;
    }
}

/// Wait until the probe reports the environment healthy.
#[instrument(skip_all, name = "env_harness.readiness.wait", fields(instance = %descriptor.instance_name()))]
pub async fn wait_until_healthy(
    probe: &dyn HealthProbe,
    descriptor: &EnvironmentDescriptor,
    budget: Duration,
) -> Result<(), HarnessError> {
    match poll_until(budget, || probe.is_healthy(descriptor)).await {
        Ok(attempts) => {
            info!(
                target: "env_harness.readiness",
                instance = %descriptor.instance_name(),
                attempts,
                "Environment is healthy"
            );
            Ok(())
        }
        Err(elapsed) => {
            warn!(
                target: "env_harness.readiness",
                instance = %descriptor.instance_name(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Environment did not become healthy"
            );
            debug!(target: "env_harness.readiness", budget_ms = budget.as_millis() as u64);
            Err(HarnessError::ReadinessTimeout(budget))
        }
    }
}
