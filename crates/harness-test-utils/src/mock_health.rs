//! Mock health probe.

use env_harness::{EnvironmentDescriptor, HealthProbe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Health probe with a switchable answer.
#[derive(Debug)]
pub struct MockHealthProbe {
    healthy: AtomicBool,
    /// Report unhealthy for this many calls before consulting `healthy`.
    unhealthy_calls: usize,
    call_count: AtomicUsize,
}

impl MockHealthProbe {
    #[must_use]
    pub fn healthy() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            unhealthy_calls: 0,
            call_count: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn unhealthy() -> Self {
        Self {
            healthy: AtomicBool::new(false),
            ..Self::healthy()
        }
    }

    /// Unhealthy for the first `calls` probes, healthy afterwards.
    #[must_use]
    pub fn healthy_after(calls: usize) -> Self {
        Self {
            unhealthy_calls: calls,
            ..Self::healthy()
        }
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl HealthProbe for MockHealthProbe {
    async fn is_healthy(&self, _descriptor: &EnvironmentDescriptor) -> bool {
        let previous = self.call_count.fetch_add(1, Ordering::SeqCst);
        previous >= self.unhealthy_calls && self.healthy.load(Ordering::SeqCst)
    }
}
