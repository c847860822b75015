//! Mock provisioning collaborator.
//!
//! Counts every operation and can be configured to:
//! - Delay `apply` (to widen race windows in concurrency tests)
//! - Fail the first N applies
//! - Fail every destroy
//! - Return fixed outputs
//!
//! # Example
//!
//! ```rust,ignore
//! use harness_test_utils::MockProvisioner;
//!
//! let provisioner = MockProvisioner::builder()
//!     .apply_delay(Duration::from_millis(50))
//!     .fail_applies(1)
//!     .build();
//! ```

use env_harness::{HarnessError, ModuleConfig, ProvisionOp, Provisioner};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Mock provisioner for orchestration tests.
#[derive(Debug, Default)]
pub struct MockProvisioner {
    init_calls: AtomicUsize,
    plan_calls: AtomicUsize,
    apply_calls: AtomicUsize,
    destroy_calls: AtomicUsize,
    output_calls: AtomicUsize,
    apply_delay: Duration,
    failing_applies: AtomicUsize,
    fail_destroy: bool,
    outputs: HashMap<String, String>,
    applied: Mutex<Vec<String>>,
    destroyed: Mutex<Vec<String>>,
}

impl MockProvisioner {
    /// Create a mock whose operations all succeed immediately.
    #[must_use]
    pub fn succeeding() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn builder() -> MockProvisionerBuilder {
        MockProvisionerBuilder::default()
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn plan_count(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }

    /// Number of `apply` calls, including failed ones.
    pub fn apply_count(&self) -> usize {
        self.apply_calls.load(Ordering::SeqCst)
    }

    /// Number of `destroy` calls, including failed ones.
    pub fn destroy_count(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    pub fn output_count(&self) -> usize {
        self.output_calls.load(Ordering::SeqCst)
    }

    /// Container names of successful applies, in call order.
    pub fn applied(&self) -> Vec<String> {
        self.applied.lock().unwrap().clone()
    }

    /// Container names passed to `destroy`, in call order.
    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provisioner for MockProvisioner {
    async fn init(&self, _module: &ModuleConfig) -> Result<(), HarnessError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn plan(&self, _module: &ModuleConfig) -> Result<(), HarnessError> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn apply(&self, module: &ModuleConfig) -> Result<(), HarnessError> {
        self.apply_calls.fetch_add(1, Ordering::SeqCst);
        if !self.apply_delay.is_zero() {
            tokio::time::sleep(self.apply_delay).await;
        }

        let failing = self
            .failing_applies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HarnessError::provision(
                ProvisionOp::Apply,
                "Mock provisioner apply failure",
            ));
        }

        self.applied
            .lock()
            .unwrap()
            .push(module.vars.container_name.clone());
        Ok(())
    }

    async fn destroy(&self, module: &ModuleConfig) -> Result<(), HarnessError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        self.destroyed
            .lock()
            .unwrap()
            .push(module.vars.container_name.clone());
        if self.fail_destroy {
            return Err(HarnessError::provision(
                ProvisionOp::Destroy,
                "Mock provisioner destroy failure",
            ));
        }
        Ok(())
    }

    async fn output(&self, _module: &ModuleConfig, name: &str) -> Result<String, HarnessError> {
        self.output_calls.fetch_add(1, Ordering::SeqCst);
        self.outputs.get(name).cloned().ok_or_else(|| {
            HarnessError::provision(ProvisionOp::Output, format!("no output named {name}"))
        })
    }
}

/// Builder for MockProvisioner configuration.
#[derive(Debug, Default)]
pub struct MockProvisionerBuilder {
    apply_delay: Duration,
    failing_applies: usize,
    fail_destroy: bool,
    outputs: HashMap<String, String>,
}

impl MockProvisionerBuilder {
    /// Sleep this long inside every `apply`.
    #[must_use]
    pub fn apply_delay(mut self, delay: Duration) -> Self {
        self.apply_delay = delay;
        self
    }

    /// Fail the first `count` applies; later ones succeed.
    #[must_use]
    pub fn fail_applies(mut self, count: usize) -> Self {
        self.failing_applies = count;
        self
    }

    #[must_use]
    pub fn fail_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    #[must_use]
    pub fn with_output(mut self, name: &str, value: &str) -> Self {
        self.outputs.insert(name.to_string(), value.to_string());
        self
    }

    #[must_use]
    pub fn build(self) -> MockProvisioner {
        MockProvisioner {
            apply_delay: self.apply_delay,
            failing_applies: AtomicUsize::new(self.failing_applies),
            fail_destroy: self.fail_destroy,
            outputs: self.outputs,
            ..MockProvisioner::default()
        }
    }
}
