//! Teardown actions that record their invocations.
//!
//! Every action records its name when invoked, before doing anything else, so
//! hanging and panicking actions show up in [`TeardownRecorder::invocations`]
//! too.
//!
//! # Example
//!
//! ```rust,ignore
//! let recorder = TeardownRecorder::new();
//! recorder.register_ok(&manager, "network", ResourceKind::Network);
//! recorder.register_failing(&manager, "container", ResourceKind::Container);
//! manager.run_all().await;
//! assert_eq!(recorder.invocations(), vec!["container", "network"]);
//! ```

use env_harness::{CleanupManager, HarnessError, ResourceKind};
use std::sync::{Arc, Mutex};

/// Shared invocation log for mock teardown actions.
#[derive(Debug, Clone, Default)]
pub struct TeardownRecorder {
    log: Arc<Mutex<Vec<String>>>,
}

impl TeardownRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of invoked actions, in invocation order.
    pub fn invocations(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// How many times the action named `name` was invoked.
    pub fn count(&self, name: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.as_str() == name)
            .count()
    }

    fn record(&self, name: &str) {
        self.log.lock().unwrap().push(name.to_string());
    }

    pub fn register_ok(&self, manager: &CleanupManager, name: &str, kind: ResourceKind) {
        let recorder = self.clone();
        let entry = name.to_string();
        manager.register_action(name, kind, name, move || async move {
            recorder.record(&entry);
            Ok(())
        });
    }

    pub fn register_failing(&self, manager: &CleanupManager, name: &str, kind: ResourceKind) {
        let recorder = self.clone();
        let entry = name.to_string();
        manager.register_action(name, kind, name, move || async move {
            recorder.record(&entry);
            Err(HarnessError::Runtime(format!("Mock teardown failure for {entry}")))
        });
    }

    /// Action that never completes.
    pub fn register_hanging(&self, manager: &CleanupManager, name: &str, kind: ResourceKind) {
        let recorder = self.clone();
        let entry = name.to_string();
        manager.register_action(name, kind, name, move || async move {
            recorder.record(&entry);
            std::future::pending::<Result<(), HarnessError>>().await
        });
    }

    pub fn register_panicking(&self, manager: &CleanupManager, name: &str, kind: ResourceKind) {
        let recorder = self.clone();
        let entry = name.to_string();
        manager.register_action(name, kind, name, move || async move {
            recorder.record(&entry);
            explode(&entry)
        });
    }
}

fn explode(name: &str) -> Result<(), HarnessError> {
    panic!("Mock teardown panic for {name}")
}
