//! Mock existence check for cleanup validation tests.

use env_harness::{ExistenceCheck, HarnessError, ResourceRef};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Reports resources as present or unverifiable by name; everything else is
/// absent.
#[derive(Debug, Default)]
pub struct MockExistenceCheck {
    present: Mutex<HashSet<String>>,
    erroring: HashSet<String>,
    call_count: AtomicUsize,
}

impl MockExistenceCheck {
    /// A check that reports every resource as removed.
    #[must_use]
    pub fn all_removed() -> Self {
        Self::default()
    }

    /// Report `name` as still existing.
    #[must_use]
    pub fn with_present(self, name: &str) -> Self {
        self.present.lock().unwrap().insert(name.to_string());
        self
    }

    /// Fail the lookup for `name`.
    #[must_use]
    pub fn with_error(mut self, name: &str) -> Self {
        self.erroring.insert(name.to_string());
        self
    }

    /// Mark `name` as removed after construction.
    pub fn remove(&self, name: &str) {
        self.present.lock().unwrap().remove(name);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ExistenceCheck for MockExistenceCheck {
    async fn exists(&self, resource: &ResourceRef) -> Result<bool, HarnessError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.erroring.contains(&resource.name) {
            return Err(HarnessError::Runtime(format!(
                "Mock existence check failure for {}",
                resource.name
            )));
        }
        Ok(self.present.lock().unwrap().contains(&resource.name))
    }
}
