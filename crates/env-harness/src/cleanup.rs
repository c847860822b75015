//! Per-test teardown registry.
//!
//! Resources are registered as they are created and torn down in reverse
//! registration order: a container is removed before the network it joined,
//! the network before the infrastructure that declared it.
//!
//! # Failure model
//!
//! Teardown is best-effort. Each action runs on its own task with a deadline.
//! An action that errors, panics or overruns its deadline is recorded and the
//! next resource is processed; [`CleanupManager::run_all`] never fails. A
//! timed-out task is aborted and its resource is left for
//! [`CleanupManager::validate`] (or an out-of-band sweep) to find.
//!
//! The deadline is enforced by the async runtime, so an action must not
//! block its thread. On a current-thread runtime a blocking action stalls the
//! manager itself and its deadline never fires. Blocking work belongs in
//! [`tokio::task::spawn_blocking`] (or an async process call), awaited from
//! the action.
//!
//! # Guaranteed execution
//!
//! [`with_cleanup`] runs a test body and then always runs teardown, including
//! when the body panics. The panic is resumed unchanged after teardown.

use crate::config::CleanupConfig;
use crate::descriptor::ModuleConfig;
use crate::error::HarnessError;
use crate::provisioner::Provisioner;
use crate::runtime::DockerCli;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Future returned by a teardown action.
pub type TeardownFuture = BoxFuture<'static, Result<(), HarnessError>>;

/// A one-shot teardown operation.
pub type TeardownAction = Box<dyn FnOnce() -> TeardownFuture + Send>;

/// Type of a registered resource; selects the existence check used by
/// validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Everything created by one provisioning module apply.
    Infrastructure,
    /// A container attached to a test network.
    Container,
    Network,
    Volume,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ResourceKind::Infrastructure => "infrastructure",
            ResourceKind::Container => "container",
            ResourceKind::Network => "network",
            ResourceKind::Volume => "volume",
        };
        f.write_str(kind)
    }
}

/// Identity of a registered resource.
///
/// `identifier` is what the existence check looks up: the object name for
/// runtime resources, the state file path for provisioned infrastructure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub name: String,
    pub kind: ResourceKind,
    pub identifier: String,
}

/// A named teardown unit.
pub struct CleanupResource {
    reference: ResourceRef,
    action: TeardownAction,
}

impl CleanupResource {
    /// Wrap an async teardown closure.
    ///
    /// The future must not block its thread; run blocking work through
    /// [`tokio::task::spawn_blocking`] so the teardown deadline still applies.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        kind: ResourceKind,
        identifier: impl Into<String>,
        action: F,
    ) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HarnessError>> + Send + 'static,
    {
        Self {
            reference: ResourceRef {
                name: name.into(),
                kind,
                identifier: identifier.into(),
            },
            action: Box::new(move || action().boxed()),
        }
    }

    #[must_use]
    pub fn reference(&self) -> &ResourceRef {
        &self.reference
    }
}

impl fmt::Debug for CleanupResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupResource")
            .field("reference", &self.reference)
            .field("action", &"<teardown>")
            .finish()
    }
}

/// Result of one teardown attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownOutcome {
    Succeeded,
    /// The action returned an error or panicked.
    Failed(String),
    /// The action did not finish within the configured bound and was abandoned.
    TimedOut,
    /// Teardown was disabled by configuration.
    Skipped,
}

impl fmt::Display for TeardownOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeardownOutcome::Succeeded => f.write_str("succeeded"),
            TeardownOutcome::Failed(_) => f.write_str("failed"),
            TeardownOutcome::TimedOut => f.write_str("timed_out"),
            TeardownOutcome::Skipped => f.write_str("skipped"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownRecord {
    pub resource: ResourceRef,
    pub outcome: TeardownOutcome,
    pub elapsed: Duration,
}

/// Records of one `run_all` pass, in execution order.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    records: Vec<TeardownRecord>,
}

impl CleanupReport {
    #[must_use]
    pub fn records(&self) -> &[TeardownRecord] {
        &self.records
    }

    /// Number of resources processed (including skipped).
    #[must_use]
    pub fn processed(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, TeardownOutcome::Succeeded))
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TeardownOutcome::Failed(_)))
    }

    #[must_use]
    pub fn timed_out(&self) -> usize {
        self.count(|o| matches!(o, TeardownOutcome::TimedOut))
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TeardownOutcome::Skipped))
    }

    /// Resource names in the order they were processed.
    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.resource.name.as_str()).collect()
    }

    /// Outcome recorded for a resource name.
    #[must_use]
    pub fn outcome_of(&self, name: &str) -> Option<&TeardownOutcome> {
        self.records
            .iter()
            .find(|r| r.resource.name == name)
            .map(|r| &r.outcome)
    }

    fn count(&self, pred: impl Fn(&TeardownOutcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// Findings of a post-teardown existence pass.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub checked: usize,
    /// Resources that still exist.
    pub leaked: Vec<ResourceRef>,
    /// Resources whose existence could not be determined.
    pub unverified: Vec<(ResourceRef, String)>,
}

impl ValidationReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.leaked.is_empty() && self.unverified.is_empty()
    }
}

/// Type-specific existence lookup used by validation.
#[async_trait::async_trait]
pub trait ExistenceCheck: Send + Sync {
    async fn exists(&self, resource: &ResourceRef) -> Result<bool, HarnessError>;
}

#[derive(Default)]
struct Registry {
    /// Every resource ever registered, in registration order.
    registered: Vec<ResourceRef>,
    /// Resources whose action has not run yet.
    pending: Vec<CleanupResource>,
}

/// Ordered teardown registry for one test.
///
/// Cloning yields another handle to the same registry, so a test body can
/// register resources while [`with_cleanup`] keeps the handle it will tear
/// down with.
#[derive(Clone, Default)]
pub struct CleanupManager {
    registry: Arc<Mutex<Registry>>,
    config: CleanupConfig,
}

impl fmt::Debug for CleanupManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupManager")
            .field("pending", &self.pending_count())
            .field("config", &self.config)
            .finish()
    }
}

impl CleanupManager {
    #[must_use]
    pub fn new(config: CleanupConfig) -> Self {
        Self {
            registry: Arc::default(),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> CleanupConfig {
        self.config
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        // Registration never panics while holding the lock; recover if a
        // caller did anyway.
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a resource. Later registrations are torn down first.
    pub fn register(&self, resource: CleanupResource) {
        debug!(
            target: "env_harness.cleanup",
            resource = %resource.reference.name,
            kind = %resource.reference.kind,
            "Registered resource for cleanup"
        );
        let mut registry = self.lock();
        registry.registered.push(resource.reference.clone());
        registry.pending.push(resource);
    }

    /// Register an async teardown closure.
    ///
    /// Same contract as [`CleanupResource::new`]: the future must not block
    /// its thread.
    pub fn register_action<F, Fut>(
        &self,
        name: impl Into<String>,
        kind: ResourceKind,
        identifier: impl Into<String>,
        action: F,
    ) where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), HarnessError>> + Send + 'static,
    {
        self.register(CleanupResource::new(name, kind, identifier, action));
    }

    /// Register destruction of a provisioned module.
    pub fn register_infrastructure(
        &self,
        name: impl Into<String>,
        provisioner: Arc<dyn Provisioner>,
        module: ModuleConfig,
    ) {
        let identifier = module.state_path.display().to_string();
        self.register_action(name, ResourceKind::Infrastructure, identifier, move || async move {
            provisioner.destroy(&module).await
        });
    }

    pub fn register_container(&self, runtime: &DockerCli, name: impl Into<String>) {
        self.register_runtime_object(runtime, ResourceKind::Container, name.into());
    }

    pub fn register_network(&self, runtime: &DockerCli, name: impl Into<String>) {
        self.register_runtime_object(runtime, ResourceKind::Network, name.into());
    }

    pub fn register_volume(&self, runtime: &DockerCli, name: impl Into<String>) {
        self.register_runtime_object(runtime, ResourceKind::Volume, name.into());
    }

    fn register_runtime_object(&self, runtime: &DockerCli, kind: ResourceKind, name: String) {
        let runtime = runtime.clone();
        let object = name.clone();
        self.register_action(name.clone(), kind, name, move || async move {
            runtime.remove(kind, &object).await
        });
    }

    /// Resources not yet torn down.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.lock().pending.len()
    }

    /// Every resource registered so far, in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<ResourceRef> {
        self.lock().registered.clone()
    }

    /// Tear down every pending resource, last registered first.
    ///
    /// Never fails. Each action is invoked at most once across all calls.
    #[instrument(skip_all, name = "env_harness.cleanup.run_all")]
    pub async fn run_all(&self) -> CleanupReport {
        let pending = std::mem::take(&mut self.lock().pending);

        info!(
            target: "env_harness.cleanup",
            resources = pending.len(),
            skip = self.config.skip,
            "Starting resource cleanup"
        );

        let mut report = CleanupReport::default();
        for resource in pending.into_iter().rev() {
            let record = if self.config.skip {
                skip(resource)
            } else {
                teardown(resource, self.config.timeout).await
            };
            report.records.push(record);
        }

        info!(
            target: "env_harness.cleanup",
            processed = report.processed(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            timed_out = report.timed_out(),
            skipped = report.skipped(),
            "Cleanup completed for {} resources",
            report.processed()
        );
        report
    }

    /// Confirm registered resources are gone.
    ///
    /// Diagnostic only: findings are logged and returned, never raised.
    #[instrument(skip_all, name = "env_harness.cleanup.validate")]
    pub async fn validate(&self, checker: &dyn ExistenceCheck) -> ValidationReport {
        let registered = self.registered();
        let mut report = ValidationReport {
            checked: registered.len(),
            ..ValidationReport::default()
        };

        for resource in registered {
            match checker.exists(&resource).await {
                Ok(false) => {
                    debug!(
                        target: "env_harness.cleanup",
                        resource = %resource.name,
                        kind = %resource.kind,
                        "Resource confirmed removed"
                    );
                }
                Ok(true) => {
                    warn!(
                        target: "env_harness.cleanup",
                        resource = %resource.name,
                        kind = %resource.kind,
                        "Resource still exists after cleanup"
                    );
                    report.leaked.push(resource);
                }
                Err(e) => {
                    warn!(
                        target: "env_harness.cleanup",
                        resource = %resource.name,
                        kind = %resource.kind,
                        error = %e,
                        "Could not verify resource removal"
                    );
                    report.unverified.push((resource, e.to_string()));
                }
            }
        }

        if report.leaked.is_empty() {
            info!(
                target: "env_harness.cleanup",
                checked = report.checked,
                unverified = report.unverified.len(),
                "Cleanup validation: all resources removed"
            );
        } else {
            warn!(
                target: "env_harness.cleanup",
                checked = report.checked,
                leaked = report.leaked.len(),
                "Cleanup validation: {} resources still exist",
                report.leaked.len()
            );
        }
        report
    }
}

fn skip(resource: CleanupResource) -> TeardownRecord {
    info!(
        target: "env_harness.cleanup",
        resource = %resource.reference.name,
        kind = %resource.reference.kind,
        "Skipping cleanup"
    );
    TeardownRecord {
        resource: resource.reference,
        outcome: TeardownOutcome::Skipped,
        elapsed: Duration::ZERO,
    }
}

async fn teardown(resource: CleanupResource, timeout: Duration) -> TeardownRecord {
    let CleanupResource { reference, action } = resource;

    info!(
        target: "env_harness.cleanup",
        resource = %reference.name,
        kind = %reference.kind,
        "Cleaning up resource"
    );

    let started = Instant::now();
    // The closure is called inside the task so a panic while building the
    // future is isolated too.
    let mut task = tokio::spawn(async move { action().await });

    let outcome = match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(Ok(()))) => TeardownOutcome::Succeeded,
        Ok(Ok(Err(e))) => TeardownOutcome::Failed(e.to_string()),
        Ok(Err(join_error)) if join_error.is_panic() => TeardownOutcome::Failed(format!(
            "teardown panicked: {}",
            panic_message(join_error.into_panic().as_ref())
        )),
        Ok(Err(_)) => TeardownOutcome::Failed("teardown task was cancelled".to_string()),
        Err(_elapsed) => {
            task.abort();
            TeardownOutcome::TimedOut
        }
    };
    let elapsed = started.elapsed();

    match &outcome {
        TeardownOutcome::Succeeded => info!(
            target: "env_harness.cleanup",
            resource = %reference.name,
            kind = %reference.kind,
            elapsed_ms = elapsed.as_millis() as u64,
            "Successfully cleaned up resource"
        ),
        TeardownOutcome::Failed(reason) => warn!(
            target: "env_harness.cleanup",
            resource = %reference.name,
            kind = %reference.kind,
            error = %reason,
            "Cleanup failed"
        ),
        TeardownOutcome::TimedOut => warn!(
            target: "env_harness.cleanup",
            resource = %reference.name,
            kind = %reference.kind,
            timeout_secs = timeout.as_secs_f64(),
            "Cleanup timed out, abandoning resource"
        ),
        TeardownOutcome::Skipped => {}
    }

    TeardownRecord {
        resource: reference,
        outcome,
        elapsed,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Run `body`, then tear down everything it registered.
///
/// Teardown runs on every exit path. If `body` panics, teardown completes
/// first and the original panic payload is then resumed.
pub async fn with_cleanup<F, Fut, T>(manager: CleanupManager, body: F) -> T
where
    F: FnOnce(CleanupManager) -> Fut,
    Fut: Future<Output = T>,
{
    run_guarded(manager, None, body).await
}

/// Like [`with_cleanup`], and on normal completion also validates removal.
pub async fn with_cleanup_validated<F, Fut, T>(
    manager: CleanupManager,
    checker: &dyn ExistenceCheck,
    body: F,
) -> T
where
    F: FnOnce(CleanupManager) -> Fut,
    Fut: Future<Output = T>,
{
    run_guarded(manager, Some(checker), body).await
}

async fn run_guarded<F, Fut, T>(
    manager: CleanupManager,
    checker: Option<&dyn ExistenceCheck>,
    body: F,
) -> T
where
    F: FnOnce(CleanupManager) -> Fut,
    Fut: Future<Output = T>,
{
    let handle = manager.clone();
    let result = AssertUnwindSafe(async move { body(handle).await })
        .catch_unwind()
        .await;

    match result {
        Ok(value) => {
            manager.run_all().await;
            if let Some(checker) = checker {
                manager.validate(checker).await;
            }
            value
        }
        Err(payload) => {
            warn!(
                target: "env_harness.cleanup",
                panic = %panic_message(payload.as_ref()),
                "Test panicked, performing emergency cleanup"
            );
            manager.run_all().await;
            std::panic::resume_unwind(payload)
        }
    }
}
