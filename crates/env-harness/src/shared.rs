//! Process-wide shared environment.
//!
//! One long-lived environment reused by every non-destructive test in a test
//! binary. The lifecycle is a one-way state machine:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> TornDown
//!       ^               |
//!       +---- failure --+
//! ```
//!
//! An async mutex serializes the setup and cleanup critical sections only.
//! Tests read the descriptor through an `Arc` without holding any lock; it is
//! immutable after construction.

use crate::cleanup::TeardownOutcome;
use crate::config::{HarnessConfig, SharedEnvironmentConfig};
use crate::descriptor::EnvironmentDescriptor;
use crate::error::HarnessError;
use crate::health::{HealthProbe, ServiceSession};
use crate::identifiers::{IdentifierBand, Identifiers, Seed};
use crate::provisioner::{init_and_apply, Provisioner};
use crate::requirements::EnvironmentKind;
use secrecy::SecretString;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument};

/// Lifecycle phase of the shared environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SharedPhase {
    Uninitialized = 0,
    Initializing = 1,
    Ready = 2,
    TornDown = 3,
}

impl SharedPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SharedPhase::Initializing,
            2 => SharedPhase::Ready,
            3 => SharedPhase::TornDown,
            _ => SharedPhase::Uninitialized,
        }
    }
}

impl fmt::Display for SharedPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            SharedPhase::Uninitialized => "uninitialized",
            SharedPhase::Initializing => "initializing",
            SharedPhase::Ready => "ready",
            SharedPhase::TornDown => "torn_down",
        };
        f.write_str(phase)
    }
}

/// Build the descriptor of a shared environment from the shared band.
#[must_use]
pub fn shared_descriptor(config: &HarnessConfig) -> EnvironmentDescriptor {
    let prefix = format!("{}-shared", config.name_prefix);
    let identifiers = Identifiers::derive(
        &Seed::for_test("shared-environment"),
        &prefix,
        &IdentifierBand::SHARED,
    );
    let credential = SecretString::from(format!("shared-test-{}", identifiers.fingerprint));
    EnvironmentDescriptor::new(EnvironmentKind::Shared, identifiers, credential, config)
}

/// The shared environment registry.
pub struct SharedEnvironment {
    descriptor: Arc<EnvironmentDescriptor>,
    config: SharedEnvironmentConfig,
    health_timeout: Duration,
    provisioner: Arc<dyn Provisioner>,
    probe: Arc<dyn HealthProbe>,
    phase: AtomicU8,
    transition: Mutex<()>,
}

impl fmt::Debug for SharedEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedEnvironment")
            .field("instance", &self.descriptor.instance_name())
            .field("phase", &self.phase())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SharedEnvironment {
    /// Create the registry in `Uninitialized`. Nothing is provisioned yet.
    #[must_use]
    pub fn new(
        config: &HarnessConfig,
        provisioner: Arc<dyn Provisioner>,
        probe: Arc<dyn HealthProbe>,
    ) -> Arc<Self> {
        let descriptor = shared_descriptor(config);
        info!(
            target: "env_harness.shared",
            instance = %descriptor.instance_name(),
            subnet = %descriptor.subnet(),
            control_port = descriptor.ports().control,
            "Shared environment configured"
        );
        Arc::new(Self {
            descriptor: Arc::new(descriptor),
            config: config.shared(),
            health_timeout: config.health_timeout,
            provisioner,
            probe,
            phase: AtomicU8::new(SharedPhase::Uninitialized as u8),
            transition: Mutex::new(()),
        })
    }

    /// Current phase. Lock-free.
    #[must_use]
    pub fn phase(&self) -> SharedPhase {
        SharedPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    fn set_phase(&self, phase: SharedPhase) {
        debug!(target: "env_harness.shared", phase = %phase, "Shared environment phase change");
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Descriptor of the environment, handed out only once it is `Ready`.
    #[must_use]
    pub fn descriptor(&self) -> Option<Arc<EnvironmentDescriptor>> {
        (self.phase() == SharedPhase::Ready).then(|| Arc::clone(&self.descriptor))
    }

    /// Provision the environment on first call; later calls return at once.
    ///
    /// Concurrent first callers wait for the single initialization and all
    /// observe its result. A failed initialization returns to
    /// `Uninitialized`, so a later call may try again.
    #[instrument(skip_all, name = "env_harness.shared.setup")]
    pub async fn setup(&self) -> Result<Arc<EnvironmentDescriptor>, HarnessError> {
        if self.phase() == SharedPhase::Ready {
            return Ok(Arc::clone(&self.descriptor));
        }

        let _guard = self.transition.lock().await;
        match self.phase() {
            SharedPhase::Ready => return Ok(Arc::clone(&self.descriptor)),
            SharedPhase::TornDown => return Err(HarnessError::TornDown),
            SharedPhase::Uninitialized | SharedPhase::Initializing => {}
        }

        if self.config.skip_setup {
            info!(
                target: "env_harness.shared",
                instance = %self.descriptor.instance_name(),
                "Skipping shared environment setup (SKIP_SHARED_SETUP)"
            );
            self.set_phase(SharedPhase::Ready);
            return Ok(Arc::clone(&self.descriptor));
        }

        self.set_phase(SharedPhase::Initializing);
        info!(
            target: "env_harness.shared",
            instance = %self.descriptor.instance_name(),
            "Setting up shared environment"
        );

        match self.provision().await {
            Ok(()) => {
                self.set_phase(SharedPhase::Ready);
                info!(
                    target: "env_harness.shared",
                    instance = %self.descriptor.instance_name(),
                    base_url = %self.descriptor.base_url(),
                    "Shared environment ready"
                );
                Ok(Arc::clone(&self.descriptor))
            }
            Err(e) => {
                self.set_phase(SharedPhase::Uninitialized);
                error!(
                    target: "env_harness.shared",
                    instance = %self.descriptor.instance_name(),
                    error = %e,
                    "Shared environment setup failed"
                );
                Err(e)
            }
        }
    }

    async fn provision(&self) -> Result<(), HarnessError> {
        init_and_apply(self.provisioner.as_ref(), self.descriptor.module()).await?;
        if !self.config.settle.is_zero() {
            info!(
                target: "env_harness.shared",
                settle_secs = self.config.settle.as_secs(),
                "Waiting for shared environment to settle"
            );
            tokio::time::sleep(self.config.settle).await;
        }
        Ok(())
    }

    /// Destroy the environment once.
    ///
    /// Returns `None` when there was nothing to do (never set up, or already
    /// torn down). Destroy failures are logged and reported, never raised.
    /// Intended for a single finalization point.
    #[instrument(skip_all, name = "env_harness.shared.cleanup")]
    pub async fn cleanup(&self) -> Option<TeardownOutcome> {
        let _guard = self.transition.lock().await;
        let phase = self.phase();
        if phase != SharedPhase::Ready {
            debug!(
                target: "env_harness.shared",
                phase = %phase,
                "Shared environment cleanup is a no-op"
            );
            return None;
        }

        if self.config.skip_cleanup {
            info!(
                target: "env_harness.shared",
                instance = %self.descriptor.instance_name(),
                "Skipping shared environment cleanup (SKIP_SHARED_CLEANUP)"
            );
            return Some(TeardownOutcome::Skipped);
        }

        info!(
            target: "env_harness.shared",
            instance = %self.descriptor.instance_name(),
            "Tearing down shared environment"
        );
        let outcome = match self.provisioner.destroy(self.descriptor.module()).await {
            Ok(()) => TeardownOutcome::Succeeded,
            Err(e) => {
                error!(
                    target: "env_harness.shared",
                    instance = %self.descriptor.instance_name(),
                    error = %e,
                    "Shared environment teardown failed"
                );
                TeardownOutcome::Failed(e.to_string())
            }
        };
        self.set_phase(SharedPhase::TornDown);
        Some(outcome)
    }

    /// Probe the environment. Unhealthy unless `Ready`.
    pub async fn is_healthy(&self) -> bool {
        if self.phase() != SharedPhase::Ready {
            return false;
        }
        self.probe.is_healthy(&self.descriptor).await
    }

    /// Authenticated session against the environment.
    pub async fn session(&self) -> Result<ServiceSession, HarnessError> {
        let phase = self.phase();
        if phase != SharedPhase::Ready {
            return Err(HarnessError::NotReady(phase));
        }
        ServiceSession::authenticate(
            &self.descriptor.base_url(),
            self.descriptor.credential(),
            self.health_timeout,
        )
        .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::descriptor::ModuleConfig;
    use secrecy::ExposeSecret;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingProvisioner {
        applies: AtomicUsize,
        destroys: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Provisioner for CountingProvisioner {
        async fn init(&self, _: &ModuleConfig) -> Result<(), HarnessError> {
            Ok(())
        }
        async fn plan(&self, _: &ModuleConfig) -> Result<(), HarnessError> {
            Ok(())
        }
        async fn apply(&self, _: &ModuleConfig) -> Result<(), HarnessError> {
            self.applies.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn destroy(&self, _: &ModuleConfig) -> Result<(), HarnessError> {
            self.destroys.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn output(&self, _: &ModuleConfig, _: &str) -> Result<String, HarnessError> {
            Ok(String::new())
        }
    }

    struct AlwaysHealthy;

    #[async_trait::async_trait]
    impl HealthProbe for AlwaysHealthy {
        async fn is_healthy(&self, _: &EnvironmentDescriptor) -> bool {
            true
        }
    }

    fn config() -> HarnessConfig {
        HarnessConfig {
            shared_settle: Duration::ZERO,
            ..HarnessConfig::default()
        }
    }

    #[test]
    fn test_phase_round_trips_through_atomic() {
        for phase in [
            SharedPhase::Uninitialized,
            SharedPhase::Initializing,
            SharedPhase::Ready,
            SharedPhase::TornDown,
        ] {
            assert_eq!(SharedPhase::from_u8(phase as u8), phase);
        }
        assert_eq!(SharedPhase::TornDown.to_string(), "torn_down");
    }

    #[test]
    fn test_shared_descriptor_uses_shared_band() {
        let d = shared_descriptor(&config());
        assert_eq!(d.kind(), EnvironmentKind::Shared);
        assert!(d.instance_name().starts_with("pihole-shared-"));
        assert!(IdentifierBand::SHARED.contains_subnet(d.subnet()));
        assert!(IdentifierBand::SHARED.contains_port(d.ports().control));
        assert_eq!(
            d.credential().expose_secret(),
            format!("shared-test-{}", d.fingerprint())
        );
    }

    #[tokio::test]
    async fn test_lifecycle() {
        let provisioner = Arc::new(CountingProvisioner::default());
        let env = SharedEnvironment::new(&config(), provisioner.clone(), Arc::new(AlwaysHealthy));

        assert_eq!(env.phase(), SharedPhase::Uninitialized);
        assert!(env.descriptor().is_none());
        assert!(!env.is_healthy().await);

        env.setup().await.unwrap();
        env.setup().await.unwrap();
        assert_eq!(provisioner.applies.load(Ordering::SeqCst), 1);
        assert!(env.is_healthy().await);

        assert_eq!(env.cleanup().await, Some(TeardownOutcome::Succeeded));
        assert_eq!(env.cleanup().await, None);
        assert_eq!(provisioner.destroys.load(Ordering::SeqCst), 1);
        assert_eq!(env.phase(), SharedPhase::TornDown);
        assert!(matches!(env.setup().await, Err(HarnessError::TornDown)));
        assert!(matches!(
            env.session().await,
            Err(HarnessError::NotReady(SharedPhase::TornDown))
        ));
    }
}
