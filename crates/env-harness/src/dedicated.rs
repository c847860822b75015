//! Dedicated per-test environments.
//!
//! The factory only builds descriptors; it keeps no registry and never reuses
//! anything. Provisioning registers every resource with the caller's cleanup
//! manager before the apply runs, so a partially applied environment is still
//! torn down.

use crate::cleanup::CleanupManager;
use crate::config::HarnessConfig;
use crate::descriptor::EnvironmentDescriptor;
use crate::error::HarnessError;
use crate::health::{HealthProbe, ServiceSession};
use crate::identifiers::{IdentifierBand, Identifiers, Seed};
use crate::provisioner::{init_and_apply, Provisioner};
use crate::readiness::wait_until_healthy;
use crate::requirements::{EnvironmentKind, EnvironmentRequirements};
use crate::runtime::DockerCli;
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Builds fresh descriptors in the dedicated band.
#[derive(Debug, Clone)]
pub struct DedicatedEnvironmentFactory {
    config: HarnessConfig,
}

impl DedicatedEnvironmentFactory {
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Fresh descriptor for one test, salted with time and a random nonce.
    #[must_use]
    pub fn create(
        &self,
        test_name: &str,
        requirements: &EnvironmentRequirements,
    ) -> EnvironmentDescriptor {
        self.create_from_seed(&Seed::for_test(test_name), requirements)
    }

    /// Descriptor for an explicit seed. Equal seeds give equal identifiers.
    #[must_use]
    pub fn create_from_seed(
        &self,
        seed: &Seed,
        requirements: &EnvironmentRequirements,
    ) -> EnvironmentDescriptor {
        let identifiers =
            Identifiers::derive(seed, &self.config.name_prefix, &IdentifierBand::DEDICATED);
        let credential =
            SecretString::from(format!("test-password-{}", identifiers.fingerprint));
        let descriptor =
            EnvironmentDescriptor::new(EnvironmentKind::Dedicated, identifiers, credential, &self.config);

        info!(
            target: "env_harness.dedicated",
            instance = %descriptor.instance_name(),
            network = %descriptor.network_name(),
            subnet = %descriptor.subnet(),
            control_port = descriptor.ports().control,
            data_port = descriptor.ports().data,
            category = %requirements.category(),
            destructive = requirements.is_destructive(),
            "Created dedicated environment descriptor"
        );
        descriptor
    }
}

/// A provisioned, healthy dedicated environment.
#[derive(Debug)]
pub struct DedicatedEnvironment {
    descriptor: EnvironmentDescriptor,
}

impl DedicatedEnvironment {
    /// Register teardown, apply, then wait for the service to become healthy.
    ///
    /// Registration order is infrastructure, network, volumes, container, so
    /// teardown removes the container first and destroys the module last.
    /// On error the registered resources stay with `cleanup`.
    #[instrument(skip_all, name = "env_harness.dedicated.provision", fields(instance = %descriptor.instance_name()))]
    pub async fn provision(
        provisioner: Arc<dyn Provisioner>,
        probe: &dyn HealthProbe,
        runtime: &DockerCli,
        descriptor: EnvironmentDescriptor,
        cleanup: &CleanupManager,
        readiness_budget: Duration,
    ) -> Result<Self, HarnessError> {
        cleanup.register_infrastructure(
            format!("{}-infrastructure", descriptor.instance_name()),
            Arc::clone(&provisioner),
            descriptor.module().clone(),
        );
        cleanup.register_network(runtime, descriptor.network_name());
        for volume in descriptor.volume_names() {
            cleanup.register_volume(runtime, volume);
        }
        cleanup.register_container(runtime, descriptor.instance_name());

        info!(
            target: "env_harness.dedicated",
            instance = %descriptor.instance_name(),
            "Provisioning dedicated environment"
        );
        init_and_apply(provisioner.as_ref(), descriptor.module()).await?;
        wait_until_healthy(probe, &descriptor, readiness_budget).await?;

        info!(
            target: "env_harness.dedicated",
            instance = %descriptor.instance_name(),
            base_url = %descriptor.base_url(),
            "Dedicated environment ready"
        );
        Ok(Self { descriptor })
    }

    #[must_use]
    pub fn descriptor(&self) -> &EnvironmentDescriptor {
        &self.descriptor
    }

    /// Authenticated session against this environment.
    pub async fn session(&self, timeout: Duration) -> Result<ServiceSession, HarnessError> {
        ServiceSession::authenticate(
            &self.descriptor.base_url(),
            self.descriptor.credential(),
            timeout,
        )
        .await
    }
}
