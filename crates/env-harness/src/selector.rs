//! Hands each test the environment its requirements call for.

use crate::dedicated::DedicatedEnvironmentFactory;
use crate::descriptor::EnvironmentDescriptor;
use crate::error::HarnessError;
use crate::requirements::{select, EnvironmentKind, EnvironmentRequirements};
use crate::shared::SharedEnvironment;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Environment handed to a test.
#[derive(Debug, Clone)]
pub enum AcquiredEnvironment {
    /// The shared environment; the test must not tear it down.
    Shared(Arc<EnvironmentDescriptor>),
    /// A fresh descriptor; the test owns provisioning and teardown.
    Dedicated(EnvironmentDescriptor),
}

impl AcquiredEnvironment {
    #[must_use]
    pub fn kind(&self) -> EnvironmentKind {
        match self {
            AcquiredEnvironment::Shared(_) => EnvironmentKind::Shared,
            AcquiredEnvironment::Dedicated(_) => EnvironmentKind::Dedicated,
        }
    }

    #[must_use]
    pub fn descriptor(&self) -> &EnvironmentDescriptor {
        match self {
            AcquiredEnvironment::Shared(d) => d,
            AcquiredEnvironment::Dedicated(d) => d,
        }
    }
}

/// Routes requests to the shared registry or the dedicated factory.
#[derive(Debug, Clone)]
pub struct EnvironmentSelector {
    shared: Arc<SharedEnvironment>,
    factory: DedicatedEnvironmentFactory,
}

impl EnvironmentSelector {
    #[must_use]
    pub fn new(shared: Arc<SharedEnvironment>, factory: DedicatedEnvironmentFactory) -> Self {
        Self { shared, factory }
    }

    #[must_use]
    pub fn shared(&self) -> &Arc<SharedEnvironment> {
        &self.shared
    }

    #[must_use]
    pub fn factory(&self) -> &DedicatedEnvironmentFactory {
        &self.factory
    }

    /// Acquire an environment for `test_name`.
    ///
    /// A shared request sets the shared environment up if needed and then
    /// requires it to be healthy. An unhealthy shared environment is an
    /// acquisition error; it is never replaced by a dedicated one.
    #[instrument(skip_all, name = "env_harness.selector.acquire", fields(test = %test_name))]
    pub async fn acquire(
        &self,
        test_name: &str,
        requirements: &EnvironmentRequirements,
    ) -> Result<AcquiredEnvironment, HarnessError> {
        let kind = select(requirements);
        info!(
            target: "env_harness.selector",
            test = %test_name,
            kind = %kind,
            category = %requirements.category(),
            destructive = requirements.is_destructive(),
            "Selecting environment"
        );

        match kind {
            EnvironmentKind::Shared => {
                let descriptor = self.shared.setup().await?;
                if !self.shared.is_healthy().await {
                    warn!(
                        target: "env_harness.selector",
                        test = %test_name,
                        instance = %descriptor.instance_name(),
                        "Shared environment is unhealthy"
                    );
                    return Err(HarnessError::Acquisition(format!(
                        "shared environment {} is unhealthy",
                        descriptor.instance_name()
                    )));
                }
                Ok(AcquiredEnvironment::Shared(descriptor))
            }
            EnvironmentKind::Dedicated => Ok(AcquiredEnvironment::Dedicated(
                self.factory.create(test_name, requirements),
            )),
        }
    }
}
