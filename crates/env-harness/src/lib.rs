//! Environment orchestration for the Pi-hole integration suite.
//!
//! Decides per test whether to reuse the shared environment or provision a
//! dedicated one, derives collision-resistant identifiers for dedicated
//! environments, and guarantees that every provisioned resource is torn down
//! once, in reverse creation order, within a bounded time.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]

/// Teardown registry with ordered, time-boxed, failure-isolated execution
pub mod cleanup;

/// Typed configuration loaded from the process environment
pub mod config;

/// Dedicated per-test environments
pub mod dedicated;

/// Environment descriptors and provisioning variables
pub mod descriptor;

/// Error taxonomy
pub mod error;

/// Session establishment and health probes
pub mod health;

/// Fingerprints, names, subnets and ports
pub mod identifiers;

/// Tracing subscriber setup
pub mod logging;

/// Provisioning collaborator seam and the Terraform adapter
pub mod provisioner;

/// Polling until an environment is healthy
pub mod readiness;

/// Test requirements and the routing rule
pub mod requirements;

/// Container runtime adapter and existence checks
pub mod runtime;

/// Requirement-driven environment acquisition
pub mod selector;

/// The process-wide shared environment
pub mod shared;

pub use cleanup::{
    with_cleanup, with_cleanup_validated, CleanupManager, CleanupReport, CleanupResource,
    ExistenceCheck, ResourceKind, ResourceRef, TeardownOutcome, ValidationReport,
};
pub use config::{CleanupConfig, ConfigError, HarnessConfig, SharedEnvironmentConfig};
pub use dedicated::{DedicatedEnvironment, DedicatedEnvironmentFactory};
pub use descriptor::{EnvironmentDescriptor, ModuleConfig, ProvisionVars};
pub use error::{HarnessError, ProvisionOp};
pub use health::{HealthProbe, HttpHealthChecker, ServiceSession};
pub use identifiers::{Fingerprint, IdentifierBand, Identifiers, PortPair, Seed, Subnet};
pub use provisioner::{Provisioner, TerraformProvisioner};
pub use requirements::{select, EnvironmentKind, EnvironmentRequirements, TestCategory};
pub use runtime::{DockerCli, LocalExistenceCheck};
pub use selector::{AcquiredEnvironment, EnvironmentSelector};
pub use shared::{SharedEnvironment, SharedPhase};
