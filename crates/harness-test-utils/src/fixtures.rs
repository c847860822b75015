//! Pre-configured test data.

use env_harness::{
    CleanupConfig, DedicatedEnvironmentFactory, EnvironmentDescriptor, EnvironmentRequirements,
    HarnessConfig, Seed, TestCategory,
};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration with zero settle time and short timeouts.
///
/// State lives under a per-process directory in the system temp dir; the mock
/// collaborators never write to it.
#[must_use]
pub fn fast_config() -> HarnessConfig {
    HarnessConfig {
        cleanup_timeout: Duration::from_secs(2),
        shared_settle: Duration::ZERO,
        dedicated_settle: Duration::from_secs(2),
        health_timeout: Duration::from_secs(1),
        module_dir: PathBuf::from("terraform/modules/pihole"),
        state_dir: std::env::temp_dir().join(format!("harness-test-utils-{}", std::process::id())),
        ..HarnessConfig::default()
    }
}

/// Cleanup settings with the given per-action bound.
#[must_use]
pub fn cleanup_config(timeout: Duration) -> CleanupConfig {
    CleanupConfig {
        timeout,
        skip: false,
    }
}

/// Deterministic dedicated descriptor for `seed`.
#[must_use]
pub fn test_descriptor(seed: &str) -> EnvironmentDescriptor {
    DedicatedEnvironmentFactory::new(fast_config()).create_from_seed(
        &Seed::fixed(seed),
        &EnvironmentRequirements::isolated(TestCategory::Other("fixture".to_string())),
    )
}
