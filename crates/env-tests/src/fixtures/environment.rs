//! Process-wide environment handles for the live suite.
//!
//! Each test binary owns one shared environment. It is created on first use
//! and torn down from a process exit hook, because the test harness offers no
//! suite-level teardown and a `OnceLock` is never dropped.

use env_harness::logging::init_test_logging;
use env_harness::{
    AcquiredEnvironment, CleanupManager, DedicatedEnvironment, DedicatedEnvironmentFactory,
    DockerCli, EnvironmentDescriptor, EnvironmentRequirements, EnvironmentSelector,
    HarnessConfig, HttpHealthChecker, SharedEnvironment, TerraformProvisioner, TestCategory,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

static CONFIG: OnceLock<HarnessConfig> = OnceLock::new();
static SHARED: OnceLock<Arc<SharedEnvironment>> = OnceLock::new();
static EXIT_TEARDOWN_RUNNING: AtomicBool = AtomicBool::new(false);

/// Harness configuration from the process environment.
///
/// # Panics
///
/// Panics if a recognized variable holds an invalid value.
pub fn config() -> &'static HarnessConfig {
    CONFIG.get_or_init(|| {
        init_test_logging();
        HarnessConfig::from_env().expect("Invalid harness configuration in environment")
    })
}

/// The shared environment of this test binary (not yet set up).
pub fn shared_environment() -> Arc<SharedEnvironment> {
    SHARED
        .get_or_init(|| {
            let config = config();
            let env = SharedEnvironment::new(
                config,
                Arc::new(TerraformProvisioner::new()),
                Arc::new(HttpHealthChecker::new(config.health_timeout)),
            );
            register_exit_teardown();
            env
        })
        .clone()
}

/// Selector over this binary's shared environment.
pub fn selector() -> EnvironmentSelector {
    EnvironmentSelector::new(
        shared_environment(),
        DedicatedEnvironmentFactory::new(config().clone()),
    )
}

/// Cleanup manager configured from the environment.
pub fn cleanup_manager() -> CleanupManager {
    CleanupManager::new(config().cleanup())
}

/// Acquire the shared environment for a read-only test.
///
/// # Panics
///
/// Panics if the shared environment cannot be set up or is unhealthy.
pub async fn shared_descriptor(test_name: &str, category: TestCategory) -> Arc<EnvironmentDescriptor> {
    match selector()
        .acquire(test_name, &EnvironmentRequirements::shared(category))
        .await
    {
        Ok(AcquiredEnvironment::Shared(descriptor)) => descriptor,
        Ok(AcquiredEnvironment::Dedicated(_)) => {
            panic!("Shared requirements were routed to a dedicated environment")
        }
        Err(e) => panic!("Shared environment unavailable for {test_name}: {e}"),
    }
}

/// Provision a dedicated environment whose teardown is registered on
/// `cleanup`.
///
/// # Panics
///
/// Panics if provisioning or readiness fails. Resources registered before the
/// failure stay on `cleanup`.
pub async fn provision_dedicated(
    test_name: &str,
    requirements: &EnvironmentRequirements,
    cleanup: &CleanupManager,
) -> DedicatedEnvironment {
    let config = config();
    let descriptor = match selector().acquire(test_name, requirements).await {
        Ok(AcquiredEnvironment::Dedicated(descriptor)) => descriptor,
        Ok(AcquiredEnvironment::Shared(_)) => {
            panic!("{test_name} asked for a dedicated environment but was routed to shared")
        }
        Err(e) => panic!("Could not acquire environment for {test_name}: {e}"),
    };

    DedicatedEnvironment::provision(
        Arc::new(TerraformProvisioner::new()),
        &HttpHealthChecker::new(config.health_timeout),
        &DockerCli::new(),
        descriptor,
        cleanup,
        config.dedicated_settle,
    )
    .await
    .unwrap_or_else(|e| panic!("Dedicated environment for {test_name} failed: {e}"))
}

fn register_exit_teardown() {
    extern "C" fn teardown_shared_at_exit() {
        if EXIT_TEARDOWN_RUNNING.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(env) = SHARED.get() else {
            return;
        };

        // The test runtimes are gone by now; drive teardown on a fresh one.
        match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => {
                if let Some(outcome) = runtime.block_on(env.cleanup()) {
                    info!(target: "env_tests.fixtures", outcome = %outcome, "Shared environment teardown finished");
                }
            }
            Err(e) => {
                warn!(target: "env_tests.fixtures", error = %e, "Could not start runtime for shared teardown");
            }
        }
    }

    // SAFETY: the handler is a plain `extern "C"` function with no
    // arguments, registered once per process.
    unsafe {
        libc::atexit(teardown_shared_at_exit);
    }
}
