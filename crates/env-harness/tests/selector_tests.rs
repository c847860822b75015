//! Environment selection and dedicated provisioning with mock collaborators.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use env_harness::{
    AcquiredEnvironment, CleanupManager, DedicatedEnvironment, DedicatedEnvironmentFactory,
    DockerCli, EnvironmentKind, EnvironmentRequirements, EnvironmentSelector, HarnessError,
    IdentifierBand, ResourceKind, SharedEnvironment, SharedPhase, TeardownOutcome, TestCategory,
};
use harness_test_utils::{cleanup_config, fast_config, MockHealthProbe, MockProvisioner};
use std::sync::Arc;
use std::time::Duration;

fn selector(provisioner: &Arc<MockProvisioner>, probe: MockHealthProbe) -> EnvironmentSelector {
    let config = fast_config();
    let shared = SharedEnvironment::new(&config, provisioner.clone(), Arc::new(probe));
    EnvironmentSelector::new(shared, DedicatedEnvironmentFactory::new(config))
}

#[tokio::test]
async fn test_shared_request_gets_shared_environment() {
    let provisioner = Arc::new(MockProvisioner::succeeding());
    let selector = selector(&provisioner, MockHealthProbe::healthy());

    let env = selector
        .acquire("test_api_stats", &EnvironmentRequirements::shared(TestCategory::Api))
        .await
        .unwrap();

    assert_eq!(env.kind(), EnvironmentKind::Shared);
    assert!(IdentifierBand::SHARED.contains_subnet(env.descriptor().subnet()));
    assert_eq!(selector.shared().phase(), SharedPhase::Ready);

    // Second shared request reuses the same instance.
    let again = selector
        .acquire("test_dns_lookup", &EnvironmentRequirements::shared(TestCategory::Dns))
        .await
        .unwrap();
    assert_eq!(again.descriptor().instance_name(), env.descriptor().instance_name());
    assert_eq!(provisioner.apply_count(), 1);
}

#[tokio::test]
async fn test_destructive_request_never_touches_shared() {
    let provisioner = Arc::new(MockProvisioner::succeeding());
    let selector = selector(&provisioner, MockHealthProbe::healthy());

    for use_shared in [true, false] {
        let reqs = EnvironmentRequirements::new(use_shared, true, TestCategory::Destructive);
        let env = selector.acquire("test_container_restart", &reqs).await.unwrap();

        assert!(matches!(env, AcquiredEnvironment::Dedicated(_)));
        assert!(IdentifierBand::DEDICATED.contains_subnet(env.descriptor().subnet()));
    }
    assert_eq!(selector.shared().phase(), SharedPhase::Uninitialized);
    assert_eq!(provisioner.apply_count(), 0);
}

#[tokio::test]
async fn test_unhealthy_shared_is_acquisition_failure() {
    let provisioner = Arc::new(MockProvisioner::succeeding());
    let selector = selector(&provisioner, MockHealthProbe::unhealthy());

    let err = selector
        .acquire("test_read_only", &EnvironmentRequirements::shared(TestCategory::ReadOnly))
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Acquisition(_)));
    assert!(err.is_acquisition_failure());
}

#[tokio::test]
async fn test_failed_shared_setup_surfaces_error() {
    let provisioner = Arc::new(MockProvisioner::builder().fail_applies(1).build());
    let selector = selector(&provisioner, MockHealthProbe::healthy());

    let err = selector
        .acquire("test_read_only", &EnvironmentRequirements::shared(TestCategory::ReadOnly))
        .await
        .unwrap_err();

    assert!(matches!(err, HarnessError::Provision { .. }));
    assert_eq!(selector.shared().phase(), SharedPhase::Uninitialized);
}

#[tokio::test]
async fn test_dedicated_provision_registers_in_creation_order() {
    let provisioner = Arc::new(MockProvisioner::succeeding());
    let probe = MockHealthProbe::healthy();
    let cleanup = CleanupManager::new(cleanup_config(Duration::from_secs(5)));
    let runtime = DockerCli::with_binary("/nonexistent/docker");
    let factory = DedicatedEnvironmentFactory::new(fast_config());
    let descriptor = factory.create(
        "test_dedicated_lifecycle",
        &EnvironmentRequirements::destructive(TestCategory::Destructive),
    );
    let instance = descriptor.instance_name().to_string();

    let env = DedicatedEnvironment::provision(
        provisioner.clone(),
        &probe,
        &runtime,
        descriptor,
        &cleanup,
        Duration::from_secs(2),
    )
    .await
    .unwrap();

    assert_eq!(env.descriptor().instance_name(), instance);
    assert_eq!(provisioner.apply_count(), 1);

    let kinds: Vec<ResourceKind> = cleanup.registered().iter().map(|r| r.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ResourceKind::Infrastructure,
            ResourceKind::Network,
            ResourceKind::Volume,
            ResourceKind::Volume,
            ResourceKind::Container,
        ]
    );

    let report = cleanup.run_all().await;

    let order: Vec<ResourceKind> = report.records().iter().map(|r| r.resource.kind).collect();
    assert_eq!(
        order,
        vec![
            ResourceKind::Container,
            ResourceKind::Volume,
            ResourceKind::Volume,
            ResourceKind::Network,
            ResourceKind::Infrastructure,
        ]
    );
    // The runtime binary is missing, so runtime removals fail; infrastructure
    // destroy still runs.
    assert_eq!(report.failed(), 4);
    assert_eq!(
        report.records().last().map(|r| &r.outcome),
        Some(&TeardownOutcome::Succeeded)
    );
    assert_eq!(provisioner.destroyed(), vec![instance]);
}

#[tokio::test(start_paused = true)]
async fn test_dedicated_provision_waits_for_health() {
    let provisioner = Arc::new(MockProvisioner::succeeding());
    let probe = MockHealthProbe::healthy_after(3);
    let cleanup = CleanupManager::new(cleanup_config(Duration::from_secs(5)));
    let descriptor = DedicatedEnvironmentFactory::new(fast_config())
        .create("test_slow_start", &EnvironmentRequirements::isolated(TestCategory::Api));

    DedicatedEnvironment::provision(
        provisioner.clone(),
        &probe,
        &DockerCli::new(),
        descriptor,
        &cleanup,
        Duration::from_secs(30),
    )
    .await
    .unwrap();

    assert_eq!(probe.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_dedicated_never_healthy_keeps_resources_registered() {
    let provisioner = Arc::new(MockProvisioner::succeeding());
    let probe = MockHealthProbe::unhealthy();
    let cleanup = CleanupManager::new(cleanup_config(Duration::from_secs(5)));
    let descriptor = DedicatedEnvironmentFactory::new(fast_config())
        .create("test_never_ready", &EnvironmentRequirements::isolated(TestCategory::Api));

    let err = DedicatedEnvironment::provision(
        provisioner.clone(),
        &probe,
        &DockerCli::new(),
        descriptor,
        &cleanup,
        Duration::from_secs(5),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HarnessError::ReadinessTimeout(_)));
    assert_eq!(cleanup.pending_count(), 5);
}

#[tokio::test]
async fn test_dedicated_apply_failure_keeps_resources_registered() {
    let provisioner = Arc::new(MockProvisioner::builder().fail_applies(1).build());
    let probe = MockHealthProbe::healthy();
    let cleanup = CleanupManager::new(cleanup_config(Duration::from_secs(5)));
    let descriptor = DedicatedEnvironmentFactory::new(fast_config())
        .create("test_apply_fails", &EnvironmentRequirements::isolated(TestCategory::Api));

    let err = DedicatedEnvironment::provision(
        provisioner.clone(),
        &probe,
        &DockerCli::new(),
        descriptor,
        &cleanup,
        Duration::from_secs(5),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, HarnessError::Provision { .. }));
    assert_eq!(probe.call_count(), 0);
    assert_eq!(cleanup.pending_count(), 5);
}
