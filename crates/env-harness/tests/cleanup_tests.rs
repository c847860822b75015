//! Cleanup manager behavior: ordering, isolation, skip, validation and
//! guaranteed teardown around a panicking test body.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use env_harness::{
    with_cleanup, with_cleanup_validated, CleanupConfig, CleanupManager, HarnessError,
    ResourceKind, TeardownOutcome,
};
use futures::FutureExt;
use harness_test_utils::{cleanup_config, MockExistenceCheck, TeardownRecorder};
use std::panic::AssertUnwindSafe;
use std::time::Duration;

fn manager() -> CleanupManager {
    CleanupManager::new(cleanup_config(Duration::from_secs(5)))
}

#[tokio::test]
async fn test_reverse_registration_order() {
    let manager = manager();
    let recorder = TeardownRecorder::new();
    recorder.register_ok(&manager, "A", ResourceKind::Infrastructure);
    recorder.register_ok(&manager, "B", ResourceKind::Network);
    recorder.register_ok(&manager, "C", ResourceKind::Container);

    let report = manager.run_all().await;

    assert_eq!(recorder.invocations(), vec!["C", "B", "A"]);
    assert_eq!(report.processed(), 3);
    assert_eq!(report.succeeded(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_hung_action_is_abandoned_and_rest_still_run() {
    let manager = CleanupManager::new(cleanup_config(Duration::from_secs(300)));
    let recorder = TeardownRecorder::new();
    recorder.register_ok(&manager, "network", ResourceKind::Network);
    recorder.register_hanging(&manager, "container", ResourceKind::Container);
    recorder.register_ok(&manager, "volume", ResourceKind::Volume);

    let started = tokio::time::Instant::now();
    let report = manager.run_all().await;

    assert_eq!(recorder.invocations(), vec!["volume", "container", "network"]);
    assert_eq!(report.outcome_of("container"), Some(&TeardownOutcome::TimedOut));
    assert_eq!(report.outcome_of("network"), Some(&TeardownOutcome::Succeeded));
    assert_eq!(report.timed_out(), 1);
    assert!(started.elapsed() >= Duration::from_secs(300));
    assert!(started.elapsed() < Duration::from_secs(301));
}

#[tokio::test]
async fn test_blocking_work_offloaded_from_action_still_times_out() {
    let manager = CleanupManager::new(cleanup_config(Duration::from_millis(100)));
    let recorder = TeardownRecorder::new();
    recorder.register_ok(&manager, "network", ResourceKind::Network);
    manager.register_action("container", ResourceKind::Container, "container", || async {
        tokio::task::spawn_blocking(|| std::thread::sleep(Duration::from_secs(1)))
            .await
            .map_err(|e| HarnessError::Runtime(e.to_string()))
    });

    let started = std::time::Instant::now();
    let report = manager.run_all().await;

    assert_eq!(report.outcome_of("container"), Some(&TeardownOutcome::TimedOut));
    assert_eq!(report.outcome_of("network"), Some(&TeardownOutcome::Succeeded));
    assert!(started.elapsed() < Duration::from_millis(900));
}

#[tokio::test]
async fn test_failure_is_recorded_and_iteration_continues() {
    let manager = manager();
    let recorder = TeardownRecorder::new();
    recorder.register_ok(&manager, "network", ResourceKind::Network);
    recorder.register_failing(&manager, "container", ResourceKind::Container);
    recorder.register_ok(&manager, "volume", ResourceKind::Volume);

    let report = manager.run_all().await;

    assert_eq!(recorder.invocations(), vec!["volume", "container", "network"]);
    assert_eq!(report.order(), vec!["volume", "container", "network"]);
    assert!(matches!(
        report.outcome_of("container"),
        Some(TeardownOutcome::Failed(reason)) if reason.contains("Mock teardown failure")
    ));
    assert_eq!(report.outcome_of("volume"), Some(&TeardownOutcome::Succeeded));
    assert_eq!(report.outcome_of("network"), Some(&TeardownOutcome::Succeeded));
    assert_eq!(report.failed(), 1);
    assert_eq!(report.succeeded(), 2);
}

#[tokio::test]
async fn test_panicking_action_is_recorded_as_failure() {
    let manager = manager();
    let recorder = TeardownRecorder::new();
    recorder.register_ok(&manager, "network", ResourceKind::Network);
    recorder.register_panicking(&manager, "container", ResourceKind::Container);

    let report = manager.run_all().await;

    assert!(matches!(
        report.outcome_of("container"),
        Some(TeardownOutcome::Failed(reason)) if reason.contains("panicked")
    ));
    assert_eq!(recorder.count("network"), 1);
}

#[tokio::test]
async fn test_skip_flag_invokes_nothing() {
    let manager = CleanupManager::new(CleanupConfig {
        timeout: Duration::from_secs(5),
        skip: true,
    });
    let recorder = TeardownRecorder::new();
    recorder.register_ok(&manager, "network", ResourceKind::Network);
    recorder.register_failing(&manager, "container", ResourceKind::Container);
    recorder.register_hanging(&manager, "volume", ResourceKind::Volume);

    let report = manager.run_all().await;

    assert!(recorder.invocations().is_empty());
    assert_eq!(report.skipped(), 3);
    assert_eq!(report.processed(), 3);
}

#[tokio::test]
async fn test_panicking_body_tears_down_once_then_resumes_panic() {
    let manager = manager();
    let recorder = TeardownRecorder::new();
    let body_recorder = recorder.clone();

    let result = AssertUnwindSafe(with_cleanup(manager.clone(), |cm| async move {
        body_recorder.register_ok(&cm, "network", ResourceKind::Network);
        body_recorder.register_ok(&cm, "container", ResourceKind::Container);
        panic!("assertion failed inside test body");
    }))
    .catch_unwind()
    .await;

    let payload = result.expect_err("panic should propagate");
    assert_eq!(
        payload.downcast_ref::<&str>().copied(),
        Some("assertion failed inside test body")
    );
    assert_eq!(recorder.invocations(), vec!["container", "network"]);
    assert_eq!(recorder.count("container"), 1);
    assert_eq!(manager.pending_count(), 0);

    // Nothing left to run a second time.
    manager.run_all().await;
    assert_eq!(recorder.invocations().len(), 2);
}

#[tokio::test]
async fn test_with_cleanup_runs_teardown_after_normal_return() {
    let recorder = TeardownRecorder::new();
    let body_recorder = recorder.clone();

    let value = with_cleanup(manager(), |cm| async move {
        body_recorder.register_ok(&cm, "volume", ResourceKind::Volume);
        assert!(body_recorder.invocations().is_empty());
        "done"
    })
    .await;

    assert_eq!(value, "done");
    assert_eq!(recorder.invocations(), vec!["volume"]);
}

#[tokio::test]
async fn test_validation_reports_leaks_without_failing() {
    let manager = manager();
    let recorder = TeardownRecorder::new();
    recorder.register_ok(&manager, "network", ResourceKind::Network);
    recorder.register_failing(&manager, "container", ResourceKind::Container);
    recorder.register_ok(&manager, "volume", ResourceKind::Volume);
    manager.run_all().await;

    let checker = MockExistenceCheck::all_removed()
        .with_present("container")
        .with_error("volume");
    let report = manager.validate(&checker).await;

    assert_eq!(report.checked, 3);
    assert_eq!(checker.call_count(), 3);
    assert_eq!(report.leaked.len(), 1);
    let leaked = report.leaked.first().unwrap();
    assert_eq!(leaked.name, "container");
    assert_eq!(leaked.kind, ResourceKind::Container);
    assert_eq!(report.unverified.len(), 1);
    assert!(!report.is_clean());
}

#[tokio::test]
async fn test_with_cleanup_validated_checks_after_teardown() {
    let recorder = TeardownRecorder::new();
    let body_recorder = recorder.clone();
    let checker = MockExistenceCheck::all_removed();

    with_cleanup_validated(manager(), &checker, |cm| async move {
        body_recorder.register_ok(&cm, "network", ResourceKind::Network);
        body_recorder.register_ok(&cm, "container", ResourceKind::Container);
    })
    .await;

    assert_eq!(recorder.invocations(), vec!["container", "network"]);
    assert_eq!(checker.call_count(), 2);
}

#[tokio::test]
async fn test_independent_managers_do_not_share_resources() {
    let first = manager();
    let second = manager();
    let recorder = TeardownRecorder::new();
    recorder.register_ok(&first, "first-net", ResourceKind::Network);
    recorder.register_ok(&second, "second-net", ResourceKind::Network);

    first.run_all().await;

    assert_eq!(recorder.invocations(), vec!["first-net"]);
    assert_eq!(second.pending_count(), 1);
}
