//! Performance Tests
//!
//! Timing checks for the shared-environment pattern. Set
//! `SKIP_PERFORMANCE_TEST=true` to skip them.

#![cfg(feature = "performance")]

use env_harness::TestCategory;
use env_tests::fixtures::{config, shared_descriptor, shared_environment};
use futures::future::join_all;
use std::time::{Duration, Instant};

/// Five sequential API checks against a warm shared environment.
const SEQUENTIAL_BUDGET: Duration = Duration::from_secs(10);

/// Ten concurrent API checks against a warm shared environment.
const PARALLEL_BUDGET: Duration = Duration::from_secs(10);

#[tokio::test]
async fn test_shared_environment_api_latency() {
    if config().skip_performance_test {
        eprintln!("Skipping performance test (SKIP_PERFORMANCE_TEST)");
        return;
    }

    let setup_started = Instant::now();
    shared_descriptor("test_shared_environment_api_latency", TestCategory::Performance).await;
    eprintln!("Shared environment available after {:?}", setup_started.elapsed());

    let shared = shared_environment();
    let started = Instant::now();
    for _ in 0..5 {
        let session = shared.session().await.expect("session");
        session.verify_access().await.expect("API check");
    }
    let elapsed = started.elapsed();

    eprintln!("5 sequential API checks: {elapsed:?}");
    assert!(
        elapsed < SEQUENTIAL_BUDGET,
        "Sequential API checks took {elapsed:?}, budget {SEQUENTIAL_BUDGET:?}"
    );
}

#[tokio::test]
async fn test_parallel_health_checks() {
    if config().skip_performance_test {
        eprintln!("Skipping performance test (SKIP_PERFORMANCE_TEST)");
        return;
    }

    shared_descriptor("test_parallel_health_checks", TestCategory::Performance).await;
    let shared = shared_environment();

    let started = Instant::now();
    let results = join_all((0..10).map(|_| {
        let shared = shared.clone();
        async move { shared.is_healthy().await }
    }))
    .await;
    let elapsed = started.elapsed();

    assert!(results.iter().all(|healthy| *healthy), "All parallel probes should pass");
    eprintln!("10 parallel health checks: {elapsed:?}");
    assert!(
        elapsed < PARALLEL_BUDGET,
        "Parallel health checks took {elapsed:?}, budget {PARALLEL_BUDGET:?}"
    );
}
