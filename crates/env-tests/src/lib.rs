//! Live Environment Test Suite
//!
//! Integration tests that provision real Pi-hole environments with Terraform
//! and Docker through `env-harness`. Non-destructive tests share one
//! long-lived environment per test binary; destructive tests each get a
//! dedicated environment that is torn down even when the test panics.
//!
//! # Features
//!
//! - `shared`: Parallel read-only API tests against the shared environment
//! - `dedicated`: Serial destructive lifecycle tests
//! - `performance`: Timing checks (skipped with `SKIP_PERFORMANCE_TEST=true`)
//! - `all`: Enable all test categories
//!
//! # Prerequisites
//!
//! 1. `terraform` and `docker` in PATH
//! 2. The Pi-hole module at `HARNESS_MODULE_DIR` (default `../terraform/modules/pihole`)
//!
//! # Usage
//!
//! ```bash
//! # From repo root - runs 0 env-tests (no default features)
//! cargo test
//!
//! # Shared environment tests only
//! cargo test -p env-tests --features shared
//!
//! # Destructive lifecycle tests
//! cargo test -p env-tests --features dedicated
//!
//! # Keep resources around to debug a failed run
//! SKIP_CLEANUP=true SKIP_SHARED_CLEANUP=true cargo test -p env-tests --features all
//! ```

pub mod fixtures;
