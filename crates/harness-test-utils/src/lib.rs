//! # Harness Test Utilities
//!
//! Mocks and fixtures for exercising `env-harness` without Terraform, Docker
//! or a deployed service.
//!
//! ## Modules
//!
//! - `mock_provisioner` - Counting provisioner with configurable failures and delays
//! - `mock_health` - Health probe with a switchable answer
//! - `mock_existence` - Existence check for cleanup validation
//! - `teardown_recorder` - Teardown actions that succeed, fail, hang or panic
//! - `fixtures` - Fast configuration and deterministic descriptors
//!
//! ## Usage
//!
//! ```rust,ignore
//! use harness_test_utils::*;
//!
//! #[tokio::test]
//! async fn test_example() {
//!     let provisioner = Arc::new(MockProvisioner::succeeding());
//!     let probe = Arc::new(MockHealthProbe::healthy());
//!     let shared = SharedEnvironment::new(&fast_config(), provisioner.clone(), probe);
//!
//!     shared.setup().await.unwrap();
//!     assert_eq!(provisioner.apply_count(), 1);
//! }
//! ```

pub mod fixtures;
pub mod mock_existence;
pub mod mock_health;
pub mod mock_provisioner;
pub mod teardown_recorder;

// Re-export commonly used items
pub use fixtures::*;
pub use mock_existence::*;
pub use mock_health::*;
pub use mock_provisioner::*;
pub use teardown_recorder::*;
