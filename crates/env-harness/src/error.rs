//! Error types for environment orchestration.
//!
//! Only acquisition-side failures are errors. Teardown failures, teardown
//! timeouts and validation mismatches are recorded as outcomes by the cleanup
//! manager and never surface through this type.

use crate::config::ConfigError;
use crate::shared::SharedPhase;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Operations exposed by the provisioning collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOp {
    Init,
    Plan,
    Apply,
    Destroy,
    Output,
}

impl fmt::Display for ProvisionOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            ProvisionOp::Init => "init",
            ProvisionOp::Plan => "plan",
            ProvisionOp::Apply => "apply",
            ProvisionOp::Destroy => "destroy",
            ProvisionOp::Output => "output",
        };
        f.write_str(op)
    }
}

/// Errors surfaced by the environment harness.
#[derive(Error, Debug)]
pub enum HarnessError {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A provisioning operation failed
    #[error("Provisioning {operation} failed: {message}")]
    Provision {
        operation: ProvisionOp,
        message: String,
    },

    /// A container runtime command failed
    #[error("Container runtime error: {0}")]
    Runtime(String),

    /// An environment could not be handed to the requesting test
    #[error("Environment acquisition failed: {0}")]
    Acquisition(String),

    /// The shared environment is not in the `Ready` phase
    #[error("Shared environment not ready (phase: {0})")]
    NotReady(SharedPhase),

    /// The shared environment has already been torn down
    #[error("Shared environment already torn down")]
    TornDown,

    /// Session establishment or an authenticated request failed
    #[error("Session error: {0}")]
    Session(String),

    /// The environment did not become healthy within the budget
    #[error("Environment not healthy after {0:?}")]
    ReadinessTimeout(Duration),
}

impl HarnessError {
    /// Shorthand for a provisioning failure.
    pub fn provision(operation: ProvisionOp, message: impl Into<String>) -> Self {
        HarnessError::Provision {
            operation,
            message: message.into(),
        }
    }

    /// Whether this error means the test could not obtain an environment.
    #[must_use]
    pub fn is_acquisition_failure(&self) -> bool {
        matches!(
            self,
            HarnessError::Acquisition(_)
                | HarnessError::NotReady(_)
                | HarnessError::TornDown
                | HarnessError::ReadinessTimeout(_)
        )
    }
}

impl From<reqwest::Error> for HarnessError {
    fn from(e: reqwest::Error) -> Self {
        HarnessError::Session(e.to_string())
    }
}
