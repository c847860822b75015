//! Container runtime plumbing.
//!
//! Removal and existence lookups for containers, networks and volumes go
//! through the `docker` CLI. Provisioned infrastructure is checked through its
//! state file.

use crate::cleanup::{ExistenceCheck, ResourceKind, ResourceRef};
use crate::error::HarnessError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Runtime output fragments that mean "object does not exist".
const NOT_FOUND_MARKERS: &[&str] = &["No such", "not found"];

/// Handle to the container runtime CLI.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: PathBuf,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("docker"),
        }
    }
}

impl DockerCli {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Remove a runtime object. Already-absent objects count as removed.
    #[instrument(skip_all, name = "env_harness.runtime.remove", fields(kind = %kind, object = %name))]
    pub async fn remove(&self, kind: ResourceKind, name: &str) -> Result<(), HarnessError> {
        let args = remove_args(kind, name)?;
        let output = self.exec(&args).await?;

        if output.status.success() {
            debug!(target: "env_harness.runtime", kind = %kind, object = %name, "Removed");
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_not_found(&stderr) {
            debug!(target: "env_harness.runtime", kind = %kind, object = %name, "Already absent");
            return Ok(());
        }
        Err(HarnessError::Runtime(format!(
            "removing {kind} {name} failed: {}",
            stderr.trim()
        )))
    }

    /// Whether a runtime object currently exists.
    pub async fn exists(&self, kind: ResourceKind, name: &str) -> Result<bool, HarnessError> {
        let subcommand = object_subcommand(kind)?;
        let output = self.exec(&[subcommand, "inspect", name]).await?;

        if output.status.success() {
            return Ok(true);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if is_not_found(&stderr) {
            Ok(false)
        } else {
            Err(HarnessError::Runtime(format!(
                "inspecting {kind} {name} failed: {}",
                stderr.trim()
            )))
        }
    }

    async fn exec(&self, args: &[&str]) -> Result<Output, HarnessError> {
        Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                HarnessError::Runtime(format!("failed to run {}: {e}", self.binary.display()))
            })
    }
}

fn object_subcommand(kind: ResourceKind) -> Result<&'static str, HarnessError> {
    match kind {
        ResourceKind::Container => Ok("container"),
        ResourceKind::Network => Ok("network"),
        ResourceKind::Volume => Ok("volume"),
        ResourceKind::Infrastructure => Err(HarnessError::Runtime(
            "infrastructure is not a container runtime object".to_string(),
        )),
    }
}

fn remove_args(kind: ResourceKind, name: &str) -> Result<Vec<&str>, HarnessError> {
    let subcommand = object_subcommand(kind)?;
    Ok(match kind {
        ResourceKind::Container => vec![subcommand, "rm", "-f", name],
        _ => vec![subcommand, "rm", name],
    })
}

fn is_not_found(stderr: &str) -> bool {
    NOT_FOUND_MARKERS.iter().any(|m| stderr.contains(m))
}

#[derive(Debug, Deserialize)]
struct StateFile {
    #[serde(default)]
    resources: Vec<serde_json::Value>,
}

/// Whether a state file still records managed resources.
///
/// A missing file means nothing is provisioned.
pub async fn state_has_resources(state_path: &Path) -> Result<bool, HarnessError> {
    let raw = match tokio::fs::read(state_path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(HarnessError::Runtime(format!(
                "reading {} failed: {e}",
                state_path.display()
            )))
        }
    };
    let state: StateFile = serde_json::from_slice(&raw).map_err(|e| {
        HarnessError::Runtime(format!("parsing {} failed: {e}", state_path.display()))
    })?;
    Ok(!state.resources.is_empty())
}

/// Existence check against the local runtime and state files.
#[derive(Debug, Clone, Default)]
pub struct LocalExistenceCheck {
    runtime: DockerCli,
}

impl LocalExistenceCheck {
    #[must_use]
    pub fn new(runtime: DockerCli) -> Self {
        Self { runtime }
    }
}

#[async_trait::async_trait]
impl ExistenceCheck for LocalExistenceCheck {
    async fn exists(&self, resource: &ResourceRef) -> Result<bool, HarnessError> {
        match resource.kind {
            ResourceKind::Infrastructure => {
                state_has_resources(Path::new(&resource.identifier)).await
            }
            kind => self.runtime.exists(kind, &resource.identifier).await,
        }
    }
}
