//! Provisioning collaborator.
//!
//! [`Provisioner`] is the seam between the harness and the tool that actually
//! creates infrastructure. [`TerraformProvisioner`] drives the `terraform`
//! CLI; tests substitute a mock.
//!
//! Each environment runs with its own state file and data directory, so any
//! number of environments can be applied or destroyed concurrently from the
//! same module directory.

use crate::descriptor::ModuleConfig;
use crate::error::{HarnessError, ProvisionOp};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

/// Default number of retries for transient provisioning errors.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between retries.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Longest stderr excerpt carried in an error.
const MAX_ERROR_EXCERPT_CHARS: usize = 600;

/// Error messages known to be transient (provider downloads, plugin start-up,
/// registry hiccups). Matching failures are retried.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection reset by peer",
    "TLS handshake timeout",
    "timeout while waiting for plugin to start",
    "Failed to install provider",
    "Error installing provider",
    "Failed to query available provider packages",
    "could not query provider registry",
    "Client.Timeout exceeded while awaiting headers",
    "unexpected EOF",
];

/// Operations consumed from the provisioning tool.
///
/// `destroy` must be idempotent: destroying an environment that does not
/// exist (or was already destroyed) succeeds.
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    async fn init(&self, module: &ModuleConfig) -> Result<(), HarnessError>;

    async fn plan(&self, module: &ModuleConfig) -> Result<(), HarnessError>;

    async fn apply(&self, module: &ModuleConfig) -> Result<(), HarnessError>;

    async fn destroy(&self, module: &ModuleConfig) -> Result<(), HarnessError>;

    /// Read a named output of an applied module.
    async fn output(&self, module: &ModuleConfig, name: &str) -> Result<String, HarnessError>;
}

/// `init` followed by `apply`.
pub async fn init_and_apply(
    provisioner: &dyn Provisioner,
    module: &ModuleConfig,
) -> Result<(), HarnessError> {
    provisioner.init(module).await?;
    provisioner.apply(module).await
}

/// Drives the `terraform` CLI.
#[derive(Debug, Clone)]
pub struct TerraformProvisioner {
    binary: PathBuf,
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for TerraformProvisioner {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("terraform"),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl TerraformProvisioner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific binary (e.g. `tofu` or an absolute path).
    #[must_use]
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    #[must_use]
    pub fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    async fn run(&self, op: ProvisionOp, module: &ModuleConfig, args: Vec<String>) -> Result<String, HarnessError> {
        if let Some(env_dir) = module.state_path.parent() {
            tokio::fs::create_dir_all(env_dir)
                .await
                .map_err(|e| HarnessError::provision(op, format!("cannot create state directory: {e}")))?;
        }

        let mut attempt = 0;
        loop {
            // Arguments carry the credential; only the operation is logged.
            debug!(
                target: "env_harness.provisioner",
                operation = %op,
                module = %module.module_dir.display(),
                attempt,
                "Running provisioning command"
            );

            let output = Command::new(&self.binary)
                .arg(format!("-chdir={}", module.module_dir.display()))
                .args(&args)
                .env("TF_DATA_DIR", &module.data_dir)
                .env("TF_IN_AUTOMATION", "1")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|e| {
                    HarnessError::provision(op, format!("failed to run {}: {e}", self.binary.display()))
                })?;

            if output.status.success() {
                return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
            }

            let stderr = String::from_utf8_lossy(&output.stderr);
            if attempt < self.max_retries && is_retryable(&stderr) {
                attempt += 1;
                warn!(
                    target: "env_harness.provisioner",
                    operation = %op,
                    attempt,
                    max_retries = self.max_retries,
                    "Transient provisioning error, retrying"
                );
                tokio::time::sleep(self.retry_delay).await;
                continue;
            }

            return Err(HarnessError::provision(
                op,
                format!("{}: {}", output.status, error_excerpt(&stderr)),
            ));
        }
    }
}

#[async_trait::async_trait]
impl Provisioner for TerraformProvisioner {
    #[instrument(skip_all, name = "env_harness.provisioner.init")]
    async fn init(&self, module: &ModuleConfig) -> Result<(), HarnessError> {
        self.run(ProvisionOp::Init, module, command_args(ProvisionOp::Init, module, None))
            .await
            .map(|_| ())
    }

    #[instrument(skip_all, name = "env_harness.provisioner.plan")]
    async fn plan(&self, module: &ModuleConfig) -> Result<(), HarnessError> {
        self.run(ProvisionOp::Plan, module, command_args(ProvisionOp::Plan, module, None))
            .await
            .map(|_| ())
    }

    #[instrument(skip_all, name = "env_harness.provisioner.apply", fields(instance = %module.vars.container_name))]
    async fn apply(&self, module: &ModuleConfig) -> Result<(), HarnessError> {
        self.run(ProvisionOp::Apply, module, command_args(ProvisionOp::Apply, module, None))
            .await?;
        info!(
            target: "env_harness.provisioner",
            instance = %module.vars.container_name,
            "Applied provisioning module"
        );
        Ok(())
    }

    #[instrument(skip_all, name = "env_harness.provisioner.destroy", fields(instance = %module.vars.container_name))]
    async fn destroy(&self, module: &ModuleConfig) -> Result<(), HarnessError> {
        if !tokio::fs::try_exists(&module.state_path).await.unwrap_or(false) {
            debug!(
                target: "env_harness.provisioner",
                instance = %module.vars.container_name,
                "No state file, nothing to destroy"
            );
            return Ok(());
        }
        self.run(ProvisionOp::Destroy, module, command_args(ProvisionOp::Destroy, module, None))
            .await?;
        info!(
            target: "env_harness.provisioner",
            instance = %module.vars.container_name,
            "Destroyed provisioning module"
        );
        Ok(())
    }

    async fn output(&self, module: &ModuleConfig, name: &str) -> Result<String, HarnessError> {
        let stdout = self
            .run(ProvisionOp::Output, module, command_args(ProvisionOp::Output, module, Some(name)))
            .await?;
        Ok(stdout.trim().to_string())
    }
}

/// Command-line arguments (after `-chdir`) for one operation.
fn command_args(op: ProvisionOp, module: &ModuleConfig, output_name: Option<&str>) -> Vec<String> {
    let state = format!("-state={}", module.state_path.display());
    let mut args: Vec<String> = match op {
        ProvisionOp::Init => vec!["init".into(), "-input=false".into(), "-no-color".into()],
        ProvisionOp::Plan => vec!["plan".into(), "-input=false".into(), "-no-color".into(), state],
        ProvisionOp::Apply => vec![
            "apply".into(),
            "-input=false".into(),
            "-no-color".into(),
            "-auto-approve".into(),
            state,
        ],
        ProvisionOp::Destroy => vec![
            "destroy".into(),
            "-input=false".into(),
            "-no-color".into(),
            "-auto-approve".into(),
            state,
        ],
        ProvisionOp::Output => vec!["output".into(), "-no-color".into(), "-raw".into(), state],
    };
    match op {
        ProvisionOp::Plan | ProvisionOp::Apply | ProvisionOp::Destroy => {
            args.extend(module.vars.to_var_args());
        }
        ProvisionOp::Output => args.extend(output_name.map(str::to_string)),
        ProvisionOp::Init => {}
    }
    args
}

fn is_retryable(stderr: &str) -> bool {
    RETRYABLE_ERRORS.iter().any(|pattern| stderr.contains(pattern))
}

/// Tail of stderr, bounded in length.
fn error_excerpt(stderr: &str) -> String {
    let trimmed = stderr.trim();
    let char_count = trimmed.chars().count();
    if char_count <= MAX_ERROR_EXCERPT_CHARS {
        return trimmed.to_string();
    }
    let tail: String = trimmed.chars().skip(char_count - MAX_ERROR_EXCERPT_CHARS).collect();
    format!("...{tail}")
}
