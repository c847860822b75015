//! Environment descriptors.
//!
//! An [`EnvironmentDescriptor`] identifies one deployable instance and carries
//! everything the provisioning collaborator needs to create or destroy it.
//! Descriptors are immutable once built; the shared descriptor is handed out
//! behind an `Arc` and read without locking.

use crate::config::HarnessConfig;
use crate::identifiers::{Fingerprint, Identifiers, PortPair, Subnet};
use crate::requirements::EnvironmentKind;
use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};

/// Listening mode passed to the deployed DNS service.
pub const DNSMASQ_LISTENING_ALL: &str = "all";

/// Name of the per-environment state file.
const STATE_FILE_NAME: &str = "terraform.tfstate";

/// Name of the per-environment provisioning data directory.
const DATA_DIR_NAME: &str = ".terraform";

/// Input variables of the provisioning module.
#[derive(Debug, Clone)]
pub struct ProvisionVars {
    pub container_name: String,
    pub network_name: String,
    pub subnet: Subnet,
    pub dns_port: u16,
    pub web_port: u16,
    pub timezone: String,
    pub web_password: SecretString,
    pub dnsmasq_listening: String,
    pub use_host_network: bool,
}

impl ProvisionVars {
    /// Render as `-var key=value` command-line arguments.
    ///
    /// The result contains the credential in clear text and must not be logged.
    #[must_use]
    pub fn to_var_args(&self) -> Vec<String> {
        let pairs = [
            ("container_name", self.container_name.clone()),
            ("network_name", self.network_name.clone()),
            ("subnet", self.subnet.to_string()),
            ("dns_port", self.dns_port.to_string()),
            ("web_port", self.web_port.to_string()),
            ("timezone", self.timezone.clone()),
            ("web_password", self.web_password.expose_secret().to_string()),
            ("dnsmasq_listening", self.dnsmasq_listening.clone()),
            ("use_host_network", self.use_host_network.to_string()),
        ];
        pairs
            .into_iter()
            .flat_map(|(key, value)| ["-var".to_string(), format!("{key}={value}")])
            .collect()
    }
}

/// Provisioning module invocation for one environment.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// Module source directory (shared, read-only).
    pub module_dir: PathBuf,
    /// State file owned by this environment alone.
    pub state_path: PathBuf,
    /// Provider/plugin data directory owned by this environment alone.
    pub data_dir: PathBuf,
    pub vars: ProvisionVars,
}

/// One deployable instance.
#[derive(Debug, Clone)]
pub struct EnvironmentDescriptor {
    kind: EnvironmentKind,
    identifiers: Identifiers,
    credential: SecretString,
    module: ModuleConfig,
}

impl EnvironmentDescriptor {
    /// Assemble a descriptor from derived identifiers.
    #[must_use]
    pub fn new(
        kind: EnvironmentKind,
        identifiers: Identifiers,
        credential: SecretString,
        config: &HarnessConfig,
    ) -> Self {
        let env_dir = config.state_dir.join(&identifiers.instance_name);
        let module = ModuleConfig {
            module_dir: config.module_dir.clone(),
            state_path: env_dir.join(STATE_FILE_NAME),
            data_dir: env_dir.join(DATA_DIR_NAME),
            vars: ProvisionVars {
                container_name: identifiers.instance_name.clone(),
                network_name: identifiers.network_name.clone(),
                subnet: identifiers.subnet,
                dns_port: identifiers.ports.data,
                web_port: identifiers.ports.control,
                timezone: config.timezone.clone(),
                web_password: credential.clone(),
                dnsmasq_listening: DNSMASQ_LISTENING_ALL.to_string(),
                use_host_network: false,
            },
        };
        Self {
            kind,
            identifiers,
            credential,
            module,
        }
    }

    #[must_use]
    pub fn kind(&self) -> EnvironmentKind {
        self.kind
    }

    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.identifiers.fingerprint
    }

    #[must_use]
    pub fn instance_name(&self) -> &str {
        &self.identifiers.instance_name
    }

    #[must_use]
    pub fn network_name(&self) -> &str {
        &self.identifiers.network_name
    }

    #[must_use]
    pub fn subnet(&self) -> Subnet {
        self.identifiers.subnet
    }

    #[must_use]
    pub fn ports(&self) -> PortPair {
        self.identifiers.ports
    }

    #[must_use]
    pub fn credential(&self) -> &SecretString {
        &self.credential
    }

    #[must_use]
    pub fn module(&self) -> &ModuleConfig {
        &self.module
    }

    /// State file of this environment.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.module.state_path
    }

    /// Base URL of the control-plane HTTP API on the host.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://localhost:{}", self.identifiers.ports.control)
    }

    /// Volumes the deployed container creates alongside itself.
    #[must_use]
    pub fn volume_names(&self) -> [String; 2] {
        let instance = &self.identifiers.instance_name;
        [format!("{instance}-data"), format!("{instance}-dnsmasq")]
    }
}
