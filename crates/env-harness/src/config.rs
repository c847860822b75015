//! Harness configuration.
//!
//! Configuration is loaded from environment variables. Every recognized
//! option is a typed field; malformed values are rejected when the
//! configuration is built rather than when an option is first used.

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Skip every teardown action registered with a cleanup manager.
pub const ENV_SKIP_CLEANUP: &str = "SKIP_CLEANUP";

/// Mark the shared environment ready without provisioning it.
pub const ENV_SKIP_SHARED_SETUP: &str = "SKIP_SHARED_SETUP";

/// Leave the shared environment running at the end of the run.
pub const ENV_SKIP_SHARED_CLEANUP: &str = "SKIP_SHARED_CLEANUP";

/// Skip the expensive end-to-end timing test.
pub const ENV_SKIP_PERFORMANCE_TEST: &str = "SKIP_PERFORMANCE_TEST";

pub const ENV_CLEANUP_TIMEOUT_SECONDS: &str = "HARNESS_CLEANUP_TIMEOUT_SECONDS";
pub const ENV_SHARED_SETTLE_SECONDS: &str = "HARNESS_SHARED_SETTLE_SECONDS";
pub const ENV_DEDICATED_SETTLE_SECONDS: &str = "HARNESS_DEDICATED_SETTLE_SECONDS";
pub const ENV_HEALTH_TIMEOUT_SECONDS: &str = "HARNESS_HEALTH_TIMEOUT_SECONDS";
pub const ENV_MODULE_DIR: &str = "HARNESS_MODULE_DIR";
pub const ENV_STATE_DIR: &str = "HARNESS_STATE_DIR";
pub const ENV_NAME_PREFIX: &str = "HARNESS_NAME_PREFIX";
pub const ENV_TIMEZONE: &str = "HARNESS_TIMEZONE";

/// Default per-resource teardown bound (5 minutes).
pub const DEFAULT_CLEANUP_TIMEOUT_SECONDS: u64 = 300;

/// Default settling wait after the shared environment is applied.
pub const DEFAULT_SHARED_SETTLE_SECONDS: u64 = 60;

/// Default readiness budget for a dedicated environment.
pub const DEFAULT_DEDICATED_SETTLE_SECONDS: u64 = 30;

/// Default HTTP timeout for health probes.
pub const DEFAULT_HEALTH_TIMEOUT_SECONDS: u64 = 10;

pub const DEFAULT_MODULE_DIR: &str = "../terraform/modules/pihole";
pub const DEFAULT_NAME_PREFIX: &str = "pihole";
pub const DEFAULT_TIMEZONE: &str = "America/New_York";

/// Prefix of harness-specific variables; unknown keys under it are reported.
const HARNESS_VAR_PREFIX: &str = "HARNESS_";

const KNOWN_HARNESS_VARS: &[&str] = &[
    ENV_CLEANUP_TIMEOUT_SECONDS,
    ENV_SHARED_SETTLE_SECONDS,
    ENV_DEDICATED_SETTLE_SECONDS,
    ENV_HEALTH_TIMEOUT_SECONDS,
    ENV_MODULE_DIR,
    ENV_STATE_DIR,
    ENV_NAME_PREFIX,
    ENV_TIMEZONE,
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: &str) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Complete harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Log and skip every teardown action.
    pub skip_cleanup: bool,

    /// Mark the shared environment ready without provisioning.
    pub skip_shared_setup: bool,

    /// Log and skip shared environment teardown.
    pub skip_shared_cleanup: bool,

    /// Caller-level switch for the end-to-end timing test.
    pub skip_performance_test: bool,

    /// Upper bound for a single teardown action.
    pub cleanup_timeout: Duration,

    /// Fixed wait after the shared environment is applied.
    pub shared_settle: Duration,

    /// Readiness budget for dedicated environments.
    pub dedicated_settle: Duration,

    /// HTTP timeout for session establishment and probes.
    pub health_timeout: Duration,

    /// Provisioning module directory.
    pub module_dir: PathBuf,

    /// Root directory for per-environment provisioning state.
    pub state_dir: PathBuf,

    /// Prefix for instance and network names.
    pub name_prefix: String,

    /// Timezone passed through to the deployed service.
    pub timezone: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            skip_cleanup: false,
            skip_shared_setup: false,
            skip_shared_cleanup: false,
            skip_performance_test: false,
            cleanup_timeout: Duration::from_secs(DEFAULT_CLEANUP_TIMEOUT_SECONDS),
            shared_settle: Duration::from_secs(DEFAULT_SHARED_SETTLE_SECONDS),
            dedicated_settle: Duration::from_secs(DEFAULT_DEDICATED_SETTLE_SECONDS),
            health_timeout: Duration::from_secs(DEFAULT_HEALTH_TIMEOUT_SECONDS),
            module_dir: PathBuf::from(DEFAULT_MODULE_DIR),
            state_dir: default_state_dir(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            timezone: DEFAULT_TIMEZONE.to_string(),
        }
    }
}

fn default_state_dir() -> PathBuf {
    env::temp_dir().join("env-harness")
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        for key in vars.keys() {
            if key.starts_with(HARNESS_VAR_PREFIX) && !KNOWN_HARNESS_VARS.contains(&key.as_str()) {
                warn!(
                    target: "env_harness.config",
                    key = %key,
                    "Ignoring unrecognized harness variable"
                );
            }
        }

        let defaults = Self::default();

        let name_prefix = match vars.get(ENV_NAME_PREFIX) {
            Some(value) => parse_name_prefix(ENV_NAME_PREFIX, value)?,
            None => defaults.name_prefix,
        };

        Ok(Self {
            skip_cleanup: parse_flag(vars, ENV_SKIP_CLEANUP)?,
            skip_shared_setup: parse_flag(vars, ENV_SKIP_SHARED_SETUP)?,
            skip_shared_cleanup: parse_flag(vars, ENV_SKIP_SHARED_CLEANUP)?,
            skip_performance_test: parse_flag(vars, ENV_SKIP_PERFORMANCE_TEST)?,
            cleanup_timeout: parse_seconds(vars, ENV_CLEANUP_TIMEOUT_SECONDS, defaults.cleanup_timeout, false)?,
            shared_settle: parse_seconds(vars, ENV_SHARED_SETTLE_SECONDS, defaults.shared_settle, true)?,
            dedicated_settle: parse_seconds(
                vars,
                ENV_DEDICATED_SETTLE_SECONDS,
                defaults.dedicated_settle,
                true,
            )?,
            health_timeout: parse_seconds(vars, ENV_HEALTH_TIMEOUT_SECONDS, defaults.health_timeout, false)?,
            module_dir: vars
                .get(ENV_MODULE_DIR)
                .map_or(defaults.module_dir, PathBuf::from),
            state_dir: vars
                .get(ENV_STATE_DIR)
                .map_or(defaults.state_dir, PathBuf::from),
            name_prefix,
            timezone: vars
                .get(ENV_TIMEZONE)
                .cloned()
                .unwrap_or(defaults.timezone),
        })
    }

    /// Cleanup manager settings derived from this configuration.
    #[must_use]
    pub fn cleanup(&self) -> CleanupConfig {
        CleanupConfig {
            timeout: self.cleanup_timeout,
            skip: self.skip_cleanup,
        }
    }

    /// Shared environment settings derived from this configuration.
    #[must_use]
    pub fn shared(&self) -> SharedEnvironmentConfig {
        SharedEnvironmentConfig {
            settle: self.shared_settle,
            skip_setup: self.skip_shared_setup,
            skip_cleanup: self.skip_shared_cleanup,
        }
    }
}

/// Settings consumed by `CleanupManager`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Upper bound for a single teardown action.
    pub timeout: Duration,
    /// Log every resource as skipped instead of tearing it down.
    pub skip: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_CLEANUP_TIMEOUT_SECONDS),
            skip: false,
        }
    }
}

/// Settings consumed by `SharedEnvironment`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedEnvironmentConfig {
    pub settle: Duration,
    pub skip_setup: bool,
    pub skip_cleanup: bool,
}

fn parse_flag(vars: &HashMap<String, String>, key: &str) -> Result<bool, ConfigError> {
    let Some(value) = vars.get(key) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" | "" => Ok(false),
        _ => Err(ConfigError::invalid(key, value, "expected true or false")),
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    key: &str,
    default: Duration,
    allow_zero: bool,
) -> Result<Duration, ConfigError> {
    let Some(value) = vars.get(key) else {
        return Ok(default);
    };
    let secs: u64 = value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(key, value, "expected whole seconds"))?;
    if secs == 0 && !allow_zero {
        return Err(ConfigError::invalid(key, value, "must be greater than zero"));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_name_prefix(key: &str, value: &str) -> Result<String, ConfigError> {
    let valid = !value.is_empty()
        && !value.starts_with('-')
        && !value.ends_with('-')
        && value
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(ConfigError::invalid(
            key,
            value,
            "expected lowercase letters, digits and inner dashes",
        ));
    }
    Ok(value.to_string())
}
