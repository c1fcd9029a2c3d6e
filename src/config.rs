use crate::callbacks::suite::register_builtin_suite;
use crate::callbacks::{CallbackRegistry, LifecycleEvent, VerificationAction};
use crate::connection::Credentials;
use crate::core::{Result, UpgradeTestError, Version, VersionChain};
use crate::sandbox::Timeouts;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// What the orchestrator does after a failure it could survive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record the failure and go on with the chain.
    #[default]
    Continue,
    /// Record the failure, stop the instance and end the run.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailurePolicies {
    /// With `Continue`, the version is skipped and the next one is seeded
    /// from the last staged data directory.
    pub on_provision_failure: FailurePolicy,
    pub on_callback_failure: FailurePolicy,
    /// Also applies when the upgrade script itself exits non-zero.
    pub on_upgrade_anomaly: FailurePolicy,
}

impl Default for FailurePolicies {
    fn default() -> Self {
        Self {
            on_provision_failure: FailurePolicy::Abort,
            on_callback_failure: FailurePolicy::Continue,
            on_upgrade_anomaly: FailurePolicy::Continue,
        }
    }
}

/// SQL callback declared in a config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackSpec {
    pub version: Version,
    pub event: LifecycleEvent,
    pub description: String,
    pub sql: String,
}

/// Run configuration
///
/// Built in code with the setters below or loaded from JSON; every field
/// missing from the file keeps its default.
///
/// # Examples
///
/// ```
/// use upgrade_chain::{ChainConfig, FailurePolicy, VersionChain};
///
/// let config = ChainConfig::new()
///     .versions(VersionChain::parse(&["5.1.73", "5.5.45"]).unwrap())
///     .prefix("ugt")
///     .on_callback_failure(FailurePolicy::Abort);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Versions walked in order
    pub versions: VersionChain,

    /// Name prefix of every provisioned instance
    pub prefix: String,

    /// Directory holding all instance roots (`~` is expanded)
    pub sandbox_home: PathBuf,

    /// Hand-off directory between consecutive instances
    pub staging_dir: PathBuf,

    pub credentials: Credentials,

    pub policies: FailurePolicies,

    pub timeouts: Timeouts,

    /// Deprovision everything and clear staging once the run is over
    pub final_cleanup: bool,

    /// Register the built-in schema suite for versions in the chain
    pub builtin_suite: bool,

    /// Extra SQL callbacks, registered after the built-in suite
    pub callbacks: Vec<CallbackSpec>,
}

impl ChainConfig {
    pub fn new() -> Self {
        Self {
            versions: VersionChain::default(),
            prefix: "ugt".to_string(),
            sandbox_home: PathBuf::from("~/sandboxes"),
            staging_dir: PathBuf::from("/tmp/ugtdatadir"),
            credentials: Credentials::default(),
            policies: FailurePolicies::default(),
            timeouts: Timeouts::default(),
            final_cleanup: false,
            builtin_suite: true,
            callbacks: Vec::new(),
        }
    }

    /// Load a JSON config file and validate it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            UpgradeTestError::Config(format!("Failed to read '{}': {}", path.display(), e))
        })?;

        let config: Self = serde_json::from_str(&content)?;
        config.validate().map_err(UpgradeTestError::Config)?;

        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Set the version chain
    pub fn versions(mut self, versions: VersionChain) -> Self {
        self.versions = versions;
        self
    }

    /// Set the instance name prefix
    pub fn prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    /// Set the sandbox home directory
    pub fn sandbox_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.sandbox_home = path.into();
        self
    }

    /// Set the staging directory
    pub fn staging_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.staging_dir = path.into();
        self
    }

    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn on_provision_failure(mut self, policy: FailurePolicy) -> Self {
        self.policies.on_provision_failure = policy;
        self
    }

    pub fn on_callback_failure(mut self, policy: FailurePolicy) -> Self {
        self.policies.on_callback_failure = policy;
        self
    }

    pub fn on_upgrade_anomaly(mut self, policy: FailurePolicy) -> Self {
        self.policies.on_upgrade_anomaly = policy;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn final_cleanup(mut self, enabled: bool) -> Self {
        self.final_cleanup = enabled;
        self
    }

    pub fn builtin_suite(mut self, enabled: bool) -> Self {
        self.builtin_suite = enabled;
        self
    }

    pub fn callback(mut self, spec: CallbackSpec) -> Self {
        self.callbacks.push(spec);
        self
    }

    /// `sandbox_home` with a leading `~` replaced by `$HOME`.
    pub fn resolved_sandbox_home(&self) -> PathBuf {
        expand_home(&self.sandbox_home)
    }

    /// `staging_dir` with a leading `~` replaced by `$HOME`.
    pub fn resolved_staging_dir(&self) -> PathBuf {
        expand_home(&self.staging_dir)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.prefix.is_empty() {
            return Err("Prefix cannot be empty".to_string());
        }

        if self.prefix.contains(['/', '\\']) || self.prefix.contains(char::is_whitespace) {
            return Err(format!("Prefix '{}' must be a plain name", self.prefix));
        }

        if self.staging_dir.as_os_str().is_empty() || self.staging_dir.parent().is_none() {
            return Err(format!(
                "Staging directory '{}' is not usable",
                self.staging_dir.display()
            ));
        }

        if self.sandbox_home.as_os_str().is_empty() {
            return Err("Sandbox home cannot be empty".to_string());
        }

        let home = self.resolved_sandbox_home();
        if self.resolved_staging_dir().starts_with(&home) {
            return Err("Staging directory must live outside the sandbox home".to_string());
        }

        self.credentials.validate()?;

        let t = &self.timeouts;
        let all = [
            t.provision_secs,
            t.deprovision_secs,
            t.start_secs,
            t.stop_secs,
            t.upgrade_secs,
            t.callback_secs,
        ];
        if all.contains(&0) {
            return Err("Timeouts must be > 0".to_string());
        }

        Ok(())
    }

    /// Registry holding the built-in suite (if enabled) followed by the
    /// configured callbacks.
    pub fn build_registry(&self) -> CallbackRegistry {
        let mut registry = CallbackRegistry::new();

        if self.builtin_suite {
            let count = register_builtin_suite(&mut registry, &self.versions);
            debug!("Registered {} built-in callbacks", count);
        }

        for spec in &self.callbacks {
            if !self.versions.contains(&spec.version) {
                warn!(
                    "Callback '{}' targets {} which is not in the chain; it will never run",
                    spec.description, spec.version
                );
            }
            registry.register(
                spec.version,
                spec.event,
                VerificationAction::sql(spec.description.clone(), spec.sql.clone()),
            );
        }

        registry
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
