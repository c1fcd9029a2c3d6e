use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpgradeTestError {
    #[error("Invalid version '{0}': expected major.minor.patch")]
    InvalidVersion(String),

    #[error("Version chain must contain at least one version")]
    EmptyChain,

    #[error("Provisioning {version} failed: {reason}")]
    ProvisionFailed { version: String, reason: String },

    #[error("Deprovisioning '{}' failed: {reason}", root.display())]
    DeprovisionFailed { root: PathBuf, reason: String },

    #[error("Script '{script}' failed in '{}': {reason}", root.display())]
    ScriptFailed {
        script: String,
        root: PathBuf,
        reason: String,
        /// Whatever the script printed before failing.
        stdout: String,
    },

    #[error("{operation} timed out after {}s", timeout.as_secs())]
    Timeout { operation: String, timeout: Duration },

    #[error("Instance {0} is not provisioned")]
    InstanceNotProvisioned(String),

    #[error("Staging error: {0}")]
    Staging(String),

    #[error("Callback '{description}' failed: {reason}")]
    CallbackFailed { description: String, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    IoError(String),
}

pub type Result<T> = std::result::Result<T, UpgradeTestError>;

impl From<std::io::Error> for UpgradeTestError {
    fn from(err: std::io::Error) -> Self {
        Self::IoError(err.to_string())
    }
}

impl From<walkdir::Error> for UpgradeTestError {
    fn from(err: walkdir::Error) -> Self {
        Self::Staging(err.to_string())
    }
}

impl From<serde_json::Error> for UpgradeTestError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config(err.to_string())
    }
}
