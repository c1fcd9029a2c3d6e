use async_trait::async_trait;
use crate::connection::ConnectionParams;
use crate::core::{Result, Version};
use crate::sandbox::{DataSource, DeprovisionOutcome};
use std::path::Path;

/// A generic trait for database clients.
///
/// Verification actions talk to the running instance only through this
/// trait, so the orchestrator can be driven against a real server
/// (`MySqlClient`) or a fake in tests.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Connect with `params`, run `sql` (possibly several `;`-separated
    /// statements), commit and close.
    ///
    /// The connection must be released on every path, including a
    /// failure halfway through the script.
    async fn execute_script(&self, params: &ConnectionParams, sql: &str) -> Result<()>;
}

/// The provisioning tool and the per-instance control scripts.
///
/// Every call blocks until the external process has exited.
#[async_trait]
pub trait SandboxTool: Send + Sync {
    /// Create the instance for `version` under `sandbox_home`.
    async fn provision(
        &self,
        version: &Version,
        prefix: &str,
        sandbox_home: &Path,
        source: &DataSource,
    ) -> Result<()>;

    /// Destroy the instance rooted at `root`. A missing root is reported as
    /// `DeprovisionOutcome::NotFound`, never as an error.
    async fn deprovision(&self, root: &Path) -> Result<DeprovisionOutcome>;

    /// Run a control script (`./start`, `./stop`, `./my sql_upgrade ...`)
    /// with `root` as the working directory and return its stdout.
    async fn run_script(&self, root: &Path, args: &[&str]) -> Result<String>;
}
