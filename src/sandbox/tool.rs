use super::{DataSource, DeprovisionOutcome};
use crate::core::{Result, UpgradeTestError, Version};
use crate::interface::SandboxTool;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::debug;

/// `SandboxTool` driving MySQL Sandbox (`make_sandbox` and `sbtool`).
///
/// Children are spawned with `kill_on_drop`, so a caller that gives up on
/// a call (timeout) does not leave the process running. On unix each child
/// gets its own process group: a terminal Ctrl-C reaches only the
/// orchestrator, and the in-flight call runs to completion.
#[derive(Debug, Clone)]
pub struct MysqlSandboxTool {
    make_sandbox: PathBuf,
    sbtool: PathBuf,
}

impl MysqlSandboxTool {
    pub fn new() -> Self {
        Self {
            make_sandbox: PathBuf::from("make_sandbox"),
            sbtool: PathBuf::from("sbtool"),
        }
    }

    /// Use explicit binaries instead of looking them up on `PATH`.
    pub fn with_binaries(make_sandbox: impl Into<PathBuf>, sbtool: impl Into<PathBuf>) -> Self {
        Self {
            make_sandbox: make_sandbox.into(),
            sbtool: sbtool.into(),
        }
    }
}

impl Default for MysqlSandboxTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SandboxTool for MysqlSandboxTool {
    async fn provision(
        &self,
        version: &Version,
        prefix: &str,
        sandbox_home: &Path,
        source: &DataSource,
    ) -> Result<()> {
        let mut cmd = command(&self.make_sandbox);
        cmd.arg(version.to_string())
            .arg(format!("--add_prefix={}", prefix))
            .args(["--", "--no_confirm", "--no_show", "--datadir_from"])
            .arg(source.provisioner_arg())
            .env("SANDBOX_HOME", sandbox_home);
        debug!("Running {:?}", cmd);

        let failed = |reason: String| UpgradeTestError::ProvisionFailed {
            version: version.to_string(),
            reason,
        };

        let output = cmd.output().await.map_err(|e| failed(e.to_string()))?;
        check_status(&output).map_err(failed)
    }

    async fn deprovision(&self, root: &Path) -> Result<DeprovisionOutcome> {
        if !tokio::fs::try_exists(root).await? {
            return Ok(DeprovisionOutcome::NotFound);
        }

        let mut cmd = command(&self.sbtool);
        cmd.args(["-o", "delete", "--source_dir"]).arg(root);
        debug!("Running {:?}", cmd);

        let failed = |reason: String| UpgradeTestError::DeprovisionFailed {
            root: root.to_path_buf(),
            reason,
        };

        let output = cmd.output().await.map_err(|e| failed(e.to_string()))?;
        check_status(&output).map_err(failed)?;

        Ok(DeprovisionOutcome::Removed)
    }

    async fn run_script(&self, root: &Path, args: &[&str]) -> Result<String> {
        let (script, rest) = args.split_first().ok_or_else(|| UpgradeTestError::ScriptFailed {
            script: String::new(),
            root: root.to_path_buf(),
            reason: "no script given".to_string(),
            stdout: String::new(),
        })?;

        let mut cmd = command(&root.join(script));
        cmd.args(rest).current_dir(root);
        debug!("Running {:?} in {}", cmd, root.display());

        let failed = |reason: String, stdout: String| UpgradeTestError::ScriptFailed {
            script: args.join(" "),
            root: root.to_path_buf(),
            reason,
            stdout,
        };

        let output = cmd
            .output()
            .await
            .map_err(|e| failed(e.to_string(), String::new()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        match check_status(&output) {
            Ok(()) => Ok(stdout),
            Err(reason) => Err(failed(reason, stdout)),
        }
    }
}

fn command(program: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

fn check_status(output: &Output) -> std::result::Result<(), String> {
    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    Err(if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        format!("exited with {}: {}", output.status, stderr)
    })
}
