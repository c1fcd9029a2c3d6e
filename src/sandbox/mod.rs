pub mod tool;
pub mod upgrade;

pub use tool::MysqlSandboxTool;
pub use upgrade::{UpgradeCheck, UpgradeReport};

use crate::connection::{ConnectionParams, Credentials};
use crate::core::{Result, UpgradeTestError, Version};
use crate::interface::SandboxTool;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const START_SCRIPT: &[&str] = &["./start"];
pub const STOP_SCRIPT: &[&str] = &["./stop"];
pub const UPGRADE_SCRIPT: &[&str] = &["./my", "sql_upgrade", "--skip-verbose"];

/// Where a new instance gets its initial data directory from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Bootstrap a fresh data directory.
    Fresh,
    /// Copy the data directory found at this path.
    SeededFrom(PathBuf),
}

impl DataSource {
    /// Value for the provisioner's `--datadir_from` option.
    pub fn provisioner_arg(&self) -> String {
        match self {
            DataSource::Fresh => "script".to_string(),
            DataSource::SeededFrom(path) => format!("dir:{}", path.display()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeprovisionOutcome {
    Removed,
    /// Nothing existed at the instance root.
    NotFound,
}

/// Upper bounds for each external call, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub provision_secs: u64,
    pub deprovision_secs: u64,
    pub start_secs: u64,
    pub stop_secs: u64,
    pub upgrade_secs: u64,
    pub callback_secs: u64,
}

impl Timeouts {
    pub fn provision(&self) -> Duration {
        Duration::from_secs(self.provision_secs)
    }

    pub fn deprovision(&self) -> Duration {
        Duration::from_secs(self.deprovision_secs)
    }

    pub fn start(&self) -> Duration {
        Duration::from_secs(self.start_secs)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_secs)
    }

    pub fn upgrade(&self) -> Duration {
        Duration::from_secs(self.upgrade_secs)
    }

    pub fn callback(&self) -> Duration {
        Duration::from_secs(self.callback_secs)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            provision_secs: 600,
            deprovision_secs: 120,
            start_secs: 300,
            stop_secs: 300,
            upgrade_secs: 1800,
            callback_secs: 300,
        }
    }
}

/// Await `fut`, failing with `Timeout` once `timeout` elapses.
///
/// The future is dropped on expiry; process-backed tools kill their child
/// when that happens.
pub(crate) async fn bounded<T>(
    operation: impl Into<String>,
    timeout: Duration,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(UpgradeTestError::Timeout {
            operation: operation.into(),
            timeout,
        }),
    }
}

/// Control surface for one sandboxed instance at one version
///
/// The handle is identified by `(prefix, version, sandbox_home)`; creating
/// it does not touch the filesystem. Every operation blocks until the
/// external tool has returned.
pub struct InstanceHandle {
    version: Version,
    prefix: String,
    sandbox_home: PathBuf,
    source: DataSource,
    tool: Arc<dyn SandboxTool>,
    timeouts: Timeouts,
    provisioned: bool,
}

impl InstanceHandle {
    pub fn new(
        version: Version,
        prefix: &str,
        sandbox_home: impl Into<PathBuf>,
        tool: Arc<dyn SandboxTool>,
    ) -> Self {
        Self {
            version,
            prefix: prefix.to_string(),
            sandbox_home: sandbox_home.into(),
            source: DataSource::Fresh,
            tool,
            timeouts: Timeouts::default(),
            provisioned: false,
        }
    }

    /// Set the data source used by `provision`
    pub fn source(mut self, source: DataSource) -> Self {
        self.source = source;
        self
    }

    /// Set the external call timeouts
    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn is_provisioned(&self) -> bool {
        self.provisioned
    }

    /// Instance root, e.g. `~/sandboxes/msb_ugt5_7_9`.
    pub fn root(&self) -> PathBuf {
        self.sandbox_home
            .join(format!("msb_{}{}", self.prefix, self.version.dir_suffix()))
    }

    pub fn port(&self) -> u16 {
        self.version.port()
    }

    pub fn connection_params(&self, credentials: &Credentials) -> ConnectionParams {
        credentials.params_for(&self.version)
    }

    pub async fn provision(&mut self) -> Result<()> {
        debug!(
            "Provisioning {} (datadir from: {})",
            self.version,
            self.source.provisioner_arg()
        );

        bounded(
            format!("provision {}", self.version),
            self.timeouts.provision(),
            self.tool
                .provision(&self.version, &self.prefix, &self.sandbox_home, &self.source),
        )
        .await?;

        self.provisioned = true;
        Ok(())
    }

    /// Destroy the instance. Succeeds with `NotFound` when there is nothing
    /// to destroy, whether or not this handle ever provisioned it.
    pub async fn deprovision(&mut self) -> Result<DeprovisionOutcome> {
        debug!("Deprovisioning {}", self.version);
        let root = self.root();

        let outcome = bounded(
            format!("deprovision {}", self.version),
            self.timeouts.deprovision(),
            self.tool.deprovision(&root),
        )
        .await?;

        if outcome == DeprovisionOutcome::NotFound {
            warn!(
                "Trying to deprovision non-existing sandbox {} at {}",
                self.version,
                root.display()
            );
        }

        self.provisioned = false;
        Ok(outcome)
    }

    pub async fn start(&self) -> Result<()> {
        debug!("Starting {}", self.version);
        self.script(START_SCRIPT, self.timeouts.start()).await.map(|_| ())
    }

    pub async fn stop(&self) -> Result<()> {
        debug!("Stopping {}", self.version);
        self.script(STOP_SCRIPT, self.timeouts.stop()).await.map(|_| ())
    }

    /// Run upgrade-in-place. Every non-`OK` line is logged here and kept
    /// in the returned report for the caller to aggregate.
    ///
    /// A failing upgrade still logs the lines it printed; they stay in the
    /// `stdout` of the `ScriptFailed` error.
    pub async fn upgrade(&self) -> Result<UpgradeReport> {
        debug!("Upgrading {}", self.version);
        match self.script(UPGRADE_SCRIPT, self.timeouts.upgrade()).await {
            Ok(output) => Ok(self.upgrade_report(&output)),
            Err(err) => {
                if let UpgradeTestError::ScriptFailed { stdout, .. } = &err {
                    self.upgrade_report(stdout);
                }
                Err(err)
            }
        }
    }

    fn upgrade_report(&self, output: &str) -> UpgradeReport {
        let report = UpgradeReport::parse(output);
        for anomaly in report.anomalies() {
            warn!("Upgrade anomaly on {}: {}", self.version, anomaly.line);
        }
        report
    }

    /// Directory holding this instance's persisted data.
    pub fn data_directory(&self) -> Result<PathBuf> {
        if !self.provisioned {
            return Err(UpgradeTestError::InstanceNotProvisioned(
                self.version.to_string(),
            ));
        }
        Ok(self.root().join("data"))
    }

    async fn script(&self, args: &[&str], timeout: Duration) -> Result<String> {
        let root = self.root();
        self.ensure_provisioned(&root)?;

        bounded(
            format!("{} on {}", args.join(" "), self.version),
            timeout,
            self.tool.run_script(&root, args),
        )
        .await
    }

    fn ensure_provisioned(&self, root: &Path) -> Result<()> {
        if self.provisioned {
            Ok(())
        } else {
            Err(UpgradeTestError::InstanceNotProvisioned(format!(
                "{} ({})",
                self.version,
                root.display()
            )))
        }
    }
}

impl std::fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("version", &self.version)
            .field("root", &self.root())
            .field("source", &self.source)
            .field("provisioned", &self.provisioned)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTool {
        calls: Mutex<Vec<String>>,
        upgrade_output: String,
        hang: bool,
    }

    #[async_trait]
    impl SandboxTool for RecordingTool {
        async fn provision(
            &self,
            version: &Version,
            prefix: &str,
            _sandbox_home: &Path,
            source: &DataSource,
        ) -> Result<()> {
            if self.hang {
                std::future::pending::<()>().await;
            }
            self.calls.lock().unwrap().push(format!(
                "provision {} {} {}",
                version,
                prefix,
                source.provisioner_arg()
            ));
            Ok(())
        }

        async fn deprovision(&self, root: &Path) -> Result<DeprovisionOutcome> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("deprovision {}", root.display()));
            Ok(DeprovisionOutcome::NotFound)
        }

        async fn run_script(&self, _root: &Path, args: &[&str]) -> Result<String> {
            self.calls.lock().unwrap().push(args.join(" "));
            Ok(self.upgrade_output.clone())
        }
    }

    fn handle(tool: Arc<RecordingTool>) -> InstanceHandle {
        InstanceHandle::new("5.7.9".parse().unwrap(), "ugt", "/sandboxes", tool)
    }

    #[test]
    fn test_root_and_port() {
        let handle = handle(Arc::new(RecordingTool::default()));
        assert_eq!(handle.root(), PathBuf::from("/sandboxes/msb_ugt5_7_9"));
        assert_eq!(handle.port(), 5709);
    }

    #[test]
    fn test_data_source_arg() {
        assert_eq!(DataSource::Fresh.provisioner_arg(), "script");
        assert_eq!(
            DataSource::SeededFrom(PathBuf::from("/tmp/ugtdatadir")).provisioner_arg(),
            "dir:/tmp/ugtdatadir"
        );
    }

    #[tokio::test]
    async fn test_data_directory_requires_provision() {
        let mut handle = handle(Arc::new(RecordingTool::default()));
        assert!(matches!(
            handle.data_directory(),
            Err(UpgradeTestError::InstanceNotProvisioned(_))
        ));

        handle.provision().await.unwrap();
        assert_eq!(
            handle.data_directory().unwrap(),
            PathBuf::from("/sandboxes/msb_ugt5_7_9/data")
        );

        handle.deprovision().await.unwrap();
        assert!(handle.data_directory().is_err());
    }

    #[tokio::test]
    async fn test_deprovision_never_provisioned_is_ok() {
        let mut handle = handle(Arc::new(RecordingTool::default()));
        let outcome = handle.deprovision().await.unwrap();
        assert_eq!(outcome, DeprovisionOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_scripts_require_provision() {
        let tool = Arc::new(RecordingTool::default());
        let handle = handle(tool.clone());

        assert!(handle.start().await.is_err());
        assert!(tool.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upgrade_collects_anomalies() {
        let tool = Arc::new(RecordingTool {
            upgrade_output: "mysql.db OK\ntest.t1 Needs upgrade\n".to_string(),
            ..RecordingTool::default()
        });
        let mut handle = handle(tool.clone());
        handle.provision().await.unwrap();

        let report = handle.upgrade().await.unwrap();
        assert_eq!(report.anomalies().count(), 1);

        let calls = tool.calls.lock().unwrap();
        assert_eq!(calls[0], "provision 5.7.9 ugt script");
        assert_eq!(calls[1], "./my sql_upgrade --skip-verbose");
    }

    #[tokio::test(start_paused = true)]
    async fn test_provision_timeout() {
        let tool = Arc::new(RecordingTool {
            hang: true,
            ..RecordingTool::default()
        });
        let mut handle = handle(tool).timeouts(Timeouts {
            provision_secs: 5,
            ..Timeouts::default()
        });

        let err = handle.provision().await.unwrap_err();
        assert!(matches!(err, UpgradeTestError::Timeout { .. }));
        assert!(!handle.is_provisioned());
    }
}
