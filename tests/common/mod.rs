//! Filesystem-backed stand-in for MySQL Sandbox and a MySQL server.
//!
//! A "table" is a `<data>/<database>/<name>.frm` file, so whatever the
//! chain stages and seeds is visible as plain files.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use upgrade_chain::chain::staging::copy_tree;
use upgrade_chain::{
    ChainConfig, ChainOrchestrator, CallbackRegistry, ConnectionParams, DataSource, DatabaseClient,
    DeprovisionOutcome, Result, SandboxTool, UpgradeTestError, Version, VersionChain,
};

#[derive(Default)]
struct FakeState {
    /// root -> version
    roots: HashMap<PathBuf, Version>,
    running: HashSet<PathBuf>,
    log: Vec<String>,
    fail_provision: HashSet<Version>,
    fail_upgrade: HashSet<Version>,
    upgrade_output: HashMap<Version, String>,
}

#[derive(Default)]
pub struct FakeSandbox {
    state: Mutex<FakeState>,
}

impl FakeSandbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_provision(&self, version: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_provision.insert(version.parse().unwrap());
    }

    pub fn fail_upgrade(&self, version: &str) {
        let mut state = self.state.lock().unwrap();
        state.fail_upgrade.insert(version.parse().unwrap());
    }

    pub fn set_upgrade_output(&self, version: &str, output: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .upgrade_output
            .insert(version.parse().unwrap(), output.to_string());
    }

    /// Everything the fake was asked to do, in order.
    pub fn log(&self) -> Vec<String> {
        self.state.lock().unwrap().log.clone()
    }

    pub fn running_count(&self) -> usize {
        self.state.lock().unwrap().running.len()
    }

    pub fn sql_count(&self) -> usize {
        self.log().iter().filter(|entry| entry.starts_with("sql ")).count()
    }

    fn record(&self, entry: String) {
        self.state.lock().unwrap().log.push(entry);
    }

    fn root_for_port(&self, port: u16) -> Option<PathBuf> {
        let state = self.state.lock().unwrap();
        state
            .running
            .iter()
            .find(|root| state.roots.get(*root).map(Version::port) == Some(port))
            .cloned()
    }
}

#[async_trait]
impl SandboxTool for FakeSandbox {
    async fn provision(
        &self,
        version: &Version,
        prefix: &str,
        sandbox_home: &Path,
        source: &DataSource,
    ) -> Result<()> {
        self.record(format!("provision {} {}", version, source.provisioner_arg()));

        let failed = |reason: &str| UpgradeTestError::ProvisionFailed {
            version: version.to_string(),
            reason: reason.to_string(),
        };

        if self.state.lock().unwrap().fail_provision.contains(version) {
            return Err(failed("exited with exit status: 1"));
        }

        let root = sandbox_home.join(format!("msb_{}{}", prefix, version.dir_suffix()));
        if root.exists() {
            return Err(failed("sandbox directory already exists"));
        }

        let data = root.join("data");
        match source {
            DataSource::Fresh => {
                fs::create_dir_all(data.join("mysql"))?;
                fs::create_dir_all(data.join("test"))?;
            }
            DataSource::SeededFrom(path) => {
                if !path.is_dir() {
                    return Err(failed("seed directory missing"));
                }
                fs::create_dir_all(&root)?;
                copy_tree(path, &data)?;
            }
        }
        fs::write(root.join("VERSION"), version.to_string())?;

        self.state.lock().unwrap().roots.insert(root, *version);
        Ok(())
    }

    async fn deprovision(&self, root: &Path) -> Result<DeprovisionOutcome> {
        if !root.exists() {
            return Ok(DeprovisionOutcome::NotFound);
        }

        fs::remove_dir_all(root)?;
        let mut state = self.state.lock().unwrap();
        state.running.remove(root);
        state.roots.remove(root);
        state.log.push(format!("deprovision {}", root.display()));
        Ok(DeprovisionOutcome::Removed)
    }

    async fn run_script(&self, root: &Path, args: &[&str]) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let version = *state.roots.get(root).ok_or_else(|| UpgradeTestError::ScriptFailed {
            script: args.join(" "),
            root: root.to_path_buf(),
            reason: "no such sandbox".to_string(),
            stdout: String::new(),
        })?;

        match args.first().copied() {
            Some("./start") => {
                state.log.push(format!("start {}", version));
                state.running.insert(root.to_path_buf());
                Ok(String::new())
            }
            Some("./stop") => {
                state.log.push(format!("stop {}", version));
                state.running.remove(root);
                Ok(String::new())
            }
            Some("./my") => {
                state.log.push(format!("upgrade {}", version));
                let output = state
                    .upgrade_output
                    .get(&version)
                    .cloned()
                    .unwrap_or_else(|| "mysql.db                OK\n".to_string());
                if state.fail_upgrade.contains(&version) {
                    return Err(UpgradeTestError::ScriptFailed {
                        script: args.join(" "),
                        root: root.to_path_buf(),
                        reason: "exited with exit status: 2".to_string(),
                        stdout: output,
                    });
                }
                Ok(output)
            }
            _ => Err(UpgradeTestError::ScriptFailed {
                script: args.join(" "),
                root: root.to_path_buf(),
                reason: "unknown script".to_string(),
                stdout: String::new(),
            }),
        }
    }
}

/// Understands `CREATE TABLE <name>`, `SELECT ... FROM <name>` and `FAIL`.
#[async_trait]
impl DatabaseClient for FakeSandbox {
    async fn execute_script(&self, params: &ConnectionParams, sql: &str) -> Result<()> {
        self.record(format!("sql {} {}", params.port, sql));

        let root = self
            .root_for_port(params.port)
            .ok_or_else(|| UpgradeTestError::Database(format!("Can't connect to port {}", params.port)))?;
        let db_dir = root.join("data").join(&params.database);

        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let words: Vec<&str> = statement.split_whitespace().collect();
            match words.as_slice() {
                ["CREATE", "TABLE", name, ..] => {
                    let file = db_dir.join(format!("{}.frm", name));
                    if file.exists() {
                        return Err(UpgradeTestError::Database(format!(
                            "Table '{}' already exists",
                            name
                        )));
                    }
                    fs::write(file, statement)?;
                }
                ["SELECT", .., "FROM", name] => {
                    if !db_dir.join(format!("{}.frm", name)).exists() {
                        return Err(UpgradeTestError::Database(format!(
                            "Table '{}.{}' doesn't exist",
                            params.database, name
                        )));
                    }
                }
                ["FAIL", ..] => {
                    return Err(UpgradeTestError::Database("forced failure".to_string()));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// Temporary sandbox home and staging directory for one test.
pub struct TestEnv {
    pub dir: TempDir,
    pub sandbox: Arc<FakeSandbox>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            sandbox: FakeSandbox::new(),
        }
    }

    pub fn sandbox_home(&self) -> PathBuf {
        self.dir.path().join("sandboxes")
    }

    pub fn staging_dir(&self) -> PathBuf {
        self.dir.path().join("ugtdatadir")
    }

    pub fn config(&self, versions: &[&str]) -> ChainConfig {
        ChainConfig::new()
            .versions(VersionChain::parse(versions).unwrap())
            .sandbox_home(self.sandbox_home())
            .staging_dir(self.staging_dir())
            .builtin_suite(false)
    }

    pub fn root(&self, version: &str) -> PathBuf {
        let version: Version = version.parse().unwrap();
        self.sandbox_home()
            .join(format!("msb_ugt{}", version.dir_suffix()))
    }

    pub fn table_file(&self, version: &str, table: &str) -> PathBuf {
        self.root(version)
            .join("data")
            .join("test")
            .join(format!("{}.frm", table))
    }

    pub fn orchestrator(&self, config: ChainConfig, registry: CallbackRegistry) -> ChainOrchestrator {
        ChainOrchestrator::new(config, registry, self.sandbox.clone(), self.sandbox.clone())
    }
}

pub fn v(s: &str) -> Version {
    s.parse().unwrap()
}
