//! Version-chain upgrade orchestration.
//!
//! The orchestrator walks the configured versions in order. The first
//! instance starts from a fresh data directory; every later one is seeded
//! from the staging area, which holds the previous instance's data as it
//! was after its upgrade and post-upgrade callbacks.

pub mod cancel;
pub mod report;
pub mod staging;
pub mod state;

pub use cancel::CancelSignal;
pub use report::{CallbackFailure, RunOutcome, RunReport, StepFailure, VersionReport};
pub use staging::StagingArea;
pub use state::ChainState;

use crate::callbacks::{CallbackRegistry, LifecycleEvent};
use crate::config::{ChainConfig, FailurePolicy};
use crate::core::{Result, UpgradeTestError, Version};
use crate::interface::{DatabaseClient, SandboxTool};
use crate::sandbox::{DataSource, InstanceHandle, UpgradeReport, bounded};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of driving one version through its steps.
enum Step {
    Next { staged: bool },
    Abort(String),
    Cancelled,
}

/// Drives a version chain from cleanup to completion
///
/// Owns the callback registry, the staging area and the current instance;
/// nothing else mutates them during a run.
pub struct ChainOrchestrator {
    config: ChainConfig,
    registry: CallbackRegistry,
    tool: Arc<dyn SandboxTool>,
    client: Arc<dyn DatabaseClient>,
    staging: StagingArea,
    cancel: CancelSignal,
    state: ChainState,
    history: Vec<ChainState>,
    current: Option<InstanceHandle>,
}

impl ChainOrchestrator {
    pub fn new(
        config: ChainConfig,
        registry: CallbackRegistry,
        tool: Arc<dyn SandboxTool>,
        client: Arc<dyn DatabaseClient>,
    ) -> Self {
        let staging = StagingArea::new(config.resolved_staging_dir());
        Self {
            config,
            registry,
            tool,
            client,
            staging,
            cancel: CancelSignal::new(),
            state: ChainState::Idle,
            history: Vec::new(),
            current: None,
        }
    }

    /// Share an externally owned cancel signal (e.g. wired to Ctrl-C).
    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    pub fn staging(&self) -> &StagingArea {
        &self.staging
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    /// Every state entered by the last run, in order.
    pub fn history(&self) -> &[ChainState] {
        &self.history
    }

    /// The last instance the run worked on, left in place for inspection.
    pub fn current(&self) -> Option<&InstanceHandle> {
        self.current.as_ref()
    }

    /// Deprovision every version in the chain and clear the staging area.
    ///
    /// Idempotent: absent instances and an absent staging directory only
    /// produce warnings.
    pub async fn cleanup(&mut self) -> Result<()> {
        for version in self.config.versions.versions() {
            let mut instance = self.instance(*version, DataSource::Fresh);
            instance.deprovision().await?;
        }

        self.current = None;
        self.staging.clear().await?;
        Ok(())
    }

    /// Run the whole chain.
    ///
    /// Only an invalid configuration is returned as `Err`; everything that
    /// goes wrong during the run ends up in the report.
    pub async fn run(&mut self) -> Result<RunReport> {
        self.config.validate().map_err(UpgradeTestError::Config)?;

        self.history.clear();
        self.state = ChainState::Idle;
        let mut report = RunReport::new();

        self.transition(ChainState::Cleaning);
        if let Err(err) = self.cleanup().await {
            error!("Cleanup failed: {}", err);
            self.transition(ChainState::Aborted);
            return Ok(report.finish(RunOutcome::Aborted {
                reason: format!("cleanup failed: {}", err),
            }));
        }

        let versions = self.config.versions.versions().to_vec();
        let mut staged = false;

        for version in versions {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(report));
            }

            let source = if staged {
                DataSource::SeededFrom(self.staging.path().to_path_buf())
            } else {
                DataSource::Fresh
            };

            let mut version_report = VersionReport::new(version, source.provisioner_arg());
            let step = self.run_version(version, source, &mut version_report).await;
            version_report.finish();
            report.versions.push(version_report);

            match step {
                Step::Next { staged: true } => staged = true,
                Step::Next { staged: false } => {}
                Step::Abort(reason) => {
                    error!("Aborting chain at {}: {}", version, reason);
                    self.transition(ChainState::Aborted);
                    return Ok(report.finish(RunOutcome::Aborted { reason }));
                }
                Step::Cancelled => return Ok(self.cancelled(report)),
            }
        }

        self.transition(ChainState::Done);

        if self.config.final_cleanup {
            info!("Final cleanup");
            if let Err(err) = self.cleanup().await {
                error!("Final cleanup failed: {}", err);
                if let Some(last) = report.versions.last_mut() {
                    last.record_step_failure("final cleanup", &err);
                }
            }
        }

        Ok(report.finish(RunOutcome::Done))
    }

    async fn run_version(
        &mut self,
        version: Version,
        source: DataSource,
        report: &mut VersionReport,
    ) -> Step {
        let policies = self.config.policies;

        self.transition(ChainState::Provisioning(version));
        let mut instance = self.instance(version, source);
        if let Err(err) = instance.provision().await {
            error!("Provisioning {} failed: {}", version, err);
            report.record_step_failure("provision", &err);
            return match policies.on_provision_failure {
                FailurePolicy::Abort => Step::Abort(err.to_string()),
                FailurePolicy::Continue => {
                    warn!("Skipping {} after failed provision", version);
                    Step::Next { staged: false }
                }
            };
        }
        report.provisioned = true;

        self.transition(ChainState::Starting(version));
        if let Err(err) = instance.start().await {
            report.record_step_failure("start", &err);
            self.stop_after_failure(&instance, report).await;
            self.current = Some(instance);
            return Step::Abort(err.to_string());
        }

        let step = self.exercise(&instance, report).await;
        if let Some(step) = step {
            self.stop_after_failure(&instance, report).await;
            self.current = Some(instance);
            return step;
        }

        self.transition(ChainState::Stopping(version));
        if let Err(err) = instance.stop().await {
            report.record_step_failure("stop", &err);
            self.current = Some(instance);
            return Step::Abort(err.to_string());
        }

        self.transition(ChainState::Staging(version));
        let staged = match instance.data_directory() {
            Ok(data_dir) => self.staging.replace_with(&data_dir).await.map(|_| ()),
            Err(err) => Err(err),
        };
        self.current = Some(instance);

        match staged {
            Ok(()) => {
                report.staged = true;
                Step::Next { staged: true }
            }
            Err(err) => {
                report.record_step_failure("staging", &err);
                Step::Abort(err.to_string())
            }
        }
    }

    /// Callbacks and upgrade against the running instance. `Some` means the
    /// version must stop early.
    async fn exercise(&mut self, instance: &InstanceHandle, report: &mut VersionReport) -> Option<Step> {
        let version = *instance.version();
        let policies = self.config.policies;

        if self.cancel.is_cancelled() {
            return Some(Step::Cancelled);
        }

        self.transition(ChainState::PreUpgradeCallbacks(version));
        if let Err(reason) = self.run_callbacks(instance, LifecycleEvent::PreUpgrade, report).await {
            return Some(Step::Abort(reason));
        }

        if self.cancel.is_cancelled() {
            return Some(Step::Cancelled);
        }

        self.transition(ChainState::Upgrading(version));
        match instance.upgrade().await {
            Ok(upgrade) => {
                report.upgrade_checks = upgrade.checks.len();
                report.upgrade_anomalies.extend(upgrade.anomalies().cloned());
                if !upgrade.is_clean() && policies.on_upgrade_anomaly == FailurePolicy::Abort {
                    return Some(Step::Abort(format!(
                        "{} upgrade anomalies on {}",
                        report.upgrade_anomalies.len(),
                        version
                    )));
                }
            }
            Err(err) => {
                error!("Upgrade of {} failed: {}", version, err);
                if let UpgradeTestError::ScriptFailed { stdout, .. } = &err {
                    let partial = UpgradeReport::parse(stdout);
                    report.upgrade_checks = partial.checks.len();
                    report.upgrade_anomalies.extend(partial.anomalies().cloned());
                }
                report.record_step_failure("upgrade", &err);
                if policies.on_upgrade_anomaly == FailurePolicy::Abort {
                    return Some(Step::Abort(err.to_string()));
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Some(Step::Cancelled);
        }

        self.transition(ChainState::PostUpgradeCallbacks(version));
        if let Err(reason) = self.run_callbacks(instance, LifecycleEvent::PostUpgrade, report).await {
            return Some(Step::Abort(reason));
        }

        if self.cancel.is_cancelled() {
            return Some(Step::Cancelled);
        }

        None
    }

    /// Run the actions registered for `(version, event)` in order. `Err`
    /// carries the abort reason when the callback policy is `Abort`.
    async fn run_callbacks(
        &self,
        instance: &InstanceHandle,
        event: LifecycleEvent,
        report: &mut VersionReport,
    ) -> std::result::Result<(), String> {
        let version = instance.version();
        let actions = self.registry.lookup(version, event);
        if actions.is_empty() {
            debug!("No callbacks for {} event for version {}", event, version);
            return Ok(());
        }

        let params = instance.connection_params(&self.config.credentials);
        let timeout = self.config.timeouts.callback();
        debug!("Running callback for {} event for version {}", event, version);

        for action in actions {
            report.callbacks_run += 1;
            let result = bounded(
                format!("callback '{}'", action.description()),
                timeout,
                action.run(&params, self.client.as_ref()),
            )
            .await;

            let Err(err) = result else { continue };

            error!(
                "Callback '{}' on {} ({}) failed: {}",
                action.description(),
                version,
                event,
                err
            );
            report.callback_failures.push(CallbackFailure {
                event,
                description: action.description().to_string(),
                error: err.to_string(),
            });

            match self.config.policies.on_callback_failure {
                FailurePolicy::Abort => {
                    return Err(format!("callback '{}' failed: {}", action.description(), err));
                }
                FailurePolicy::Continue => {
                    warn!("Continuing after failed callback '{}'", action.description());
                }
            }
        }

        Ok(())
    }

    /// Best-effort stop so an early exit never leaves a server running.
    async fn stop_after_failure(&mut self, instance: &InstanceHandle, report: &mut VersionReport) {
        self.transition(ChainState::Stopping(*instance.version()));
        if let Err(err) = instance.stop().await {
            warn!("Stopping {} after failure failed: {}", instance.version(), err);
            report.record_step_failure("stop", &err);
        }
    }

    fn cancelled(&mut self, report: RunReport) -> RunReport {
        warn!("Run cancelled");
        self.transition(ChainState::Aborted);
        report.finish(RunOutcome::Cancelled)
    }

    fn instance(&self, version: Version, source: DataSource) -> InstanceHandle {
        InstanceHandle::new(
            version,
            &self.config.prefix,
            self.config.resolved_sandbox_home(),
            Arc::clone(&self.tool),
        )
        .source(source)
        .timeouts(self.config.timeouts)
    }

    fn transition(&mut self, next: ChainState) {
        debug!("{} -> {}", self.state, next);
        self.history.push(next.clone());
        self.state = next;
    }
}
