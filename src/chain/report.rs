use crate::callbacks::LifecycleEvent;
use crate::core::{Result, Version};
use crate::sandbox::UpgradeCheck;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Done,
    Aborted { reason: String },
    Cancelled,
}

/// Instance or staging operation that failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    pub step: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallbackFailure {
    pub event: LifecycleEvent,
    pub description: String,
    pub error: String,
}

/// Everything that happened to one version of the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReport {
    pub version: Version,
    /// Provisioner `--datadir_from` value
    pub data_source: String,
    pub provisioned: bool,
    pub staged: bool,
    pub callbacks_run: usize,
    pub upgrade_checks: usize,
    pub upgrade_anomalies: Vec<UpgradeCheck>,
    pub callback_failures: Vec<CallbackFailure>,
    pub step_failures: Vec<StepFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl VersionReport {
    pub fn new(version: Version, data_source: String) -> Self {
        Self {
            version,
            data_source,
            provisioned: false,
            staged: false,
            callbacks_run: 0,
            upgrade_checks: 0,
            upgrade_anomalies: Vec::new(),
            callback_failures: Vec::new(),
            step_failures: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn record_step_failure(&mut self, step: &str, error: impl ToString) {
        self.step_failures.push(StepFailure {
            step: step.to_string(),
            error: error.to_string(),
        });
    }

    pub fn failure_count(&self) -> usize {
        self.upgrade_anomalies.len() + self.callback_failures.len() + self.step_failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failure_count() == 0
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

/// Per-version summary of a whole run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub versions: Vec<VersionReport>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunReport {
    pub(crate) fn new() -> Self {
        Self {
            outcome: RunOutcome::Done,
            versions: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub(crate) fn finish(mut self, outcome: RunOutcome) -> Self {
        self.outcome = outcome;
        self.finished_at = Some(Utc::now());
        self
    }

    pub fn version(&self, version: &Version) -> Option<&VersionReport> {
        self.versions.iter().find(|report| &report.version == version)
    }

    /// Callback invocations across all versions.
    pub fn callback_invocations(&self) -> usize {
        self.versions.iter().map(|v| v.callbacks_run).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.versions.iter().map(VersionReport::failure_count).sum()
    }

    /// Run reached `Done` and no version recorded a failure.
    pub fn is_success(&self) -> bool {
        self.outcome == RunOutcome::Done && self.failure_count() == 0
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Log one line per version plus details of every failure.
    pub fn log_summary(&self) {
        for report in &self.versions {
            if report.is_clean() {
                info!(
                    "{}: OK ({} callbacks, {} upgrade checks)",
                    report.version, report.callbacks_run, report.upgrade_checks
                );
                continue;
            }

            warn!("{}: {} failure(s)", report.version, report.failure_count());
            for anomaly in &report.upgrade_anomalies {
                warn!("  upgrade: {}", anomaly.line);
            }
            for failure in &report.callback_failures {
                warn!(
                    "  {} callback '{}': {}",
                    failure.event, failure.description, failure.error
                );
            }
            for failure in &report.step_failures {
                warn!("  {}: {}", failure.step, failure.error);
            }
        }

        match &self.outcome {
            RunOutcome::Done => info!("Run finished: {} failure(s)", self.failure_count()),
            RunOutcome::Aborted { reason } => warn!("Run aborted: {}", reason),
            RunOutcome::Cancelled => warn!("Run cancelled"),
        }
    }
}
