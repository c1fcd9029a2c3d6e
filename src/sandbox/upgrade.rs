use serde::{Deserialize, Serialize};

/// Status token that marks a healthy upgrade check.
pub const OK_STATUS: &str = "OK";

/// One line of `mysql_upgrade` output: a checked object and its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeCheck {
    pub line: String,
    pub status: String,
}

impl UpgradeCheck {
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end();
        if line.trim().is_empty() {
            return None;
        }

        let status = line.split_whitespace().last().unwrap_or_default();

        Some(Self {
            line: line.to_string(),
            status: status.to_string(),
        })
    }

    /// Anything not ending in `OK` is an anomaly, including lines with no
    /// recognisable status token at all.
    pub fn is_ok(&self) -> bool {
        self.line.ends_with(OK_STATUS)
    }
}

/// Parsed result of an upgrade-in-place run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeReport {
    pub checks: Vec<UpgradeCheck>,
}

impl UpgradeReport {
    pub fn parse(output: &str) -> Self {
        Self {
            checks: output.lines().filter_map(UpgradeCheck::parse).collect(),
        }
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &UpgradeCheck> {
        self.checks.iter().filter(|check| !check.is_ok())
    }

    pub fn is_clean(&self) -> bool {
        self.anomalies().next().is_none()
    }
}
