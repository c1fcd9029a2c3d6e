use crate::core::Version;
use std::fmt;

/// Orchestrator state
///
/// `Idle → Cleaning → (Provisioning → Starting → PreUpgradeCallbacks →
/// Upgrading → PostUpgradeCallbacks → Stopping → Staging)* → Done`, or
/// `Aborted` from any step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    Idle,
    Cleaning,
    Provisioning(Version),
    Starting(Version),
    PreUpgradeCallbacks(Version),
    Upgrading(Version),
    PostUpgradeCallbacks(Version),
    Stopping(Version),
    Staging(Version),
    Done,
    Aborted,
}

impl ChainState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChainState::Done | ChainState::Aborted)
    }

    pub fn version(&self) -> Option<&Version> {
        match self {
            ChainState::Provisioning(v)
            | ChainState::Starting(v)
            | ChainState::PreUpgradeCallbacks(v)
            | ChainState::Upgrading(v)
            | ChainState::PostUpgradeCallbacks(v)
            | ChainState::Stopping(v)
            | ChainState::Staging(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for ChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChainState::Idle => "idle",
            ChainState::Cleaning => "cleaning",
            ChainState::Provisioning(_) => "provisioning",
            ChainState::Starting(_) => "starting",
            ChainState::PreUpgradeCallbacks(_) => "pre-upgrade callbacks",
            ChainState::Upgrading(_) => "upgrading",
            ChainState::PostUpgradeCallbacks(_) => "post-upgrade callbacks",
            ChainState::Stopping(_) => "stopping",
            ChainState::Staging(_) => "staging",
            ChainState::Done => "done",
            ChainState::Aborted => "aborted",
        };

        match self.version() {
            Some(version) => write!(f, "{} {}", name, version),
            None => write!(f, "{}", name),
        }
    }
}
