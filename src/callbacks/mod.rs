pub mod action;
pub mod suite;

pub use action::{CustomAction, VerificationAction};

use crate::core::Version;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Point in the per-version flow at which callbacks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// After start, before upgrade-in-place
    PreUpgrade,
    /// After upgrade-in-place, before stop
    PostUpgrade,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::PreUpgrade => write!(f, "preupgrade"),
            LifecycleEvent::PostUpgrade => write!(f, "postupgrade"),
        }
    }
}

impl FromStr for LifecycleEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "preupgrade" => Ok(LifecycleEvent::PreUpgrade),
            "postupgrade" => Ok(LifecycleEvent::PostUpgrade),
            _ => Err(format!("Unknown lifecycle event '{}'", s)),
        }
    }
}

/// Verification actions keyed by `(version, event)`
///
/// Insertion order is execution order. Registering the same action twice
/// runs it twice.
#[derive(Debug, Clone, Default)]
pub struct CallbackRegistry {
    callbacks: HashMap<(Version, LifecycleEvent), Vec<VerificationAction>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        version: Version,
        event: LifecycleEvent,
        action: VerificationAction,
    ) -> &mut Self {
        self.callbacks
            .entry((version, event))
            .or_default()
            .push(action);
        self
    }

    /// Actions for `(version, event)`; empty when nothing was registered.
    pub fn lookup(&self, version: &Version, event: LifecycleEvent) -> &[VerificationAction] {
        self.callbacks
            .get(&(*version, event))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Total number of registered actions.
    pub fn len(&self) -> usize {
        self.callbacks.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Versions with at least one registration, in release order.
    pub fn versions(&self) -> Vec<Version> {
        let mut versions: Vec<Version> = self.callbacks.keys().map(|(v, _)| *v).collect();
        versions.sort();
        versions.dedup();
        versions
    }
}
