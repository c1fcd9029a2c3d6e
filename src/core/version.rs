use super::error::{Result, UpgradeTestError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Engine release identifier (`major.minor.patch`).
///
/// Ordering follows release order, so a chain can be checked for
/// monotonicity with plain comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    major: u32,
    minor: u32,
    patch: u32,
}

impl Version {
    /// Fails when the derived port would not fit in a `u16`.
    pub fn new(major: u32, minor: u32, patch: u32) -> Result<Self> {
        if Self::derive_port(major, minor, patch).is_none() {
            return Err(UpgradeTestError::InvalidVersion(format!(
                "{}.{}.{}",
                major, minor, patch
            )));
        }
        Ok(Self { major, minor, patch })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    /// Port the sandbox for this version listens on.
    ///
    /// ```
    /// # use upgrade_chain::Version;
    /// let version: Version = "5.7.9".parse().unwrap();
    /// assert_eq!(version.port(), 5709);
    /// ```
    pub fn port(&self) -> u16 {
        // Range checked on construction.
        Self::derive_port(self.major, self.minor, self.patch).unwrap_or(u16::MAX)
    }

    /// Directory suffix used by the provisioner, e.g. `5_7_9`.
    pub fn dir_suffix(&self) -> String {
        format!("{}_{}_{}", self.major, self.minor, self.patch)
    }

    fn derive_port(major: u32, minor: u32, patch: u32) -> Option<u16> {
        let port = major
            .checked_mul(1000)?
            .checked_add(minor.checked_mul(100)?)?
            .checked_add(patch)?;
        u16::try_from(port).ok()
    }
}

impl FromStr for Version {
    type Err = UpgradeTestError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || UpgradeTestError::InvalidVersion(s.to_string());

        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| invalid())?;
        }

        let [major, minor, patch] = numbers;
        Self::new(major, minor, patch).map_err(|_| invalid())
    }
}

impl TryFrom<String> for Version {
    type Error = UpgradeTestError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Ordered, non-empty sequence of versions walked by a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Version>", into = "Vec<Version>")]
pub struct VersionChain {
    versions: Vec<Version>,
}

impl VersionChain {
    pub fn new(versions: Vec<Version>) -> Result<Self> {
        if versions.is_empty() {
            return Err(UpgradeTestError::EmptyChain);
        }

        for pair in versions.windows(2) {
            if pair[0] >= pair[1] {
                warn!(
                    "Version chain is not increasing ({} before {}); upgrade results may be meaningless",
                    pair[0], pair[1]
                );
            }
        }

        Ok(Self { versions })
    }

    /// Parse a chain from version strings.
    pub fn parse<S: AsRef<str>>(versions: &[S]) -> Result<Self> {
        let parsed = versions
            .iter()
            .map(|v| v.as_ref().parse())
            .collect::<Result<Vec<Version>>>()?;
        Self::new(parsed)
    }

    pub fn versions(&self) -> &[Version] {
        &self.versions
    }

    pub fn first(&self) -> Version {
        self.versions[0]
    }

    pub fn contains(&self, version: &Version) -> bool {
        self.versions.contains(version)
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Version> {
        self.versions.iter()
    }
}

impl TryFrom<Vec<Version>> for VersionChain {
    type Error = UpgradeTestError;

    fn try_from(value: Vec<Version>) -> Result<Self> {
        Self::new(value)
    }
}

impl From<VersionChain> for Vec<Version> {
    fn from(chain: VersionChain) -> Self {
        chain.versions
    }
}

impl Default for VersionChain {
    /// The 4.1 through 5.7 chain exercised by the built-in suite.
    fn default() -> Self {
        let versions = ["4.1.21", "5.0.96", "5.1.73", "5.5.45", "5.6.25", "5.7.9"]
            .iter()
            .filter_map(|v| v.parse().ok())
            .collect();
        Self { versions }
    }
}
