pub mod error;
pub mod version;

pub use error::{Result, UpgradeTestError};
pub use version::{Version, VersionChain};
