// ============================================================================
// Sandbox upgrade chain
// ============================================================================

pub mod core;
pub mod connection;
pub mod interface;
pub mod sandbox;
pub mod callbacks;
pub mod config;
pub mod chain;

// Re-export main types for convenience
pub use core::{Result, UpgradeTestError, Version, VersionChain};
pub use config::{CallbackSpec, ChainConfig, FailurePolicies, FailurePolicy};
pub use interface::{DatabaseClient, SandboxTool};

pub use connection::{ConnectionParams, Credentials, MySqlClient};
pub use sandbox::{
    DataSource, DeprovisionOutcome, InstanceHandle, MysqlSandboxTool, Timeouts, UpgradeCheck,
    UpgradeReport,
};
pub use callbacks::{CallbackRegistry, CustomAction, LifecycleEvent, VerificationAction};
pub use chain::{
    CancelSignal, ChainOrchestrator, ChainState, RunOutcome, RunReport, StagingArea,
    VersionReport,
};
