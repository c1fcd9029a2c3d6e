use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use upgrade_chain::{ChainConfig, ChainOrchestrator, MySqlClient, MysqlSandboxTool};

#[derive(Parser)]
#[command(name = "upgrade-chain")]
#[command(about = "Test in-place upgrades across a chain of MySQL Sandbox versions")]
struct Cli {
    /// Enable debug output
    #[arg(long)]
    debug: bool,

    /// JSON run configuration; defaults to the built-in 4.1 to 5.7 chain
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the run report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,

    /// Deprovision all instances and clear staging after the run
    #[arg(long)]
    final_cleanup: bool,

    /// Do not register the built-in schema suite
    #[arg(long)]
    no_builtin_suite: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let mut config = match &cli.config {
        Some(path) => ChainConfig::from_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => ChainConfig::default(),
    };
    if cli.final_cleanup {
        config.final_cleanup = true;
    }
    if cli.no_builtin_suite {
        config.builtin_suite = false;
    }

    let registry = config.build_registry();
    info!(
        "Testing upgrades across {} versions with {} callbacks",
        config.versions.len(),
        registry.len()
    );

    let client = MySqlClient::new(config.timeouts.callback());
    let mut orchestrator = ChainOrchestrator::new(
        config,
        registry,
        Arc::new(MysqlSandboxTool::new()),
        Arc::new(client),
    );

    let cancel = orchestrator.cancel_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; stopping after the current step");
            cancel.cancel();
        }
    });

    let report = orchestrator.run().await.context("Upgrade run could not start")?;
    report.log_summary();

    if let Some(path) = &cli.report {
        let json = report.to_json_pretty()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
        info!("Report written to {}", path.display());
    }

    if !report.is_success() {
        bail!(
            "Upgrade chain finished with {} failure(s) ({:?})",
            report.failure_count(),
            report.outcome
        );
    }

    Ok(())
}

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
