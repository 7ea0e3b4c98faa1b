//! flake-check - validate flake outputs and build their checks
//!
//! ## Commands
//!
//! - `check`: validate an evaluated output tree and build its checks
//! - `info`: list the outputs of an evaluated output tree
//! - `init`: write a skeleton `flake.nix`

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flake_check::{
    check_outputs, describe_outputs, init_flake, BuildTrigger, CheckConfig, CheckReport,
    ManifestNode, NixBuildTrigger,
};
use std::path::{Path, PathBuf};
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "flake-check")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Check flake outputs and build their checks", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON log lines and JSON reports
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the outputs of a flake and build its checks
    Check {
        /// Output tree dumped by the evaluator (JSON)
        outputs: PathBuf,

        /// Only validate, do not build anything
        #[arg(long)]
        no_build: bool,

        /// Platform whose checks are built (default: host platform)
        #[arg(long, env = "FLAKE_CHECK_SYSTEM")]
        system: Option<String>,

        /// Nix store directory
        #[arg(long, env = "NIX_STORE_DIR")]
        store_dir: Option<String>,

        /// Program used to realise derivations
        #[arg(long, env = "FLAKE_CHECK_NIX_STORE")]
        nix_store: Option<String>,

        /// Build timeout in seconds (0 = none)
        #[arg(long, env = "FLAKE_CHECK_BUILD_TIMEOUT")]
        timeout: Option<u64>,
    },

    /// Show the outputs of a flake
    Info {
        /// Output tree dumped by the evaluator (JSON)
        outputs: PathBuf,
    },

    /// Create a skeleton flake.nix in a git checkout
    Init {
        /// Directory to initialize (default: current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    flake_check::telemetry::init_tracing(cli.json, level);

    match cli.command {
        Commands::Check {
            outputs,
            no_build,
            system,
            store_dir,
            nix_store,
            timeout,
        } => {
            let mut config = CheckConfig::from_env().with_build(!no_build);
            if let Some(system) = system {
                config = config.with_system(&system);
            }
            if let Some(store_dir) = store_dir {
                config = config.with_store_dir(&store_dir);
            }
            if let Some(program) = nix_store {
                config = config.with_nix_store_program(&program);
            }
            if let Some(secs) = timeout {
                config = config.with_build_timeout(secs);
            }

            let trigger = NixBuildTrigger::from_config(&config);
            cmd_check(&outputs, &config, &trigger, cli.json).await.map(|_| ())
        }
        Commands::Info { outputs } => cmd_info(&outputs, cli.json),
        Commands::Init { path } => cmd_init(&path),
    }
}

/// Validate and build an output tree, printing the report
async fn cmd_check(
    path: &Path,
    config: &CheckConfig,
    trigger: &dyn BuildTrigger,
    json: bool,
) -> Result<CheckReport> {
    debug!(?config, "check configuration");
    let outputs = ManifestNode::load(path, &config.store_dir)
        .with_context(|| format!("Failed to load outputs from {}", path.display()))?;

    let report = match check_outputs(&outputs, config, trigger).await {
        Ok(report) => report,
        Err(failure) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&failure)?);
            }
            anyhow::bail!("{}", failure.render());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(report);
    }

    for warning in &report.warnings {
        println!("warning: {}", warning);
    }
    println!(
        "Checked {} outputs for {}: {}",
        report.checked.len(),
        report.system,
        report.checked.join(", ")
    );
    match &report.build {
        Some(build) => {
            println!("Built {} targets in {}ms", build.passed_count(), build.duration_ms);
            for outcome in &build.outcomes {
                println!("  ✓ {}", outcome.target);
            }
        }
        None if report.build_targets.is_empty() => println!("Nothing to build"),
        None => {
            println!("Skipped building {} targets:", report.build_targets.len());
            for target in &report.build_targets {
                println!("  - {}", target);
            }
        }
    }

    Ok(report)
}

/// Print the top-level outputs
fn cmd_info(path: &Path, json: bool) -> Result<()> {
    let store_dir = CheckConfig::from_env().store_dir;
    let outputs = ManifestNode::load(path, &store_dir)
        .with_context(|| format!("Failed to load outputs from {}", path.display()))?;
    let described = describe_outputs(&outputs).map_err(|failure| anyhow::anyhow!(failure.render()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&described)?);
        return Ok(());
    }

    println!("Outputs:");
    if let Some(entries) = described.as_object() {
        for (name, children) in entries {
            let children: Vec<_> = children
                .as_object()
                .map(|c| c.keys().cloned().collect())
                .unwrap_or_default();
            if children.is_empty() {
                println!("  {}", name);
            } else {
                println!("  {} ({})", name, children.join(", "));
            }
        }
    }
    Ok(())
}

/// Write a skeleton flake.nix
fn cmd_init(path: &Path) -> Result<()> {
    let flake_path = init_flake(path).context("Failed to initialize flake")?;
    println!("Wrote {}", flake_path.display());
    Ok(())
}
