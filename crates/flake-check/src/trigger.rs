//! Build backend seam and the `nix-store --realise` implementation

use crate::config::CheckConfig;
use crate::error::BuildError;
use crate::store::StorePath;
use async_trait::async_trait;
use serde::Serialize;
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Result of building one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetOutcome {
    pub target: StorePath,
    pub success: bool,
    /// Backend diagnostic for failed targets
    pub message: Option<String>,
}

impl TargetOutcome {
    pub fn built(target: StorePath) -> Self {
        TargetOutcome {
            target,
            success: true,
            message: None,
        }
    }

    pub fn failed(target: StorePath, message: impl Into<String>) -> Self {
        TargetOutcome {
            target,
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Per-target results of one batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub outcomes: Vec<TargetOutcome>,
    pub duration_ms: u64,
}

impl BuildReport {
    /// Whether every target built
    pub fn success(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn failed(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }
}

/// Something that can build a batch of store derivations.
///
/// Called at most once per check run. Retrying is the backend's business.
#[async_trait]
pub trait BuildTrigger: Send + Sync {
    async fn build(&self, targets: &[StorePath]) -> Result<BuildReport, BuildError>;
}

/// Builds targets with `nix-store --realise --keep-going`
#[derive(Debug, Clone)]
pub struct NixBuildTrigger {
    program: String,
    timeout_secs: u64,
}

impl NixBuildTrigger {
    pub fn new(program: &str, timeout_secs: u64) -> Self {
        NixBuildTrigger {
            program: program.to_string(),
            timeout_secs,
        }
    }

    pub fn from_config(config: &CheckConfig) -> Self {
        Self::new(&config.nix_store_program, config.build_timeout_secs)
    }
}

#[async_trait]
impl BuildTrigger for NixBuildTrigger {
    async fn build(&self, targets: &[StorePath]) -> Result<BuildReport, BuildError> {
        let start = Instant::now();
        info!(program = %self.program, targets = targets.len(), "realising build targets");

        let child = Command::new(&self.program)
            .args(["--realise", "--keep-going"])
            .args(targets.iter().map(StorePath::as_str))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| BuildError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let output = if self.timeout_secs > 0 {
            tokio::time::timeout(
                std::time::Duration::from_secs(self.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| BuildError::Timeout(self.timeout_secs))??
        } else {
            child.wait_with_output().await?
        };

        let stderr = String::from_utf8_lossy(&output.stderr);
        let outcomes = if output.status.success() {
            targets.iter().cloned().map(TargetOutcome::built).collect()
        } else {
            warn!(code = ?output.status.code(), "build backend reported failure");
            attribute_failures(&stderr, targets)
        };

        let report = BuildReport {
            outcomes,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            "build finished"
        );
        Ok(report)
    }
}

/// Decide which targets failed from the backend's stderr.
///
/// Builder failure lines name the exact derivation; the summary line names
/// everything that was requested, so it is only used when no builder line
/// matched. When nothing names a target, every target is failed.
fn attribute_failures(stderr: &str, targets: &[StorePath]) -> Vec<TargetOutcome> {
    let error_lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("error:"))
        .collect();

    let builder_lines: Vec<&str> = error_lines
        .iter()
        .copied()
        .filter(|line| line.contains("builder for"))
        .collect();
    let lines = if builder_lines.is_empty() {
        &error_lines
    } else {
        &builder_lines
    };

    let outcomes: Vec<TargetOutcome> = targets
        .iter()
        .map(|target| match lines.iter().find(|line| line.contains(target.as_str())) {
            Some(line) => TargetOutcome::failed(target.clone(), *line),
            None => TargetOutcome::built(target.clone()),
        })
        .collect();

    if outcomes.iter().all(|o| o.success) {
        let message = error_lines
            .last()
            .copied()
            .or_else(|| stderr.lines().last())
            .unwrap_or("build failed")
            .to_string();
        return targets
            .iter()
            .cloned()
            .map(|target| TargetOutcome::failed(target, message.clone()))
            .collect();
    }

    outcomes
}
