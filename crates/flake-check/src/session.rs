//! Check session: dispatches top-level outputs to their validators and
//! submits the collected build targets.

use crate::category::Category;
use crate::collector::BuildTargetCollector;
use crate::config::CheckConfig;
use crate::context::{ContextStack, Frame};
use crate::error::CheckFailure;
use crate::store::StorePath;
use crate::trigger::{BuildReport, BuildTrigger};
use crate::validators::{force_attrs, CheckResult};
use crate::value::{AttrPath, OutputNode};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Non-fatal finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// Output name outside the recognised categories
    UnrecognizedCategory { name: String },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::UnrecognizedCategory { name } => write!(f, "unknown flake output '{}'", name),
        }
    }
}

/// Outcome of a successful check run
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    /// Platform the run was filtered for
    pub system: String,
    /// Recognised outputs, in the order they were checked
    pub checked: Vec<String>,
    pub warnings: Vec<Warning>,
    /// Targets collected for building, sorted
    pub build_targets: Vec<StorePath>,
    /// Present when targets were submitted
    pub build: Option<BuildReport>,
    /// Validation time in milliseconds
    pub duration_ms: u64,
}

/// State shared by every validator during one pass
#[derive(Debug)]
pub struct CheckSession<'c> {
    config: &'c CheckConfig,
    context: ContextStack,
    collector: BuildTargetCollector,
    warnings: Vec<Warning>,
    checked: Vec<String>,
}

impl<'c> CheckSession<'c> {
    pub fn new(config: &'c CheckConfig) -> Self {
        CheckSession {
            config,
            context: ContextStack::new(),
            collector: BuildTargetCollector::new(),
            warnings: Vec::new(),
            checked: Vec::new(),
        }
    }

    /// Current platform identifier
    pub fn system(&self) -> &str {
        &self.config.system
    }

    pub fn store_dir(&self) -> &str {
        &self.config.store_dir
    }

    pub fn context(&self) -> &ContextStack {
        &self.context
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Register a build target
    pub fn collect(&mut self, target: StorePath) {
        if self.collector.insert(target) {
            debug!(targets = self.collector.len(), "collected build target");
        }
    }

    /// Targets collected so far, sorted
    pub fn collected(&self) -> Vec<StorePath> {
        self.collector.iter().cloned().collect()
    }

    /// Run `f` inside `frame`.
    ///
    /// The frame is popped on every exit path. A failure leaving the scope
    /// without context receives a snapshot of the full stack, so the
    /// innermost scope determines the recorded chain.
    pub(crate) fn scoped<T>(
        &mut self,
        frame: Frame,
        f: impl FnOnce(&mut Self) -> CheckResult<T>,
    ) -> CheckResult<T> {
        debug!(depth = self.context.depth(), "{}", frame);
        self.context.push(frame);
        let result = f(self).map_err(|mut failure| {
            if !failure.has_context() {
                failure.frames = self.context.frames().to_vec();
            }
            failure
        });
        self.context.pop();
        result
    }

    /// Validate every top-level output of `outputs`, stopping at the first
    /// failure. Nothing is built.
    pub fn validate<N: OutputNode>(mut self, outputs: &N) -> CheckResult<CheckReport> {
        let start = Instant::now();
        info!(system = %self.config.system, "evaluating flake");

        let outputs = force_attrs(outputs, &AttrPath::default())?;
        for output in outputs.iter() {
            let Some(category) = Category::from_name(output.name) else {
                warn!("unknown flake output '{}'", output.name);
                self.warnings.push(Warning::UnrecognizedCategory {
                    name: output.name.to_string(),
                });
                continue;
            };

            let frame = Frame::new(
                format!("while checking flake output '{}'", output.name),
                AttrPath::root(output.name),
            );
            let validator = category.validator::<N>();
            self.scoped(frame, |session| validator(session, output))?;
            self.checked.push(output.name.to_string());
        }

        Ok(CheckReport {
            system: self.config.system.clone(),
            checked: self.checked,
            warnings: self.warnings,
            build_targets: self.collector.into_vec(),
            build: None,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Validate `outputs` and, when building is enabled, build the collected
/// targets in a single batch.
///
/// Targets are only submitted after the whole tree validated; a validation
/// failure discards them.
pub async fn check_outputs<N: OutputNode>(
    outputs: &N,
    config: &CheckConfig,
    trigger: &dyn BuildTrigger,
) -> CheckResult<CheckReport> {
    let mut report = CheckSession::new(config).validate(outputs)?;

    if !config.build {
        debug!("build disabled, skipping {} targets", report.build_targets.len());
        return Ok(report);
    }
    if report.build_targets.is_empty() {
        return Ok(report);
    }

    info!(targets = report.build_targets.len(), "running flake checks");
    let build = trigger.build(&report.build_targets).await?;
    if !build.success() {
        let failed: Vec<_> = build.failed().map(|outcome| outcome.target.to_string()).collect();
        return Err(CheckFailure::build(format!(
            "{} of {} build targets failed: {}",
            failed.len(),
            build.outcomes.len(),
            failed.join(", ")
        )));
    }

    report.build = Some(build);
    Ok(report)
}
