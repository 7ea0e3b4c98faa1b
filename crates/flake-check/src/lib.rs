//! flake-check: validation and build orchestration for flake outputs
//!
//! Walks the output attribute set of a flake, validates each recognised
//! output category against its structural contract, collects the
//! derivations that must be built for the current platform and hands them
//! to a [`BuildTrigger`] in a single batch.
//!
//! Evaluation is behind the [`OutputNode`] seam: nodes are forced only when
//! a validator inspects them. [`ManifestNode`] is an in-memory tree loaded
//! from JSON.
//!
//! ```no_run
//! use flake_check::{check_outputs, CheckConfig, ManifestNode, NixBuildTrigger};
//!
//! # async fn run() -> flake_check::Result<()> {
//! let config = CheckConfig::from_env();
//! let outputs = ManifestNode::load("outputs.json", &config.store_dir)?;
//! let trigger = NixBuildTrigger::from_config(&config);
//!
//! let report = check_outputs(&outputs, &config, &trigger).await?;
//! println!("checked {} outputs", report.checked.len());
//! # Ok(())
//! # }
//! ```

pub mod category;
pub mod collector;
pub mod config;
pub mod context;
pub mod describe;
pub mod error;
pub mod fakes;
pub mod init;
pub mod manifest;
pub mod platform;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod trigger;
pub mod value;
mod validators;

pub use category::Category;
pub use collector::BuildTargetCollector;
pub use config::CheckConfig;
pub use context::{ContextStack, Frame};
pub use describe::describe_outputs;
pub use error::{BuildError, CheckFailure, EvalError, FailureKind, FlakeError, ManifestError, StorePathError};
pub use init::init_flake;
pub use manifest::ManifestNode;
pub use session::{check_outputs, CheckReport, CheckSession, Warning};
pub use store::StorePath;
pub use trigger::{BuildReport, BuildTrigger, NixBuildTrigger, TargetOutcome};
pub use validators::CheckResult;
pub use value::{AttrPath, OutputNode, SourcePos, Value};

/// Crate-level result
pub type Result<T> = std::result::Result<T, FlakeError>;
