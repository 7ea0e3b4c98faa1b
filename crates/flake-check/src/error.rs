//! Error types for flake-check

use crate::context::Frame;
use crate::value::AttrPath;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error raised by the evaluator while forcing an output node
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EvalError {
    /// Message reported by the evaluator
    pub message: String,
}

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        EvalError {
            message: message.into(),
        }
    }
}

/// Malformed store path
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorePathError {
    /// Path does not live directly under the store directory
    #[error("path '{path}' is not in the Nix store '{store_dir}'")]
    NotInStore { path: String, store_dir: String },

    /// Base name is not `<hash>-<name>`
    #[error("path '{0}' is not a valid store path")]
    Invalid(String),
}

/// Errors raised by a build backend
#[derive(Error, Debug)]
pub enum BuildError {
    /// Backend process could not be started
    #[error("Failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Backend did not finish in time
    #[error("Build timed out after {0} seconds")]
    Timeout(u64),

    /// IO error while talking to the backend
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while loading a JSON output tree
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Position string is not `file:line:column`
    #[error("invalid position '{0}', expected 'file:line:column'")]
    InvalidPosition(String),

    /// `__kind` names no known node kind
    #[error("unknown node kind '{kind}' at '{path}'")]
    UnknownKind { kind: String, path: String },

    /// Tagged node lacks a required field
    #[error("missing field '{field}' in {kind} node at '{path}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
        path: String,
    },

    /// Field present but with the wrong JSON type
    #[error("invalid field '{field}' at '{path}': {reason}")]
    InvalidField {
        field: &'static str,
        path: String,
        reason: String,
    },

    /// Derivation path rejected
    #[error("invalid derivation at '{path}': {source}")]
    StorePath {
        path: String,
        #[source]
        source: StorePathError,
    },

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Crate-level errors
#[derive(Error, Debug)]
pub enum FlakeError {
    /// Output check failed
    #[error("{0}")]
    Check(#[from] CheckFailure),

    /// Output tree could not be loaded
    #[error("Invalid output manifest: {0}")]
    Manifest(#[from] ManifestError),

    /// `init` outside a git checkout
    #[error("the directory '{0}' is not a Git repository")]
    NotAGitRepository(String),

    /// `init` would overwrite an existing file
    #[error("file '{0}' already exists")]
    AlreadyExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Classification of a check failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Value has the wrong shape for its position
    StructuralMismatch,
    /// Per-platform attribute name is not `<arch>-<os>`
    InvalidPlatformIdentifier,
    /// Forcing a node failed
    EvaluationFailure,
    /// A required attribute is absent
    MissingRequiredAttribute,
    /// A requested build target failed to build
    BuildFailure,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::StructuralMismatch => "structural mismatch",
            FailureKind::InvalidPlatformIdentifier => "invalid platform identifier",
            FailureKind::EvaluationFailure => "evaluation failure",
            FailureKind::MissingRequiredAttribute => "missing required attribute",
            FailureKind::BuildFailure => "build failure",
        };
        f.write_str(name)
    }
}

/// A failed check with the context frames that were active when it failed.
///
/// `frames` is ordered outermost first. It is filled exactly once, by the
/// innermost validator scope the failure passes through.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{}", render_chain(.frames, .message))]
pub struct CheckFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Most specific attribute path known at the failure point
    pub attr_path: AttrPath,
    pub frames: Vec<Frame>,
}

impl CheckFailure {
    pub fn new(kind: FailureKind, attr_path: AttrPath, message: impl Into<String>) -> Self {
        CheckFailure {
            kind,
            message: message.into(),
            attr_path,
            frames: Vec::new(),
        }
    }

    pub fn structural(attr_path: &AttrPath, message: impl Into<String>) -> Self {
        Self::new(FailureKind::StructuralMismatch, attr_path.clone(), message)
    }

    pub fn invalid_platform(attr_path: AttrPath, message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidPlatformIdentifier, attr_path, message)
    }

    pub fn evaluation(attr_path: &AttrPath, err: EvalError) -> Self {
        Self::new(FailureKind::EvaluationFailure, attr_path.clone(), err.message)
    }

    pub fn missing_attribute(attr_path: &AttrPath, message: impl Into<String>) -> Self {
        Self::new(
            FailureKind::MissingRequiredAttribute,
            attr_path.clone(),
            message,
        )
    }

    pub fn build(message: impl Into<String>) -> Self {
        Self::new(FailureKind::BuildFailure, AttrPath::default(), message)
    }

    /// Whether a validator scope already attached its frame chain
    pub fn has_context(&self) -> bool {
        !self.frames.is_empty()
    }

    /// The most specific frame, if any
    pub fn innermost_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Render the frame chain followed by the message, one frame per line.
    pub fn render(&self) -> String {
        render_chain(&self.frames, &self.message)
    }
}

fn render_chain(frames: &[Frame], message: &str) -> String {
    let mut out = String::new();
    for frame in frames {
        out.push_str(&frame.to_string());
        out.push_str(":\n");
    }
    out.push_str(message);
    out
}

impl From<BuildError> for CheckFailure {
    fn from(err: BuildError) -> Self {
        CheckFailure::build(err.to_string())
    }
}
