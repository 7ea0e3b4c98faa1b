//! Diagnostic context frames
//!
//! Every validator runs inside a frame describing what it is checking.
//! Frames nest strictly; the stack is snapshotted into a [`CheckFailure`]
//! at the innermost point of failure.
//!
//! [`CheckFailure`]: crate::error::CheckFailure

use crate::value::{AttrPath, SourcePos};
use serde::Serialize;
use std::fmt;

/// One "while checking ..." label
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Frame {
    pub label: String,
    pub attr_path: AttrPath,
    pub pos: Option<SourcePos>,
}

impl Frame {
    pub fn new(label: impl Into<String>, attr_path: AttrPath) -> Self {
        Frame {
            label: label.into(),
            attr_path,
            pos: None,
        }
    }

    /// Attach the source position of the value being checked. Unknown
    /// positions are dropped.
    pub fn at(mut self, pos: SourcePos) -> Self {
        if pos.is_known() {
            self.pos = Some(pos);
        }
        self
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.pos {
            Some(pos) => write!(f, "{} at {}", self.label, pos),
            None => f.write_str(&self.label),
        }
    }
}

/// Strictly nested stack of active frames
#[derive(Debug, Default, Clone)]
pub struct ContextStack {
    frames: Vec<Frame>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Active frames, outermost first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}
