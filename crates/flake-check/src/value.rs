//! Evaluator seam: lazily forced output nodes and the shapes they force to
//!
//! The check engine never evaluates anything itself. It walks a tree of
//! [`OutputNode`]s supplied by an evaluator and forces only the nodes a
//! validator actually inspects.

use crate::error::EvalError;
use crate::store::StorePath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source location of an attribute binding
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePos {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl SourcePos {
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        SourcePos {
            file: file.into(),
            line,
            column,
        }
    }

    /// Position used when the evaluator has none
    pub fn unknown() -> Self {
        SourcePos::new("", 0, 0)
    }

    pub fn is_known(&self) -> bool {
        !self.file.is_empty()
    }

    /// Parse `file:line:column`. The file part may itself contain colons.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.rsplitn(3, ':');
        let column = parts.next()?.parse().ok()?;
        let line = parts.next()?.parse().ok()?;
        let file = parts.next().filter(|f| !f.is_empty())?;
        Some(SourcePos::new(file, line, column))
    }
}

impl Default for SourcePos {
    fn default() -> Self {
        Self::unknown()
    }
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}:{}:{}", self.file, self.line, self.column)
        } else {
            f.write_str("undefined position")
        }
    }
}

/// Dotted attribute path, used only for diagnostics
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub struct AttrPath(Vec<String>);

impl AttrPath {
    /// Single-segment path
    pub fn root(name: &str) -> Self {
        AttrPath(vec![name.to_string()])
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AttrPath(segments.into_iter().map(Into::into).collect())
    }

    /// A new path extended by `name`
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        AttrPath(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl From<AttrPath> for String {
    fn from(path: AttrPath) -> Self {
        path.to_string()
    }
}

/// A lazily evaluated element of the output tree.
///
/// `force` evaluates the node to its concrete shape. Implementations may
/// cache, but the engine calls it at most once per node it visits.
pub trait OutputNode: Sized {
    fn force(&self) -> Result<Value<'_, Self>, EvalError>;
}

/// Concrete shape of a forced node
#[derive(Debug)]
pub enum Value<'a, N> {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(StringValue),
    Path(String),
    List(Vec<&'a N>),
    Attrs(AttrSet<'a, N>),
    Lambda(Lambda),
}

impl<N> Value<'_, N> {
    /// Type name as shown in diagnostics ("a set", "a function", ...)
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "a Boolean",
            Value::Int(_) => "an integer",
            Value::Float(_) => "a float",
            Value::String(_) => "a string",
            Value::Path(_) => "a path",
            Value::List(_) => "a list",
            Value::Attrs(_) => "a set",
            Value::Lambda(_) => "a function",
        }
    }
}

/// String value with the store paths it refers to
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringValue {
    pub value: String,
    /// Raw context elements, e.g. `!out!/nix/store/...-hello.drv`
    pub context: Vec<String>,
}

impl StringValue {
    pub fn plain(value: impl Into<String>) -> Self {
        StringValue {
            value: value.into(),
            context: Vec::new(),
        }
    }

    pub fn has_context(&self) -> bool {
        !self.context.is_empty()
    }
}

/// One attribute of a forced set
#[derive(Debug)]
pub struct Attr<'a, N> {
    pub name: &'a str,
    pub value: &'a N,
    pub pos: SourcePos,
}

/// Forced attribute set in stable iteration order
#[derive(Debug)]
pub struct AttrSet<'a, N> {
    attrs: Vec<Attr<'a, N>>,
    derivation: Option<Derivation>,
}

impl<'a, N> AttrSet<'a, N> {
    pub fn new(attrs: Vec<Attr<'a, N>>) -> Self {
        AttrSet {
            attrs,
            derivation: None,
        }
    }

    /// Attribute set that the evaluator recognises as a derivation
    pub fn derivation(attrs: Vec<Attr<'a, N>>, derivation: Derivation) -> Self {
        AttrSet {
            attrs,
            derivation: Some(derivation),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attr<'a, N>> {
        self.attrs.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Attr<'a, N>> {
        self.attrs.iter().find(|attr| attr.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.attrs.iter().map(|attr| attr.name)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn is_derivation(&self) -> bool {
        self.derivation.is_some()
    }

    pub fn derivation_info(&self) -> Option<&Derivation> {
        self.derivation.as_ref()
    }
}

/// What the evaluator knows about a derivation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    pub drv_path: StorePath,
    pub name: Option<String>,
}

/// Syntactic shape of a function: its parameter and, when the body is
/// itself a function literal, that nested function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lambda {
    pub param: Param,
    pub body: Option<Box<Lambda>>,
}

impl Lambda {
    pub fn new(param: Param) -> Self {
        Lambda { param, body: None }
    }

    /// `x: ...`
    pub fn ident(name: impl Into<String>) -> Self {
        Lambda::new(Param::Ident(name.into()))
    }

    /// `{ a, b, ... }: ...`
    pub fn formals<I, S>(names: I, ellipsis: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Lambda::new(Param::Formals(Formals {
            names: names.into_iter().map(Into::into).collect(),
            ellipsis,
            bind: None,
        }))
    }

    /// Set the function literal this function returns
    pub fn returning(mut self, body: Lambda) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    /// Parameter name when the parameter is a plain identifier
    pub fn ident_name(&self) -> Option<&str> {
        match &self.param {
            Param::Ident(name) => Some(name),
            Param::Formals(_) => None,
        }
    }

    /// Whether the parameter is a destructuring pattern accepting extra fields
    pub fn is_open_pattern(&self) -> bool {
        matches!(&self.param, Param::Formals(formals) if formals.ellipsis)
    }
}

/// Function parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    Ident(String),
    Formals(Formals),
}

/// Destructuring pattern `{ a, b ? x, ... } @ bind`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Formals {
    pub names: Vec<String>,
    pub ellipsis: bool,
    pub bind: Option<String>,
}
