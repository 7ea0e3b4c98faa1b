//! In-memory output tree loaded from a JSON dump of an evaluator.
//!
//! Plain JSON maps onto Nix values directly (objects become attribute sets,
//! arrays become lists). Values JSON cannot express are written as objects
//! tagged with a reserved `"__kind"` key:
//!
//! ```json
//! {
//!   "packages": {
//!     "x86_64-linux": {
//!       "hello": {
//!         "__kind": "derivation",
//!         "drvPath": "/nix/store/0c0s7d7ykxfdrifm2ahl6jdxjh9ak8bs-hello.drv",
//!         "pos": "/src/flake.nix:12:7"
//!       }
//!     }
//!   },
//!   "overlay": {
//!     "__kind": "lambda",
//!     "param": "final",
//!     "body": { "param": "prev" }
//!   }
//! }
//! ```
//!
//! Every node counts how often it was forced.

use crate::error::{EvalError, ManifestError};
use crate::store::StorePath;
use crate::value::{Attr, AttrPath, AttrSet, Derivation, Formals, Lambda, OutputNode, Param, SourcePos, StringValue, Value};
use serde_json::{Map, Value as Json};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

const KIND_KEY: &str = "__kind";

#[derive(Debug)]
struct Entry {
    name: String,
    pos: SourcePos,
    node: ManifestNode,
}

#[derive(Debug)]
enum NodeKind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(StringValue),
    Path(String),
    List(Vec<ManifestNode>),
    Attrs {
        entries: Vec<Entry>,
        derivation: Option<Derivation>,
    },
    Lambda(Lambda),
    /// Forcing fails with this message
    Throw(String),
}

/// Lazily forced node of an in-memory output tree
#[derive(Debug)]
pub struct ManifestNode {
    kind: NodeKind,
    forced: AtomicUsize,
}

impl ManifestNode {
    fn new(kind: NodeKind) -> Self {
        ManifestNode {
            kind,
            forced: AtomicUsize::new(0),
        }
    }

    pub fn null() -> Self {
        Self::new(NodeKind::Null)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(NodeKind::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::new(NodeKind::Int(value))
    }

    pub fn float(value: f64) -> Self {
        Self::new(NodeKind::Float(value))
    }

    pub fn string(value: &str) -> Self {
        Self::new(NodeKind::String(StringValue::plain(value)))
    }

    pub fn string_with_context(value: &str, context: Vec<String>) -> Self {
        Self::new(NodeKind::String(StringValue {
            value: value.to_string(),
            context,
        }))
    }

    pub fn path(value: &str) -> Self {
        Self::new(NodeKind::Path(value.to_string()))
    }

    pub fn list(items: Vec<ManifestNode>) -> Self {
        Self::new(NodeKind::List(items))
    }

    /// Attribute set in the given order, without positions
    pub fn attrs<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, ManifestNode)>,
        S: Into<String>,
    {
        Self::attrs_at(
            entries
                .into_iter()
                .map(|(name, node)| (name, SourcePos::unknown(), node)),
        )
    }

    /// Attribute set with a binding position per attribute
    pub fn attrs_at<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, SourcePos, ManifestNode)>,
        S: Into<String>,
    {
        Self::new(NodeKind::Attrs {
            entries: collect_entries(entries),
            derivation: None,
        })
    }

    /// Derivation with the usual `type`, `drvPath` and `name` attributes
    pub fn derivation(drv_path: StorePath) -> Self {
        let name = drv_path.name().trim_end_matches(".drv").to_string();
        Self::derivation_with(drv_path, Some(name), Vec::<(String, ManifestNode)>::new())
    }

    /// Derivation with extra attributes
    pub fn derivation_with<I, S>(drv_path: StorePath, name: Option<String>, extra: I) -> Self
    where
        I: IntoIterator<Item = (S, ManifestNode)>,
        S: Into<String>,
    {
        let mut entries: Vec<Entry> = collect_entries(
            extra
                .into_iter()
                .map(|(name, node)| (name, SourcePos::unknown(), node)),
        );
        let mut ensure = |key: &str, node: ManifestNode| {
            if !entries.iter().any(|e| e.name == key) {
                entries.push(Entry {
                    name: key.to_string(),
                    pos: SourcePos::unknown(),
                    node,
                });
            }
        };
        ensure("type", ManifestNode::string("derivation"));
        ensure(
            "drvPath",
            ManifestNode::string_with_context(drv_path.as_str(), vec![format!("={}", drv_path)]),
        );
        if let Some(name) = &name {
            ensure("name", ManifestNode::string(name));
        }

        Self::new(NodeKind::Attrs {
            entries,
            derivation: Some(Derivation { drv_path, name }),
        })
    }

    pub fn lambda(lambda: Lambda) -> Self {
        Self::new(NodeKind::Lambda(lambda))
    }

    /// Node whose evaluation fails
    pub fn throw(message: &str) -> Self {
        Self::new(NodeKind::Throw(message.to_string()))
    }

    /// How often this node was forced
    pub fn force_count(&self) -> usize {
        self.forced.load(Ordering::Relaxed)
    }

    /// Forces of this node and everything below it
    pub fn total_force_count(&self) -> usize {
        let below: usize = match &self.kind {
            NodeKind::List(items) => items.iter().map(ManifestNode::total_force_count).sum(),
            NodeKind::Attrs { entries, .. } => entries.iter().map(|e| e.node.total_force_count()).sum(),
            _ => 0,
        };
        self.force_count() + below
    }

    /// Child attribute, without forcing anything
    pub fn get(&self, name: &str) -> Option<&ManifestNode> {
        match &self.kind {
            NodeKind::Attrs { entries, .. } => {
                entries.iter().find(|e| e.name == name).map(|e| &e.node)
            }
            _ => None,
        }
    }

    /// Read a JSON output tree from disk
    pub fn load(path: impl AsRef<Path>, store_dir: &str) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "loading output manifest");
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content, store_dir)
    }

    pub fn from_json_str(content: &str, store_dir: &str) -> Result<Self, ManifestError> {
        let json: Json = serde_json::from_str(content)?;
        Self::from_json(&json, store_dir)
    }

    /// Build a tree from parsed JSON. Derivation paths are validated
    /// against `store_dir`.
    pub fn from_json(json: &Json, store_dir: &str) -> Result<Self, ManifestError> {
        let loader = Loader { store_dir };
        loader.node(json, &AttrPath::default()).map(|(node, _)| node)
    }
}

impl OutputNode for ManifestNode {
    fn force(&self) -> Result<Value<'_, Self>, EvalError> {
        self.forced.fetch_add(1, Ordering::Relaxed);
        let value = match &self.kind {
            NodeKind::Null => Value::Null,
            NodeKind::Bool(b) => Value::Bool(*b),
            NodeKind::Int(i) => Value::Int(*i),
            NodeKind::Float(f) => Value::Float(*f),
            NodeKind::String(s) => Value::String(s.clone()),
            NodeKind::Path(p) => Value::Path(p.clone()),
            NodeKind::List(items) => Value::List(items.iter().collect()),
            NodeKind::Attrs {
                entries,
                derivation,
            } => {
                let attrs = entries
                    .iter()
                    .map(|e| Attr {
                        name: e.name.as_str(),
                        value: &e.node,
                        pos: e.pos.clone(),
                    })
                    .collect();
                match derivation {
                    Some(drv) => Value::Attrs(AttrSet::derivation(attrs, drv.clone())),
                    None => Value::Attrs(AttrSet::new(attrs)),
                }
            }
            NodeKind::Lambda(lambda) => Value::Lambda(lambda.clone()),
            NodeKind::Throw(message) => return Err(EvalError::new(message.clone())),
        };
        Ok(value)
    }
}

fn collect_entries<I, S>(entries: I) -> Vec<Entry>
where
    I: IntoIterator<Item = (S, SourcePos, ManifestNode)>,
    S: Into<String>,
{
    entries
        .into_iter()
        .map(|(name, pos, node)| Entry {
            name: name.into(),
            pos,
            node,
        })
        .collect()
}

fn location(path: &AttrPath) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.to_string()
    }
}

struct Loader<'a> {
    store_dir: &'a str,
}

impl Loader<'_> {
    /// Node plus the binding position it declares, if any
    fn node(&self, json: &Json, path: &AttrPath) -> Result<(ManifestNode, SourcePos), ManifestError> {
        let node = match json {
            Json::Null => ManifestNode::null(),
            Json::Bool(b) => ManifestNode::bool(*b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => ManifestNode::int(i),
                None => ManifestNode::float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(s) => ManifestNode::string(s),
            Json::Array(items) => {
                let items = items
                    .iter()
                    .enumerate()
                    .map(|(i, item)| self.node(item, &path.child(&i.to_string())).map(|(n, _)| n))
                    .collect::<Result<Vec<_>, _>>()?;
                ManifestNode::list(items)
            }
            Json::Object(obj) => match obj.get(KIND_KEY) {
                None => ManifestNode::new(NodeKind::Attrs {
                    entries: self.entries(obj, path)?,
                    derivation: None,
                }),
                Some(kind) => return self.tagged(kind, obj, path),
            },
        };
        Ok((node, SourcePos::unknown()))
    }

    fn entries(&self, obj: &Map<String, Json>, path: &AttrPath) -> Result<Vec<Entry>, ManifestError> {
        obj.iter()
            .map(|(name, value)| {
                let (node, pos) = self.node(value, &path.child(name))?;
                Ok(Entry {
                    name: name.clone(),
                    pos,
                    node,
                })
            })
            .collect()
    }

    fn tagged(
        &self,
        kind: &Json,
        obj: &Map<String, Json>,
        path: &AttrPath,
    ) -> Result<(ManifestNode, SourcePos), ManifestError> {
        let pos = match obj.get("pos") {
            Some(pos) => {
                let raw = pos.as_str().ok_or_else(|| invalid("pos", path, "expected a string"))?;
                SourcePos::parse(raw).ok_or_else(|| ManifestError::InvalidPosition(raw.to_string()))?
            }
            None => SourcePos::unknown(),
        };

        let node = match kind.as_str().unwrap_or_default() {
            "attrs" => ManifestNode::new(NodeKind::Attrs {
                entries: self.nested_attrs(obj, path)?,
                derivation: None,
            }),
            "derivation" => self.derivation(obj, path)?,
            "lambda" => ManifestNode::lambda(lambda(obj, path)?),
            "string" => {
                let value = required_str(obj, "string", "value", path)?;
                let context = match obj.get("context") {
                    Some(Json::Array(items)) => items
                        .iter()
                        .map(|item| {
                            item.as_str()
                                .map(str::to_string)
                                .ok_or_else(|| invalid("context", path, "expected strings"))
                        })
                        .collect::<Result<Vec<_>, _>>()?,
                    Some(_) => return Err(invalid("context", path, "expected an array")),
                    None => Vec::new(),
                };
                ManifestNode::string_with_context(value, context)
            }
            "path" => ManifestNode::path(required_str(obj, "path", "value", path)?),
            "throw" => ManifestNode::throw(required_str(obj, "throw", "message", path)?),
            other => {
                return Err(ManifestError::UnknownKind {
                    kind: if other.is_empty() { kind.to_string() } else { other.to_string() },
                    path: location(path),
                })
            }
        };
        Ok((node, pos))
    }

    fn nested_attrs(&self, obj: &Map<String, Json>, path: &AttrPath) -> Result<Vec<Entry>, ManifestError> {
        match obj.get("attrs") {
            Some(Json::Object(attrs)) => self.entries(attrs, path),
            Some(_) => Err(invalid("attrs", path, "expected an object")),
            None => Ok(Vec::new()),
        }
    }

    fn derivation(&self, obj: &Map<String, Json>, path: &AttrPath) -> Result<ManifestNode, ManifestError> {
        let raw = required_str(obj, "derivation", "drvPath", path)?;
        let drv_path = StorePath::parse(raw, self.store_dir).map_err(|source| ManifestError::StorePath {
            path: location(path),
            source,
        })?;
        let name = match obj.get("name") {
            Some(name) => Some(
                name.as_str()
                    .ok_or_else(|| invalid("name", path, "expected a string"))?
                    .to_string(),
            ),
            None => None,
        };

        let extra = self
            .nested_attrs(obj, path)?
            .into_iter()
            .map(|e| (e.name, e.node));
        Ok(ManifestNode::derivation_with(drv_path, name, extra))
    }
}

fn lambda(obj: &Map<String, Json>, path: &AttrPath) -> Result<Lambda, ManifestError> {
    let param = match (obj.get("param"), obj.get("formals")) {
        (Some(Json::String(name)), None) => Param::Ident(name.clone()),
        (None, Some(formals)) => Param::Formals(
            serde_json::from_value::<Formals>(formals.clone())
                .map_err(|err| invalid("formals", path, &err.to_string()))?,
        ),
        (Some(_), Some(_)) => return Err(invalid("param", path, "'param' and 'formals' are exclusive")),
        (Some(_), None) => return Err(invalid("param", path, "expected a string")),
        (None, None) => {
            return Err(ManifestError::MissingField {
                kind: "lambda",
                field: "param",
                path: location(path),
            })
        }
    };

    let mut result = Lambda::new(param);
    match obj.get("body") {
        Some(Json::Object(body)) => result = result.returning(lambda(body, path)?),
        Some(Json::Null) | None => {}
        Some(_) => return Err(invalid("body", path, "expected a lambda object")),
    }
    Ok(result)
}

fn required_str<'j>(
    obj: &'j Map<String, Json>,
    kind: &'static str,
    field: &'static str,
    path: &AttrPath,
) -> Result<&'j str, ManifestError> {
    obj.get(field)
        .ok_or_else(|| ManifestError::MissingField {
            kind,
            field,
            path: location(path),
        })?
        .as_str()
        .ok_or_else(|| invalid(field, path, "expected a string"))
}

fn invalid(field: &'static str, path: &AttrPath, reason: &str) -> ManifestError {
    ManifestError::InvalidField {
        field,
        path: location(path),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::fake_drv_path;
    use crate::store::DEFAULT_STORE_DIR;
    use serde_json::json;

    fn load(json: Json) -> ManifestNode {
        ManifestNode::from_json(&json, DEFAULT_STORE_DIR).expect("load failed")
    }

    #[test]
    fn test_force_counts() {
        let node = ManifestNode::attrs([("a", ManifestNode::int(1)), ("b", ManifestNode::int(2))]);
        assert_eq!(node.total_force_count(), 0);

        let Value::Attrs(attrs) = node.force().unwrap() else {
            panic!("expected a set");
        };
        attrs.get("a").unwrap().value.force().unwrap();

        assert_eq!(node.force_count(), 1);
        assert_eq!(node.get("a").unwrap().force_count(), 1);
        assert_eq!(node.get("b").unwrap().force_count(), 0);
        assert_eq!(node.total_force_count(), 2);
    }

    #[test]
    fn test_throw_fails_on_force() {
        let node = ManifestNode::throw("boom");
        assert_eq!(node.force().unwrap_err().message, "boom");
        assert_eq!(node.force_count(), 1);
    }

    #[test]
    fn test_derivation_attributes() {
        let drv = fake_drv_path("hello");
        let node = ManifestNode::derivation(drv.clone());
        let Value::Attrs(attrs) = node.force().unwrap() else {
            panic!("expected a set");
        };

        assert_eq!(attrs.derivation_info().unwrap().drv_path, drv);
        assert_eq!(attrs.derivation_info().unwrap().name.as_deref(), Some("hello"));
        let names: Vec<_> = attrs.names().collect();
        assert_eq!(names, vec!["type", "drvPath", "name"]);
    }

    #[test]
    fn test_plain_json_maps_to_values() {
        let node = load(json!({
            "n": null,
            "flag": true,
            "count": 3,
            "ratio": 0.5,
            "text": "hi",
            "items": [1, "two"],
        }));

        assert!(matches!(node.get("n").unwrap().force().unwrap(), Value::Null));
        assert!(matches!(node.get("flag").unwrap().force().unwrap(), Value::Bool(true)));
        assert!(matches!(node.get("count").unwrap().force().unwrap(), Value::Int(3)));
        assert!(matches!(node.get("ratio").unwrap().force().unwrap(), Value::Float(_)));
        match node.get("items").unwrap().force().unwrap() {
            Value::List(items) => assert_eq!(items.len(), 2),
            other => panic!("unexpected {}", other.type_name()),
        }
    }

    #[test]
    fn test_tagged_lambda() {
        let node = load(json!({
            "__kind": "lambda",
            "param": "final",
            "body": { "param": "prev" }
        }));
        match node.force().unwrap() {
            Value::Lambda(lambda) => {
                assert_eq!(lambda, Lambda::ident("final").returning(Lambda::ident("prev")));
            }
            other => panic!("unexpected {}", other.type_name()),
        }

        let module = load(json!({
            "__kind": "lambda",
            "formals": { "names": ["config"], "ellipsis": true }
        }));
        match module.force().unwrap() {
            Value::Lambda(lambda) => assert!(lambda.is_open_pattern()),
            other => panic!("unexpected {}", other.type_name()),
        }
    }

    #[test]
    fn test_positions_attach_to_bindings() {
        let node = load(json!({
            "overlay": { "__kind": "lambda", "param": "final", "pos": "/src/flake.nix:4:5" }
        }));
        let Value::Attrs(attrs) = node.force().unwrap() else {
            panic!("expected a set");
        };
        assert_eq!(attrs.get("overlay").unwrap().pos, SourcePos::new("/src/flake.nix", 4, 5));
    }

    #[test]
    fn test_lambda_requires_param() {
        let err = ManifestNode::from_json(&json!({ "m": { "__kind": "lambda" } }), DEFAULT_STORE_DIR)
            .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::MissingField { kind: "lambda", field: "param", .. }
        ));
        assert_eq!(err.to_string(), "missing field 'param' in lambda node at 'm'");
    }
}
