//! Summary of a flake's outputs, as printed by `info --json`

use crate::validators::{force_attrs, CheckResult};
use crate::value::{AttrPath, OutputNode};
use serde_json::{Map, Value as Json};

/// Describe the top-level outputs.
///
/// `checks` and `packages` list their immediate attribute names; every other
/// output maps to an empty object and is left unforced.
pub fn describe_outputs<N: OutputNode>(outputs: &N) -> CheckResult<Json> {
    let outputs = force_attrs(outputs, &AttrPath::default())?;

    let mut described = Map::new();
    for output in outputs.iter() {
        let mut entry = Map::new();
        if output.name == "checks" || output.name == "packages" {
            let children = force_attrs(output.value, &AttrPath::root(output.name))?;
            for name in children.names() {
                entry.insert(name.to_string(), Json::Object(Map::new()));
            }
        }
        described.insert(output.name.to_string(), Json::Object(entry));
    }
    Ok(Json::Object(described))
}
