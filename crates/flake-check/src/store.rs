//! Store paths and string-context decoding

use crate::error::StorePathError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default location of the Nix store
pub const DEFAULT_STORE_DIR: &str = "/nix/store";

const HASH_LEN: usize = 32;
const BASE32_CHARS: &str = "0123456789abcdfghijklmnpqrsvwxyz";

/// Absolute path of a store object, `<store dir>/<hash>-<name>`
///
/// Deserialising checks the `<hash>-<name>` shape but not the store
/// directory, which is only known to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StorePath(String);

impl StorePath {
    /// Parse and validate a path under `store_dir`
    pub fn parse(path: &str, store_dir: &str) -> Result<Self, StorePathError> {
        let store_dir = store_dir.trim_end_matches('/');
        let base = path
            .strip_prefix(store_dir)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StorePathError::NotInStore {
                path: path.to_string(),
                store_dir: store_dir.to_string(),
            })?;

        if base.contains('/') || !is_valid_base_name(base) {
            return Err(StorePathError::Invalid(path.to_string()));
        }

        Ok(StorePath(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<hash>-<name>`
    pub fn base_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    pub fn hash_part(&self) -> &str {
        &self.base_name()[..HASH_LEN]
    }

    pub fn name(&self) -> &str {
        &self.base_name()[HASH_LEN + 1..]
    }

    /// Whether this is a store derivation (`.drv`)
    pub fn is_derivation(&self) -> bool {
        self.0.ends_with(".drv")
    }
}

impl TryFrom<String> for StorePath {
    type Error = StorePathError;

    fn try_from(path: String) -> Result<Self, Self::Error> {
        let valid = path.starts_with('/')
            && path
                .rsplit_once('/')
                .map(|(dir, base)| !dir.is_empty() && is_valid_base_name(base))
                .unwrap_or(false);
        if valid {
            Ok(StorePath(path))
        } else {
            Err(StorePathError::Invalid(path))
        }
    }
}

impl From<StorePath> for String {
    fn from(path: StorePath) -> Self {
        path.0
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_valid_base_name(base: &str) -> bool {
    if base.len() < HASH_LEN + 2 || !base.is_char_boundary(HASH_LEN) {
        return false;
    }
    let (hash, rest) = base.split_at(HASH_LEN);
    hash.chars().all(|c| BASE32_CHARS.contains(c))
        && rest.starts_with('-')
        && rest[1..]
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "+-._?=".contains(c))
}

/// Whether `path` lies inside `store_dir`
pub fn is_in_store(path: &str, store_dir: &str) -> bool {
    let store_dir = store_dir.trim_end_matches('/');
    path.strip_prefix(store_dir)
        .map(|rest| rest.len() > 1 && rest.starts_with('/'))
        .unwrap_or(false)
}

/// Split a string-context element into `(path, output name)`.
///
/// `!out!/nix/store/...drv` refers to output `out` of a derivation; any
/// other element is a plain path with an empty output name.
pub fn decode_context(element: &str) -> (&str, &str) {
    if let Some(rest) = element.strip_prefix('!') {
        if let Some((output, path)) = rest.split_once('!') {
            return (path, output);
        }
    }
    (element, "")
}
