//! Build targets discovered during a check pass

use crate::store::StorePath;
use std::collections::BTreeSet;

/// De-duplicated, deterministically ordered set of targets to build
#[derive(Debug, Default, Clone)]
pub struct BuildTargetCollector {
    targets: BTreeSet<StorePath>,
}

impl BuildTargetCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a target. Returns `false` if it was already present.
    pub fn insert(&mut self, target: StorePath) -> bool {
        self.targets.insert(target)
    }

    pub fn contains(&self, target: &StorePath) -> bool {
        self.targets.contains(target)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &StorePath> {
        self.targets.iter()
    }

    pub fn into_vec(self) -> Vec<StorePath> {
        self.targets.into_iter().collect()
    }
}
