//! In-memory fakes for the build seam (testing only)
//!
//! `RecordingTrigger` records every batch it is asked to build and fails a
//! configurable set of targets. `fake_store_path` and `fake_drv_path` make
//! well-formed store paths from a name.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::BuildError;
use crate::store::{StorePath, DEFAULT_STORE_DIR};
use crate::trigger::{BuildReport, BuildTrigger, TargetOutcome};

const BASE32_CHARS: &[u8] = b"0123456789abcdfghijklmnpqrsvwxyz";

/// Build trigger that only records what it was asked to build
#[derive(Debug, Default)]
pub struct RecordingTrigger {
    batches: Mutex<Vec<Vec<StorePath>>>,
    failing: BTreeSet<StorePath>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger that reports the given targets as failed
    pub fn failing<I>(targets: I) -> Self
    where
        I: IntoIterator<Item = StorePath>,
    {
        RecordingTrigger {
            batches: Mutex::new(Vec::new()),
            failing: targets.into_iter().collect(),
        }
    }

    /// Every batch submitted so far, in order
    pub fn batches(&self) -> Vec<Vec<StorePath>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

#[async_trait]
impl BuildTrigger for RecordingTrigger {
    async fn build(&self, targets: &[StorePath]) -> Result<BuildReport, BuildError> {
        self.batches.lock().unwrap().push(targets.to_vec());

        let outcomes = targets
            .iter()
            .map(|target| {
                if self.failing.contains(target) {
                    TargetOutcome::failed(target.clone(), format!("builder for '{}' failed", target))
                } else {
                    TargetOutcome::built(target.clone())
                }
            })
            .collect();
        Ok(BuildReport {
            outcomes,
            duration_ms: 0,
        })
    }
}

/// Output path `/nix/store/<hash>-<name>` with a hash derived from `name`
pub fn fake_store_path(name: &str) -> StorePath {
    make_path(name, "")
}

/// Derivation path `/nix/store/<hash>-<name>.drv`
pub fn fake_drv_path(name: &str) -> StorePath {
    make_path(name, ".drv")
}

fn make_path(name: &str, suffix: &str) -> StorePath {
    let path = format!(
        "{}/{}-{}{}",
        DEFAULT_STORE_DIR,
        fake_hash(&format!("{}{}", name, suffix)),
        name,
        suffix
    );
    StorePath::parse(&path, DEFAULT_STORE_DIR).unwrap()
}

// FNV-1a, stretched over 32 base32 characters
fn fake_hash(seed: &str) -> String {
    let mut state: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in seed.bytes() {
        state ^= u64::from(byte);
        state = state.wrapping_mul(0x0100_0000_01b3);
    }
    (0..32)
        .map(|_| {
            state ^= state >> 29;
            state = state.wrapping_mul(0x0100_0000_01b3);
            BASE32_CHARS[(state >> 59) as usize] as char
        })
        .collect()
}
