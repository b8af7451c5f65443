//! Content fingerprints for `Freshness::Content`.
//!
//! A fingerprint captures the expanded command and the content hash of
//! every prerequisite file of a target as of its last successful build.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::util::hash::{file_digest, CommandDigest};

/// Fingerprint of one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionFingerprint {
    /// Expanded command hash
    pub command_hash: String,

    /// Prerequisite hashes (missing files are left out)
    pub input_hashes: BTreeMap<String, String>,
}

impl ActionFingerprint {
    /// Compute the fingerprint of a target's commands and prerequisites.
    pub fn compute(root: &Path, commands: &[String], prereqs: &[String]) -> Result<Self> {
        let mut digest = CommandDigest::new();
        for command in commands {
            digest.push(command);
        }
        let command_hash = digest.finish();

        let mut input_hashes = BTreeMap::new();
        for prereq in prereqs {
            if let Some(hash) = file_digest(&root.join(prereq))? {
                input_hashes.insert(prereq.clone(), hash);
            }
        }

        Ok(ActionFingerprint {
            command_hash,
            input_hashes,
        })
    }

    /// Check if the fingerprint matches (nothing has changed).
    pub fn matches(&self, other: &ActionFingerprint) -> bool {
        self.command_hash == other.command_hash && self.input_hashes == other.input_hashes
    }
}

/// Fingerprints of all targets built under a root.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FingerprintCache {
    pub targets: BTreeMap<String, ActionFingerprint>,
}

impl FingerprintCache {
    /// Load fingerprint cache from a file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(FingerprintCache::default());
        }

        let content = std::fs::read_to_string(path)?;
        let cache: FingerprintCache = serde_json::from_str(&content)?;
        Ok(cache)
    }

    /// Load, discarding an unreadable cache.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("discarding fingerprint cache {}: {}", path.display(), e);
            FingerprintCache::default()
        })
    }

    /// Save fingerprint cache to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        crate::util::fs::write_string(path, &content)
    }

    pub fn get(&self, target: &str) -> Option<&ActionFingerprint> {
        self.targets.get(target)
    }

    /// Update a target's fingerprint.
    pub fn update(&mut self, target: String, fingerprint: ActionFingerprint) {
        self.targets.insert(target, fingerprint);
    }

    /// Forget a target, e.g. after a failed build.
    pub fn forget(&mut self, target: &str) {
        self.targets.remove(target);
    }
}
