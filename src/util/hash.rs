//! SHA-256 digests for content fingerprints.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Digest of a file's contents, or None when the file does not exist.
pub fn file_digest(path: &Path) -> Result<Option<String>> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("failed to open {} for hashing", path.display()))
        }
    };

    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(Some(hex::encode(hasher.finalize())))
}

/// Digest over an ordered list of command lines.
///
/// Each line is terminated with a NUL byte so that splitting the same text
/// differently across lines changes the digest.
#[derive(Default)]
pub struct CommandDigest {
    hasher: Sha256,
}

impl CommandDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line: &str) -> &mut Self {
        self.hasher.update(line.as_bytes());
        self.hasher.update([0u8]);
        self
    }

    /// The first 16 hex digits of the digest.
    pub fn finish(self) -> String {
        let mut hex = hex::encode(self.hasher.finalize());
        hex.truncate(16);
        hex
    }
}
