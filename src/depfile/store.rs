//! Dependency record storage.
//!
//! One record per compiled source: a single newline-terminated line of
//! space-separated prerequisite paths. An empty prerequisite list is stored
//! as a lone `\n`, so a zero-byte file is always a truncated write.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::depfile::parser::{self, DepParseError};

/// Extension of the raw, compiler-written artifact next to a record.
pub const RAW_EXTENSION: &str = "Td";

/// Error reading a record.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no dependency record at {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read dependency record {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed dependency record {}: {reason}", .path.display())]
    Malformed { path: PathBuf, reason: String },
}

/// Error turning a raw artifact into a record.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("no raw dependency artifact at {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read raw dependency artifact {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: DepParseError,
    },

    #[error("failed to write dependency record {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// What a write did on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
}

/// Record store rooted at the build directory.
///
/// Record paths are relative to `root` unless absolute.
#[derive(Debug, Clone)]
pub struct DepStore {
    root: PathBuf,
}

impl DepStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DepStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a record.
    pub fn resolve(&self, record: &str) -> PathBuf {
        self.root.join(record)
    }

    /// Where the compiler is told to write the raw artifact for a record.
    pub fn raw_path_for(record: &str) -> String {
        let path = Path::new(record);
        path.with_extension(RAW_EXTENSION)
            .to_string_lossy()
            .into_owned()
    }

    /// Read a record.
    pub fn read(&self, record: &str) -> Result<Vec<String>, StoreError> {
        let path = self.resolve(record);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path))
            }
            Err(source) => return Err(StoreError::Unreadable { path, source }),
        };

        let text = String::from_utf8(bytes).map_err(|_| StoreError::Malformed {
            path: path.clone(),
            reason: "not valid UTF-8".to_string(),
        })?;

        let Some(line) = text.strip_suffix('\n') else {
            return Err(StoreError::Malformed {
                path,
                reason: if text.is_empty() {
                    "empty file".to_string()
                } else {
                    "missing trailing newline".to_string()
                },
            });
        };
        if line.contains('\n') {
            return Err(StoreError::Malformed {
                path,
                reason: "more than one line".to_string(),
            });
        }

        Ok(parser::split_line(line))
    }

    /// Write a record, leaving the file untouched if the content is the same.
    pub fn write(&self, record: &str, prereqs: &[String]) -> io::Result<WriteOutcome> {
        let path = self.resolve(record);
        let content = parser::render(prereqs);

        if let Ok(existing) = fs::read(&path) {
            if existing == content.as_bytes() {
                tracing::trace!("dependency record {} unchanged", path.display());
                return Ok(WriteOutcome::Unchanged);
            }
        }

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(content.as_bytes())?;
        tmp.persist(&path).map_err(|e| e.error)?;

        tracing::debug!(
            "wrote dependency record {} ({} prerequisite(s))",
            path.display(),
            prereqs.len()
        );
        Ok(WriteOutcome::Written)
    }

    /// Delete a record. Returns whether a file was removed.
    pub fn discard(&self, record: &str) -> bool {
        let path = self.resolve(record);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("removed dependency record {}", path.display());
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                tracing::debug!("could not remove {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Parse the raw artifact for `record`, store the result and delete the
    /// raw file.
    ///
    /// On any failure the existing record is discarded as well, so its owner
    /// is rebuilt on the next run instead of trusting an outdated list.
    pub fn ingest_raw(
        &self,
        record: &str,
        primary_source: Option<&str>,
    ) -> Result<Vec<String>, IngestError> {
        let result = self.ingest_raw_inner(record, primary_source);
        if result.is_err() {
            self.discard(record);
        }
        result
    }

    fn ingest_raw_inner(
        &self,
        record: &str,
        primary_source: Option<&str>,
    ) -> Result<Vec<String>, IngestError> {
        let raw = self.resolve(&Self::raw_path_for(record));
        let text = match fs::read_to_string(&raw) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(IngestError::Missing(raw)),
            Err(source) => return Err(IngestError::Unreadable { path: raw, source }),
        };

        let result = parser::parse(&text, primary_source);
        // The raw artifact is transient whether or not it parsed.
        if let Err(e) = fs::remove_file(&raw) {
            tracing::debug!("could not remove {}: {}", raw.display(), e);
        }
        let prereqs = result.map_err(|source| IngestError::Parse { path: raw, source })?;

        self.write(record, &prereqs)
            .map_err(|source| IngestError::Write {
                path: self.resolve(record),
                source,
            })?;

        Ok(prereqs)
    }
}
