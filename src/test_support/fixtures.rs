//! A scratch build directory with controllable modification times.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use crate::core::graph::TargetGraph;
use crate::core::rulefile;
use crate::depfile::store::DepStore;

/// Temporary build root.
pub struct BuildFixture {
    dir: TempDir,
}

impl BuildFixture {
    pub fn new() -> Self {
        BuildFixture {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Write a file dated well in the past, so anything built later is
    /// newer than it.
    pub fn source(&self, name: &str, content: &str) -> &Self {
        self.write(name, content);
        self.age(name, 1000);
        self
    }

    /// Write a file with the current time.
    pub fn write(&self, name: &str, content: &str) -> &Self {
        let path = self.path(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
        self
    }

    /// Date a file `secs` seconds in the past.
    pub fn age(&self, name: &str, secs: u64) -> &Self {
        self.set_mtime(name, SystemTime::now() - Duration::from_secs(secs));
        self
    }

    /// Date a file in the future, newer than anything a build writes.
    pub fn touch_future(&self, name: &str) -> &Self {
        self.set_mtime(name, SystemTime::now() + Duration::from_secs(1000));
        self
    }

    fn set_mtime(&self, name: &str, time: SystemTime) {
        fs::File::options()
            .write(true)
            .open(self.path(name))
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).unwrap()
    }

    pub fn store(&self) -> DepStore {
        DepStore::new(self.root())
    }

    /// Parse Rulefile text.
    pub fn graph(&self, text: &str) -> TargetGraph {
        rulefile::parse("Rulefile", text).unwrap()
    }
}

impl Default for BuildFixture {
    fn default() -> Self {
        Self::new()
    }
}
