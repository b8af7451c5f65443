//! Staleness modes and reasons.

use std::fmt;
use std::str::FromStr;

/// How a file target is compared against its prerequisites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Freshness {
    /// A prerequisite newer than the target makes it stale.
    #[default]
    Mtime,
    /// Stale when the recorded content fingerprint of the prerequisites or
    /// the expanded command changed. Falls back to `Mtime` for targets
    /// without a recorded fingerprint.
    Content,
}

impl FromStr for Freshness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mtime" => Ok(Freshness::Mtime),
            "content" | "hash" => Ok(Freshness::Content),
            other => Err(format!(
                "unknown freshness mode `{other}` (expected `mtime` or `content`)"
            )),
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Freshness::Mtime => write!(f, "mtime"),
            Freshness::Content => write!(f, "content"),
        }
    }
}

/// Why a target has to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    Phony,
    Missing,
    PrereqRebuilt(String),
    PrereqNewer(String),
    PrereqVanished(String),
    RecordUnavailable(String),
    FingerprintChanged,
}

impl fmt::Display for StaleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleReason::Phony => write!(f, "phony target"),
            StaleReason::Missing => write!(f, "target does not exist"),
            StaleReason::PrereqRebuilt(p) => write!(f, "prerequisite `{p}` is being rebuilt"),
            StaleReason::PrereqNewer(p) => write!(f, "prerequisite `{p}` is newer"),
            StaleReason::PrereqVanished(p) => write!(f, "prerequisite `{p}` no longer exists"),
            StaleReason::RecordUnavailable(why) => write!(f, "dependency record unusable: {why}"),
            StaleReason::FingerprintChanged => write!(f, "inputs or command changed"),
        }
    }
}
