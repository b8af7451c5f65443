//! Implementation of `lazymake depfile`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::depfile::parser;
use crate::depfile::store::DepStore;
use crate::util::fs::read_to_string;

/// Parse one raw compiler dependency artifact. When `output` is given the
/// result is written there as a dependency record.
pub fn postprocess_depfile(
    cwd: &Path,
    raw: &Path,
    source: Option<&str>,
    output: Option<&Path>,
) -> Result<Vec<String>> {
    let raw = cwd.join(raw);
    let text = read_to_string(&raw)?;
    let prereqs = parser::parse(&text, source).with_context(|| format!("{}", raw.display()))?;

    if let Some(output) = output {
        let record = output.to_string_lossy();
        DepStore::new(cwd)
            .write(&record, &prereqs)
            .with_context(|| format!("failed to write {}", output.display()))?;
        tracing::debug!("wrote {} prerequisite(s) to {}", prereqs.len(), output.display());
    }

    Ok(prereqs)
}
