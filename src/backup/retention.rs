//! Single-copy retention: remove earlier artifacts of a device before a new run.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use super::artifact::{ArtifactKind, ArtifactName};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub date: NaiveDate,
    pub size_bytes: u64,
}

/// Artifacts of `device_id` directly inside `dir`, oldest first.
///
/// Directories and symlinks are skipped even if their names match.
pub fn list_artifacts(dir: &Path, device_id: &str) -> Result<Vec<ArtifactEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some((artifact, kind)) = ArtifactName::matches(name, device_id) else {
            continue;
        };
        entries.push(ArtifactEntry {
            path: entry.path(),
            kind,
            date: artifact.date,
            size_bytes: entry.metadata()?.len(),
        });
    }
    entries.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.path.cmp(&b.path)));
    Ok(entries)
}

/// Delete every final artifact of `device_id` in `dir`, plus stale temp files
/// left by runs that could not clean up after themselves. Returns what was
/// removed; an empty directory is not an error.
pub fn remove_previous(dir: &Path, device_id: &str) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for entry in list_artifacts(dir, device_id)? {
        match fs::remove_file(&entry.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(Error::Io(err).into()),
        }
        match entry.kind {
            ArtifactKind::Final => {
                info!(artifact = %entry.path.display(), "removed previous backup")
            }
            ArtifactKind::Temp => {
                warn!(temp = %entry.path.display(), "removed stale temporary artifact from an earlier run")
            }
        }
        removed.push(entry.path);
    }
    Ok(removed)
}
