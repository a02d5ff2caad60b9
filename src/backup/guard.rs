use std::{
    fs::{self, File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::{Error, Result};

/// Owns the in-progress `.tmp` artifact. Dropping an armed guard deletes the
/// file; only [`TempArtifact::commit`] disarms it.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    /// Create the temp file exclusively; an existing file at `path` is an error.
    pub fn create(path: impl Into<PathBuf>) -> Result<(Self, File)> {
        let path = path.into();
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(Error::Io)?;
        debug!(temp = %path.display(), "temporary artifact created");
        Ok((Self { path, armed: true }, file))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Atomically rename the temp file onto `final_path`. On failure the guard
    /// stays armed and the temp file is removed when it drops.
    pub fn commit(mut self, final_path: &Path) -> Result<PathBuf> {
        fs::rename(&self.path, final_path).map_err(Error::Io)?;
        self.armed = false;

        if let Some(dir) = final_path.parent() {
            if let Err(err) = File::open(dir).and_then(|d| d.sync_all()) {
                warn!(dir = %dir.display(), error = %err, "failed to sync backup directory after rename");
            }
        }
        Ok(final_path.to_path_buf())
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => info!(temp = %self.path.display(), "removed partial temporary artifact"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                temp = %self.path.display(),
                error = %err,
                "failed to remove partial temporary artifact"
            ),
        }
    }
}
