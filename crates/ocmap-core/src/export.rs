use std::path::{Path, PathBuf};

use crate::error::{OcmapError, Result};
use crate::paths;

/// Supplies the per-unit report file the layer import uploads.
pub trait ReportExporter: Send + Sync {
    /// Conventional location, whether or not the file exists yet.
    fn artifact_path(&self, oc: &str) -> PathBuf;

    /// The artifact for `oc`, or `ArtifactMissing` if it was not produced.
    fn artifact(&self, oc: &str) -> Result<PathBuf> {
        let path = self.artifact_path(oc);
        if path.is_file() {
            Ok(path)
        } else {
            Err(OcmapError::ArtifactMissing {
                oc: oc.to_string(),
                path: path.display().to_string(),
            })
        }
    }
}

/// Reads artifacts that an external export job wrote under one directory as
/// `<dir>/<OC>/<OC>_All.xlsx`.
#[derive(Debug, Clone)]
pub struct ArtifactDirectory {
    dir: PathBuf,
}

impl ArtifactDirectory {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReportExporter for ArtifactDirectory {
    fn artifact_path(&self, oc: &str) -> PathBuf {
        paths::artifact_path(&self.dir, oc)
    }
}
