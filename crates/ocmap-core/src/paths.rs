use crate::error::{OcmapError, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

pub const OCMAP_DIR: &str = ".ocmap";
pub const CONFIG_FILE: &str = ".ocmap/config.yaml";
pub const STORE_FILE: &str = ".ocmap/records.db";
pub const ARTIFACT_DIR: &str = "output";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn ocmap_dir(root: &Path) -> PathBuf {
    root.join(OCMAP_DIR)
}

pub fn config_path(root: &Path) -> PathBuf {
    root.join(CONFIG_FILE)
}

/// Resolve a configured path: absolute paths are kept, relative ones are
/// taken from `root`.
pub fn resolve(root: &Path, configured: &Path) -> PathBuf {
    if configured.is_absolute() {
        configured.to_path_buf()
    } else {
        root.join(configured)
    }
}

/// Conventional location of the exported report for one operating unit:
/// `<artifact_dir>/<OC>/<OC>_All.xlsx`.
pub fn artifact_path(artifact_dir: &Path, oc: &str) -> PathBuf {
    artifact_dir.join(oc).join(format!("{oc}_All.xlsx"))
}

// ---------------------------------------------------------------------------
// Unit id validation
// ---------------------------------------------------------------------------

static UNIT_RE: OnceLock<Regex> = OnceLock::new();

fn unit_re() -> &'static Regex {
    UNIT_RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("static regex"))
}

/// Unit ids become directory and layer names, so keep them path-safe.
pub fn validate_unit_id(id: &str) -> Result<()> {
    if id.is_empty() || id.len() > 64 || !unit_re().is_match(id) {
        return Err(OcmapError::InvalidConfig(format!(
            "invalid unit id '{id}': use letters, digits, '_' or '-'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
