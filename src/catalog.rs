//! Artifact catalog
//!
//! Artifacts are the immediate subdirectories of a root directory, each
//! expected to carry a `Dockerfile` at its top level. Discovery is pure
//! filesystem reading; all failures are scoped to the artifact that caused
//! them so the caller can skip it and continue.

use crate::dockerfile;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised while discovering or loading artifacts
#[derive(Debug, Error)]
pub enum CatalogError {
    /// A specifically requested artifact id does not exist under the root
    #[error("artifact '{id}' not found in '{root}'")]
    NotFound { id: String, root: String },

    /// The root directory could not be listed
    #[error("failed to list artifact directory '{root}': {source}")]
    RootUnreadable {
        root: String,
        #[source]
        source: std::io::Error,
    },

    /// The artifact directory has no readable Dockerfile
    #[error("no readable Dockerfile for artifact '{id}': {reason}")]
    DockerfileMissing { id: String, reason: String },

    /// No base version could be extracted from the Dockerfile
    #[error("no base {base_image} version found in Dockerfile for artifact '{id}'")]
    NoBaseVersion { id: String, base_image: String },
}

/// One discovered artifact: its id, directory, base Dockerfile text and the
/// OS version that text references. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: String,
    pub dir: PathBuf,
    pub dockerfile: String,
    pub base_version: String,
}

/// Returns the artifact ids to process, sorted for deterministic ordering.
///
/// With `specific` set, validates presence and returns exactly that id;
/// `CatalogError::NotFound` means the caller must process nothing.
pub fn resolve(root: &Path, specific: Option<&str>) -> Result<Vec<String>, CatalogError> {
    let mut ids = Vec::new();
    let entries = fs::read_dir(root).map_err(|e| CatalogError::RootUnreadable {
        root: root.display().to_string(),
        source: e,
    })?;

    for entry in entries.flatten() {
        if entry.path().is_dir() {
            ids.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    ids.sort();

    if let Some(id) = specific {
        if ids.iter().any(|d| d == id) {
            debug!(artifact = %id, "Requested artifact found");
            return Ok(vec![id.to_string()]);
        }
        return Err(CatalogError::NotFound {
            id: id.to_string(),
            root: root.display().to_string(),
        });
    }

    info!(count = ids.len(), root = %root.display(), "Discovered artifacts");
    Ok(ids)
}

/// Loads one artifact's base Dockerfile and extracts its base version.
pub fn load(root: &Path, id: &str, base_image: &str) -> Result<Artifact, CatalogError> {
    let dir = root.join(id);
    let dockerfile_path = dir.join("Dockerfile");

    let dockerfile =
        fs::read_to_string(&dockerfile_path).map_err(|e| CatalogError::DockerfileMissing {
            id: id.to_string(),
            reason: e.to_string(),
        })?;

    let base_version = dockerfile::extract_base_version(&dockerfile, base_image).ok_or_else(
        || CatalogError::NoBaseVersion {
            id: id.to_string(),
            base_image: base_image.to_string(),
        },
    )?;

    Ok(Artifact {
        id: id.to_string(),
        dir,
        dockerfile,
        base_version,
    })
}
