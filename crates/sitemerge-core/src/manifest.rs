//! Package manifest lookup

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Manifest files probed in a project root, first match wins
pub const MANIFEST_FILES: [&str; 3] = [".bower.json", "bower.json", "package.json"];

/// The fields of a package manifest a project cares about
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Manifest {
    /// Declared package name
    #[serde(default)]
    pub name: Option<String>,

    /// File the manifest was read from
    #[serde(skip)]
    pub path: PathBuf,
}

impl Manifest {
    /// The declared name, if present and non-empty
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// Read the first manifest present in `dir`
///
/// A manifest that cannot be read or parsed is logged and treated as
/// missing.
pub async fn read_manifest(dir: &Path) -> Option<Manifest> {
    for file in MANIFEST_FILES {
        let path = dir.join(file);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            continue;
        }
        return match load(&path).await {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable manifest");
                None
            }
        };
    }
    None
}

async fn load(path: &Path) -> Result<Manifest> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| Error::Manifest {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    let mut manifest: Manifest = serde_json::from_str(&contents).map_err(|e| Error::Manifest {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    manifest.path = path.to_path_buf();
    Ok(manifest)
}
