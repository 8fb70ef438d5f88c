//! Project boundary detection
//!
//! A merged site is a directory tree where each sub-project is mounted as a
//! symlink. The detector maps files of that tree to the project that owns
//! them and names projects from their package manifests. Symlink indexes
//! and manifest lookups are cached per absolute directory for the
//! detector's lifetime.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::entry::normalize_prefix;
use crate::error::Result;
use crate::glob::slash_path;
use crate::manifest::read_manifest;
use crate::source::{SymlinkIndex, locate_symlinks};

/// Where a project lives and how it is mounted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectBoundary {
    /// URL prefix, e.g. `/foo/bar/p2`
    pub prefix: String,

    /// Directory inside the merged tree the project is mounted at
    pub base: PathBuf,

    /// Real source directory with symlinks resolved
    pub src: PathBuf,

    /// Display name
    pub name: String,
}

/// Detects project boundaries under site roots
#[derive(Debug, Default)]
pub struct ProjectDetector {
    symlinks: Mutex<HashMap<PathBuf, Arc<SymlinkIndex>>>,
    names: Mutex<HashMap<PathBuf, Option<String>>>,
}

impl ProjectDetector {
    /// Create a detector with empty caches
    pub fn new() -> Self {
        Self::default()
    }

    /// Symlinks under `root`, cached per directory
    pub async fn symlinks(&self, root: &Path) -> Result<Arc<SymlinkIndex>> {
        let dir = tokio::fs::canonicalize(root).await?;
        if let Some(index) = lock(&self.symlinks).get(&dir) {
            return Ok(index.clone());
        }

        let index = Arc::new(locate_symlinks(&dir).await?);
        lock(&self.symlinks).insert(dir, index.clone());
        Ok(index)
    }

    /// The project owning `relative` (a file path relative to `root`)
    ///
    /// The owner is the longest symlink that is a component-wise prefix of
    /// the path, else the first directory of the path, else `root` itself.
    pub async fn boundary_for(&self, root: &Path, relative: &Path) -> Result<ProjectBoundary> {
        let index = self.symlinks(root).await?;
        let mount = owning_mount(&index.links, relative);

        let base = index.dir.join(&mount);
        let src = tokio::fs::canonicalize(&base).await?;
        let prefix = normalize_prefix(&slash_path(&mount));
        let name = self.project_name(&src, &base).await;

        Ok(ProjectBoundary {
            prefix,
            base,
            src,
            name,
        })
    }

    /// Name from the manifest in `src`, falling back to the basename of `base`
    pub async fn project_name(&self, src: &Path, base: &Path) -> String {
        let cached = lock(&self.names).get(src).cloned();
        let declared = match cached {
            Some(name) => name,
            None => {
                let name = read_manifest(src)
                    .await
                    .and_then(|m| m.name().map(str::to_string));
                lock(&self.names).insert(src.to_path_buf(), name.clone());
                name
            }
        };

        declared.unwrap_or_else(|| basename(base))
    }

    /// One project per symlink under `root`
    ///
    /// Symlinks that cannot be resolved are logged and skipped. A tree
    /// without any symlink is a single project mounted at `/`.
    pub async fn discover_projects(&self, root: &Path) -> Result<Vec<ProjectBoundary>> {
        let index = self.symlinks(root).await?;

        if index.is_empty() {
            let name = self.project_name(&index.dir, &index.dir).await;
            tracing::debug!(
                dir = %index.dir.display(),
                "no symlinks, using the root as the only project"
            );
            return Ok(vec![ProjectBoundary {
                prefix: "/".to_string(),
                base: index.dir.clone(),
                src: index.dir.clone(),
                name,
            }]);
        }

        let mut projects = Vec::with_capacity(index.links.len());
        for link in &index.links {
            let base = index.dir.join(link);
            let src = match tokio::fs::canonicalize(&base).await {
                Ok(src) => src,
                Err(e) => {
                    tracing::warn!(
                        link = %base.display(),
                        error = %e,
                        "unable to resolve symlink, skipping"
                    );
                    continue;
                }
            };
            if !src.is_dir() {
                tracing::debug!(link = %base.display(), "symlink is not a directory, skipping");
                continue;
            }
            let name = self.project_name(&src, &base).await;
            projects.push(ProjectBoundary {
                prefix: normalize_prefix(&slash_path(link)),
                base,
                src,
                name,
            });
        }
        Ok(projects)
    }
}

fn owning_mount(links: &[PathBuf], relative: &Path) -> PathBuf {
    let longest = links
        .iter()
        .filter(|link| relative.starts_with(link))
        .max_by_key(|link| link.components().count());
    if let Some(link) = longest {
        return link.clone();
    }

    let mut components = relative.components();
    match (components.next(), components.next()) {
        (Some(first @ Component::Normal(_)), Some(_)) => PathBuf::from(first.as_os_str()),
        _ => PathBuf::new(),
    }
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
