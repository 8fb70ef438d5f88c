//! Source tree adapters
//!
//! Enumeration of project files and discovery of symlinks. Both walk the
//! tree on the blocking pool; enumeration hands entries over through a
//! bounded channel, so a slow consumer stalls the walk.

use std::path::{Path, PathBuf};

use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::entry::{Contents, FileEntry};
use crate::error::{Error, Result};
use crate::glob::GlobList;

/// Enumerate every file under `root` not matched by `ignore`
///
/// With `buffer` set each entry carries its contents in memory, otherwise
/// an open file stream. Directories are skipped. Walk and read errors are
/// sent down the channel in place of the entry.
pub fn list_files(
    root: &Path,
    ignore: GlobList,
    buffer: bool,
    capacity: usize,
) -> mpsc::Receiver<Result<FileEntry>> {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let root = root.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let walker = WalkDir::new(&root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter();

        for item in walker {
            let next = match item {
                Ok(entry) if entry.file_type().is_dir() => continue,
                Ok(entry) => {
                    let path = entry.into_path();
                    let relative = path.strip_prefix(&root).unwrap_or(&path);
                    if ignore.is_match(relative) {
                        tracing::trace!(file = %relative.display(), "ignored");
                        continue;
                    }
                    read_entry(path, &root, buffer)
                }
                Err(e) => Err(Error::Walk(e)),
            };
            if tx.blocking_send(next).is_err() {
                tracing::debug!(root = %root.display(), "file consumer went away, stopping walk");
                break;
            }
        }
    });

    rx
}

fn read_entry(path: PathBuf, root: &Path, buffer: bool) -> Result<FileEntry> {
    let contents = if buffer {
        Contents::Buffer(std::fs::read(&path)?)
    } else {
        let file = tokio::fs::File::from_std(std::fs::File::open(&path)?);
        Contents::Stream(Box::pin(file))
    };
    Ok(FileEntry::new(path, root, contents))
}

/// Symlinks found under a directory
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymlinkIndex {
    /// Absolute directory that was searched
    pub dir: PathBuf,

    /// Symlink paths relative to `dir`
    pub links: Vec<PathBuf>,
}

impl SymlinkIndex {
    /// Whether no symlink was found
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Find every symlink under `root` without following any of them
pub async fn locate_symlinks(root: &Path) -> Result<SymlinkIndex> {
    let dir = tokio::fs::canonicalize(root).await?;

    tokio::task::spawn_blocking(move || {
        let mut links = Vec::new();
        for entry in WalkDir::new(&dir)
            .follow_links(false)
            .min_depth(1)
            .sort_by_file_name()
        {
            let entry = entry?;
            if entry.path_is_symlink() {
                let relative = entry.path().strip_prefix(&dir).unwrap_or(entry.path());
                links.push(relative.to_path_buf());
            }
        }
        tracing::debug!(dir = %dir.display(), count = links.len(), "located symlinks");
        Ok::<_, Error>(SymlinkIndex { dir, links })
    })
    .await
    .map_err(|e| Error::Io(std::io::Error::other(e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, body: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    async fn collect(mut rx: mpsc::Receiver<Result<FileEntry>>) -> Vec<FileEntry> {
        let mut out = Vec::new();
        while let Some(entry) = rx.recv().await {
            out.push(entry.unwrap());
        }
        out
    }

    #[tokio::test]
    async fn test_list_files_honors_ignore() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "index.html", "<html></html>");
        write(dir.path(), "css/site.css", "a{}");
        write(dir.path(), "node_modules/x/index.js", "x");
        write(dir.path(), "bower_components/y/y.js", "y");

        let ignore = GlobList::new(["{node_modules,bower_components}/**"]).unwrap();
        let entries = collect(list_files(dir.path(), ignore, true, 2)).await;

        let mut rels: Vec<_> = entries.iter().map(FileEntry::relative_slash).collect();
        rels.sort();
        assert_eq!(rels, vec!["css/site.css", "index.html"]);
        assert!(entries.iter().all(FileEntry::is_buffer));
    }

    #[tokio::test]
    async fn test_list_files_streaming() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.txt", "streamed");

        let mut entries = collect(list_files(dir.path(), GlobList::empty(), false, 1)).await;
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_buffer());
        assert_eq!(entries[0].text().await.unwrap(), "streamed");
    }

    #[tokio::test]
    async fn test_list_files_missing_root() {
        let dir = TempDir::new().unwrap();
        let mut rx = list_files(&dir.path().join("nope"), GlobList::empty(), true, 1);
        assert!(rx.recv().await.unwrap().is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_locate_symlinks_does_not_follow() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        write(&real, "p1/index.html", "1");
        write(&real, "p2/index.html", "2");
        let site = dir.path().join("site");
        std::fs::create_dir_all(site.join("foo/bar")).unwrap();
        std::os::unix::fs::symlink(real.join("p1"), site.join("p1")).unwrap();
        std::os::unix::fs::symlink(real.join("p2"), site.join("foo/bar/p2")).unwrap();

        let index = locate_symlinks(&site).await.unwrap();
        assert_eq!(index.dir, std::fs::canonicalize(&site).unwrap());
        assert_eq!(
            index.links,
            vec![PathBuf::from("foo/bar/p2"), PathBuf::from("p1")]
        );
    }

    #[tokio::test]
    async fn test_locate_symlinks_none() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a/b.txt", "b");
        let index = locate_symlinks(dir.path()).await.unwrap();
        assert!(index.is_empty());
    }
}
