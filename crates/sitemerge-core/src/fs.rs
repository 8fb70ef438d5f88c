//! Filesystem helpers for writers

use std::io;
use std::path::{Component, Path, PathBuf};

/// Create `dir` and any missing parents
pub async fn create_dir_all(dir: &Path) -> io::Result<()> {
    tokio::fs::create_dir_all(dir).await
}

/// Create a symlink at `link` pointing to `target`
///
/// A link that already exists is left as is and counts as success.
pub async fn symlink(target: &Path, link: &Path) -> io::Result<()> {
    match create_symlink(target, link).await {
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            tracing::debug!(link = %link.display(), "symlink already exists");
            Ok(())
        }
        other => other,
    }
}

#[cfg(unix)]
async fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    tokio::fs::symlink(target, link).await
}

#[cfg(windows)]
async fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    let resolved = link.parent().map_or_else(|| target.to_path_buf(), |p| p.join(target));
    if resolved.is_dir() {
        tokio::fs::symlink_dir(target, link).await
    } else {
        tokio::fs::symlink_file(target, link).await
    }
}

/// Whether `path` itself is a symlink (not following it)
pub async fn is_symlink(path: &Path) -> bool {
    tokio::fs::symlink_metadata(path)
        .await
        .is_ok_and(|meta| meta.file_type().is_symlink())
}

/// Path to `target` relative to directory `from`
///
/// Both paths should be absolute. When they share no root (different
/// drives) `target` is returned unchanged.
pub fn relative_path(target: &Path, from: &Path) -> PathBuf {
    let target: Vec<Component<'_>> = target.components().collect();
    let from: Vec<Component<'_>> = from.components().collect();

    if target.first() != from.first() {
        return target.iter().collect();
    }

    let common = target
        .iter()
        .zip(from.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for part in &target[common..] {
        rel.push(part.as_os_str());
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    #[rstest]
    #[case("/src/p1/img/a.png", "/out/p1/img", "../../../src/p1/img/a.png")]
    #[case("/out/a/b.txt", "/out/a", "b.txt")]
    #[case("/out/a", "/out/a", ".")]
    #[case("/src/x.txt", "/", "src/x.txt")]
    fn test_relative_path(#[case] target: &str, #[case] from: &str, #[case] expected: &str) {
        assert_eq!(
            relative_path(Path::new(target), Path::new(from)),
            PathBuf::from(expected)
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_exists_is_ok() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("target.txt");
        std::fs::write(&target, "x").unwrap();
        let link = dir.path().join("link.txt");

        symlink(Path::new("target.txt"), &link).await.unwrap();
        symlink(Path::new("target.txt"), &link).await.unwrap();

        assert!(is_symlink(&link).await);
        assert_eq!(std::fs::read_to_string(&link).unwrap(), "x");
        assert!(!is_symlink(&target).await);
    }

    #[tokio::test]
    async fn test_create_dir_all_nested() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a/b/c");
        create_dir_all(&nested).await.unwrap();
        create_dir_all(&nested).await.unwrap();
        assert!(nested.is_dir());
    }
}
