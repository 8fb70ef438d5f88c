//! In-flight file records
//!
//! A [`FileEntry`] is created when a source file is enumerated, mutated by
//! every pipeline stage it passes through, and consumed once by a writer.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::glob::slash_path;

/// File contents
pub enum Contents {
    /// Content held in memory
    Buffer(Vec<u8>),
    /// Content read lazily from a byte stream
    Stream(Pin<Box<dyn AsyncRead + Send>>),
    /// No content (placeholder or already consumed)
    Empty,
}

impl fmt::Debug for Contents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(buf) => write!(f, "Buffer({} bytes)", buf.len()),
            Self::Stream(_) => f.write_str("Stream"),
            Self::Empty => f.write_str("Empty"),
        }
    }
}

impl From<Vec<u8>> for Contents {
    fn from(buf: Vec<u8>) -> Self {
        Self::Buffer(buf)
    }
}

impl From<String> for Contents {
    fn from(s: String) -> Self {
        Self::Buffer(s.into_bytes())
    }
}

/// One source file in flight
#[derive(Debug)]
pub struct FileEntry {
    path: PathBuf,
    base: PathBuf,
    history: Vec<PathBuf>,

    /// File contents
    pub contents: Contents,

    /// Write as a symlink to the original instead of copying
    pub symlink: bool,

    /// URL prefix of the owning project
    pub prefix: String,

    /// Public URL of the file inside the merged tree
    pub url: String,

    /// URL of the file relative to its own project root
    pub original_url: String,

    /// Free-form metadata stages may attach
    pub meta: HashMap<String, serde_json::Value>,
}

impl FileEntry {
    /// Create an entry for the file at `path` inside project root `base`
    pub fn new(path: impl Into<PathBuf>, base: impl Into<PathBuf>, contents: Contents) -> Self {
        let path = path.into();
        Self {
            history: vec![path.clone()],
            path,
            base: base.into(),
            contents,
            symlink: false,
            prefix: "/".to_string(),
            url: String::new(),
            original_url: String::new(),
            meta: HashMap::new(),
        }
    }

    /// Current absolute path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Project root the entry is relative to
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Current path relative to the project root
    pub fn relative(&self) -> &Path {
        self.path.strip_prefix(&self.base).unwrap_or(&self.path)
    }

    /// Relative path with `/` separators, as used for glob matching and URLs
    pub fn relative_slash(&self) -> String {
        slash_path(self.relative())
    }

    /// The path the file was read from, before any rewrite
    pub fn original_path(&self) -> &Path {
        &self.history[0]
    }

    /// Every path this entry has had, oldest first
    pub fn history(&self) -> &[PathBuf] {
        &self.history
    }

    /// Move the entry to a new path; relative paths are taken from the base
    pub fn set_path(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        };
        if path != self.path {
            self.history.push(path.clone());
            self.path = path;
        }
    }

    /// Swap the extension of the current path
    pub fn set_extension(&mut self, ext: &str) {
        let path = self.path.with_extension(ext);
        self.set_path(path);
    }

    /// Whether the contents are held in memory
    pub fn is_buffer(&self) -> bool {
        matches!(self.contents, Contents::Buffer(_))
    }

    /// Load stream contents into memory and borrow the buffer
    pub async fn buffer(&mut self) -> std::io::Result<&mut Vec<u8>> {
        match std::mem::replace(&mut self.contents, Contents::Empty) {
            Contents::Buffer(buf) => self.contents = Contents::Buffer(buf),
            Contents::Stream(mut stream) => {
                let mut buf = Vec::new();
                stream.read_to_end(&mut buf).await?;
                self.contents = Contents::Buffer(buf);
            }
            Contents::Empty => self.contents = Contents::Buffer(Vec::new()),
        }
        match &mut self.contents {
            Contents::Buffer(buf) => Ok(buf),
            _ => unreachable!("contents were just buffered"),
        }
    }

    /// Contents decoded as UTF-8 text
    pub async fn text(&mut self) -> std::io::Result<String> {
        let buf = self.buffer().await?;
        String::from_utf8(buf.clone())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Replace the contents with `text`
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.contents = Contents::from(text.into());
    }

    /// Attach project identity and derive the file URLs
    pub fn assign_project(&mut self, prefix: &str) {
        self.prefix = prefix.to_string();
        let relative = self.relative_slash();
        self.url = make_url(&join_url(prefix, &relative));
        self.original_url = make_url(&relative);
    }
}

/// Join a URL prefix and a relative path with a single `/`
pub fn join_url(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        return format!("{prefix}/");
    }
    format!("{prefix}/{relative}")
}

/// Public URL for a file path: rooted, with `index.<ext>` mapped to its directory
pub fn make_url(file: &str) -> String {
    let url = if file.starts_with('/') {
        file.to_string()
    } else {
        format!("/{file}")
    };

    match url.rfind('/') {
        Some(idx) if is_index_file(&url[idx + 1..]) => url[..=idx].to_string(),
        _ => url,
    }
}

fn is_index_file(name: &str) -> bool {
    name.strip_prefix("index.").is_some_and(|ext| {
        !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

/// Normalize a project prefix: leading `/`, `/` separators, no trailing `/`
pub fn normalize_prefix(prefix: &str) -> String {
    let joined = prefix
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != ".")
        .collect::<Vec<_>>()
        .join("/");
    format!("/{joined}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("build.sh", "/build.sh")]
    #[case("about/index.html", "/about/")]
    #[case("index.html", "/")]
    #[case("/p1/img/smiley.png", "/p1/img/smiley.png")]
    #[case("index.min.js", "/index.min.js")]
    #[case("reindex.html", "/reindex.html")]
    fn test_make_url(#[case] file: &str, #[case] expected: &str) {
        assert_eq!(make_url(file), expected);
    }

    #[rstest]
    #[case("p1", "/p1")]
    #[case("/p1/", "/p1")]
    #[case("foo\\bar\\p2", "/foo/bar/p2")]
    #[case("", "/")]
    #[case("./foo//bar", "/foo/bar")]
    fn test_normalize_prefix(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_prefix(input), expected);
    }

    #[test]
    fn test_assign_project_urls() {
        let mut entry = FileEntry::new("/src/p1/about/index.html", "/src/p1", Contents::Empty);
        entry.assign_project("/p1");
        assert_eq!(entry.prefix, "/p1");
        assert_eq!(entry.url, "/p1/about/");
        assert_eq!(entry.original_url, "/about/");
    }

    #[test]
    fn test_root_prefix_urls() {
        let mut entry = FileEntry::new("/src/build.sh", "/src", Contents::Empty);
        entry.assign_project("/");
        assert_eq!(entry.url, "/build.sh");
        assert_eq!(entry.original_url, "/build.sh");
    }

    #[test]
    fn test_history_keeps_original() {
        let mut entry = FileEntry::new("/src/p1/a.less", "/src/p1", Contents::Empty);
        entry.set_extension("css");
        entry.set_path("out/b.css");

        assert_eq!(entry.original_path(), Path::new("/src/p1/a.less"));
        assert_eq!(entry.history().len(), 3);
        assert_eq!(entry.relative(), Path::new("out/b.css"));
    }

    #[test]
    fn test_set_same_path_is_noop() {
        let mut entry = FileEntry::new("/src/a.txt", "/src", Contents::Empty);
        entry.set_path("/src/a.txt");
        assert_eq!(entry.history().len(), 1);
    }

    #[tokio::test]
    async fn test_buffer_from_stream() {
        let stream: Pin<Box<dyn AsyncRead + Send>> = Box::pin(&b"hello"[..]);
        let mut entry = FileEntry::new("/src/a.txt", "/src", Contents::Stream(stream));
        assert!(!entry.is_buffer());
        assert_eq!(entry.text().await.unwrap(), "hello");
        assert!(entry.is_buffer());
    }
}
