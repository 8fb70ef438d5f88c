//! Built-in pipeline stages
//!
//! Each stage kind has one shared factory (see [`factory`]); the factory
//! decodes the rule's captured arguments and builds a fresh stage per file.

use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::Value;

use crate::entry::{Contents, FileEntry, join_url};
use crate::error::{Error, Result};
use crate::glob::Grep;
use crate::rule::{Stage, StageFactory};
use crate::transforms::{
    InjectConfig, RenameConfig, ReplaceConfig, RewriteUrlConfig, StageKind, SymlinkConfig,
};

static HTML_URL_ATTR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(\b(?:href|src)\s*=\s*)(?:"([^"]*)"|'([^']*)')"#)
        .expect("static regex is valid")
});

static CSS_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(url\(\s*)(?:"([^"]*)"|'([^']*)'|([^)'"\s]*))(\s*\))"#)
        .expect("static regex is valid")
});

static URL_SCHEME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.-]*:").expect("static regex is valid"));

/// Shared factory for a built-in stage kind
pub fn factory(kind: StageKind) -> Arc<dyn StageFactory> {
    static REWRITE_URL: Lazy<Arc<dyn StageFactory>> =
        Lazy::new(|| Arc::new(Builtin(StageKind::RewriteUrl)));
    static INJECT: Lazy<Arc<dyn StageFactory>> = Lazy::new(|| Arc::new(Builtin(StageKind::Inject)));
    static REPLACE: Lazy<Arc<dyn StageFactory>> =
        Lazy::new(|| Arc::new(Builtin(StageKind::Replace)));
    static SYMLINK: Lazy<Arc<dyn StageFactory>> =
        Lazy::new(|| Arc::new(Builtin(StageKind::Symlink)));
    static RENAME: Lazy<Arc<dyn StageFactory>> = Lazy::new(|| Arc::new(Builtin(StageKind::Rename)));

    match kind {
        StageKind::RewriteUrl => REWRITE_URL.clone(),
        StageKind::Inject => INJECT.clone(),
        StageKind::Replace => REPLACE.clone(),
        StageKind::Symlink => SYMLINK.clone(),
        StageKind::Rename => RENAME.clone(),
    }
}

struct Builtin(StageKind);

impl StageFactory for Builtin {
    fn name(&self) -> &str {
        self.0.as_str()
    }

    fn create(&self, args: &Value) -> Result<Box<dyn Stage>> {
        let stage: Box<dyn Stage> = match self.0 {
            StageKind::RewriteUrl => Box::new(RewriteUrl::new(decode(self.0, args)?)),
            StageKind::Inject => Box::new(Inject::new(decode(self.0, args)?)),
            StageKind::Replace => Box::new(Replace::new(decode(self.0, args)?)?),
            StageKind::Symlink => Box::new(MarkSymlink::new(decode(self.0, args)?)?),
            StageKind::Rename => Box::new(Rename::new(decode(self.0, args)?)),
        };
        Ok(stage)
    }
}

fn decode<T: serde::de::DeserializeOwned + Default>(kind: StageKind, args: &Value) -> Result<T> {
    if args.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(args.clone()).map_err(|e| Error::stage(kind.as_str(), e.to_string()))
}

/// Contents as UTF-8 text, or `None` when they are not valid UTF-8
///
/// Undecodable contents are left in place untouched.
async fn entry_text(stage: &str, entry: &mut FileEntry) -> Result<Option<String>> {
    let buf = entry
        .buffer()
        .await
        .map_err(|e| Error::stage(stage, e.to_string()))?;
    match String::from_utf8(std::mem::take(buf)) {
        Ok(text) => Ok(Some(text)),
        Err(e) => {
            tracing::warn!(
                stage,
                file = %entry.relative().display(),
                error = %e.utf8_error(),
                "not UTF-8, passing through"
            );
            entry.contents = Contents::Buffer(e.into_bytes());
            Ok(None)
        }
    }
}

// ============================================================================
// URL rewriting
// ============================================================================

/// Rewrites URLs in HTML attributes and CSS `url()` values
pub struct RewriteUrl {
    config: RewriteUrlConfig,
}

impl RewriteUrl {
    /// Create the stage
    pub fn new(config: RewriteUrlConfig) -> Self {
        Self { config }
    }

    fn rewrite_html(&self, text: &str, prefix: &str, base_url: &str) -> String {
        HTML_URL_ATTR
            .replace_all(text, |caps: &Captures| {
                let (url, quote) = match (caps.get(2), caps.get(3)) {
                    (Some(m), _) => (m.as_str(), '"'),
                    (None, Some(m)) => (m.as_str(), '\''),
                    _ => return caps[0].to_string(),
                };
                let url = rewrite_url(url, prefix, base_url).unwrap_or_else(|| url.to_string());
                format!("{}{quote}{url}{quote}", &caps[1])
            })
            .into_owned()
    }

    fn rewrite_css(&self, text: &str, prefix: &str, base_url: &str) -> String {
        CSS_URL
            .replace_all(text, |caps: &Captures| {
                let (url, quote) = match (caps.get(2), caps.get(3), caps.get(4)) {
                    (Some(m), _, _) => (m.as_str(), "\""),
                    (None, Some(m), _) => (m.as_str(), "'"),
                    (None, None, Some(m)) => (m.as_str(), ""),
                    _ => return caps[0].to_string(),
                };
                let url = rewrite_url(url, prefix, base_url).unwrap_or_else(|| url.to_string());
                format!("{}{quote}{url}{quote}{}", &caps[1], &caps[5])
            })
            .into_owned()
    }
}

#[async_trait]
impl Stage for RewriteUrl {
    fn name(&self) -> &str {
        StageKind::RewriteUrl.as_str()
    }

    async fn process(&mut self, mut entry: FileEntry) -> Result<Vec<FileEntry>> {
        let ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let is_html = matches!(ext.as_deref(), Some("html" | "htm"));
        let is_css = ext.as_deref() == Some("css");
        if !is_html && !is_css {
            return Ok(vec![entry]);
        }

        let prefix = self
            .config
            .prefix
            .clone()
            .unwrap_or_else(|| entry.prefix.clone());
        let base_url = url_dir(&entry.original_url);
        let Some(text) = entry_text(self.name(), &mut entry).await? else {
            return Ok(vec![entry]);
        };
        let rewritten = if is_html {
            self.rewrite_html(&text, &prefix, &base_url)
        } else {
            self.rewrite_css(&text, &prefix, &base_url)
        };
        entry.set_text(rewritten);
        Ok(vec![entry])
    }
}

/// Rewrite one URL for a file served under `prefix`
///
/// `base_url` is the project-relative URL directory of the referencing file.
/// Returns `None` for URLs that must stay untouched.
pub fn rewrite_url(url: &str, prefix: &str, base_url: &str) -> Option<String> {
    if url.is_empty() || url.starts_with('#') || url.starts_with("//") || URL_SCHEME.is_match(url)
    {
        return None;
    }

    let split = url.find(['?', '#']).unwrap_or(url.len());
    let (path, suffix) = url.split_at(split);

    let absolute = if path.starts_with('/') {
        path.to_string()
    } else {
        resolve_relative(base_url, path)
    };

    Some(format!("{}{suffix}", join_url(prefix, &absolute)))
}

fn url_dir(url: &str) -> String {
    match url.rfind('/') {
        Some(idx) => url[..=idx].to_string(),
        None => "/".to_string(),
    }
}

fn resolve_relative(base_dir: &str, path: &str) -> String {
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let mut resolved = format!("/{}", parts.join("/"));
    if path.ends_with('/') && resolved.len() > 1 {
        resolved.push('/');
    }
    resolved
}

// ============================================================================
// Injection
// ============================================================================

/// Inserts a snippet before a marker, or appends it
pub struct Inject {
    config: InjectConfig,
}

impl Inject {
    /// Create the stage
    pub fn new(config: InjectConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Stage for Inject {
    fn name(&self) -> &str {
        StageKind::Inject.as_str()
    }

    async fn process(&mut self, mut entry: FileEntry) -> Result<Vec<FileEntry>> {
        let Some(mut text) = entry_text(self.name(), &mut entry).await? else {
            return Ok(vec![entry]);
        };
        let at = self
            .config
            .before
            .as_deref()
            .filter(|marker| !marker.is_empty())
            .and_then(|marker| {
                text.to_ascii_lowercase()
                    .find(&marker.to_ascii_lowercase())
            });
        match at {
            Some(idx) => text.insert_str(idx, &self.config.content),
            None => text.push_str(&self.config.content),
        }
        entry.set_text(text);
        Ok(vec![entry])
    }
}

// ============================================================================
// Regex replace
// ============================================================================

/// Regex search and replace over text content
pub struct Replace {
    regex: Regex,
    replacement: String,
}

impl Replace {
    /// Compile the pattern and create the stage
    pub fn new(config: ReplaceConfig) -> Result<Self> {
        Ok(Self {
            regex: Regex::new(&config.pattern)?,
            replacement: config.replacement,
        })
    }
}

#[async_trait]
impl Stage for Replace {
    fn name(&self) -> &str {
        StageKind::Replace.as_str()
    }

    async fn process(&mut self, mut entry: FileEntry) -> Result<Vec<FileEntry>> {
        let Some(text) = entry_text(self.name(), &mut entry).await? else {
            return Ok(vec![entry]);
        };
        let replaced = self
            .regex
            .replace_all(&text, self.replacement.as_str())
            .into_owned();
        entry.set_text(replaced);
        Ok(vec![entry])
    }
}

// ============================================================================
// Symlink marking
// ============================================================================

/// Flags entries for linking to their original instead of copying
pub struct MarkSymlink {
    grep: Grep,
}

impl MarkSymlink {
    /// Compile the filter and create the stage
    pub fn new(config: SymlinkConfig) -> Result<Self> {
        let grep = if config.patterns.is_empty() {
            Grep::any()
        } else {
            Grep::new(&config.patterns)?
        };
        Ok(Self { grep })
    }
}

#[async_trait]
impl Stage for MarkSymlink {
    fn name(&self) -> &str {
        StageKind::Symlink.as_str()
    }

    async fn process(&mut self, mut entry: FileEntry) -> Result<Vec<FileEntry>> {
        if self.grep.is_match(entry.relative_slash()) {
            entry.symlink = true;
        }
        Ok(vec![entry])
    }
}

// ============================================================================
// Rename
// ============================================================================

/// Moves an entry to a new relative path or extension
pub struct Rename {
    config: RenameConfig,
}

impl Rename {
    /// Create the stage
    pub fn new(config: RenameConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Stage for Rename {
    fn name(&self) -> &str {
        StageKind::Rename.as_str()
    }

    async fn process(&mut self, mut entry: FileEntry) -> Result<Vec<FileEntry>> {
        if let Some(path) = &self.config.path {
            entry.set_path(path.trim_start_matches('/'));
        }
        if let Some(ext) = &self.config.extension {
            entry.set_extension(ext.trim_start_matches('.'));
        }
        let prefix = entry.prefix.clone();
        entry.assign_project(&prefix);
        Ok(vec![entry])
    }
}
