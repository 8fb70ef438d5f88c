//! Glob matching
//!
//! Thin adapter over `globset` with the extended semantics used by rules
//! and ignore lists: `**` spans directories, `{a,b}` alternates and `*`
//! stays inside one path segment. Paths are matched in their `/`-separated
//! relative form regardless of the host separator.
//!
//! [`Grep`] adds allow/deny lists on top: a pattern string with a leading
//! `!` is a negative pattern.

use std::fmt;
use std::path::Path;

use globset::{GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};

use crate::error::{Error, Result};

/// A single compiled glob pattern
#[derive(Clone)]
pub struct Glob {
    pattern: String,
    matcher: GlobMatcher,
}

impl Glob {
    /// Compile `pattern`
    pub fn new(pattern: &str) -> Result<Self> {
        Ok(Self {
            pattern: pattern.to_string(),
            matcher: build(pattern)?.compile_matcher(),
        })
    }

    /// The source pattern string
    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Test a relative path against the pattern
    pub fn is_match(&self, path: impl AsRef<Path>) -> bool {
        self.matcher.is_match(slash_path(path.as_ref()))
    }
}

impl fmt::Debug for Glob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Glob").field(&self.pattern).finish()
    }
}

/// One-shot match of `path` against `pattern`
pub fn matches(path: impl AsRef<Path>, pattern: &str) -> Result<bool> {
    Ok(Glob::new(pattern)?.is_match(path))
}

/// A compiled list of patterns, matching when any of them matches
#[derive(Clone)]
pub struct GlobList {
    patterns: Vec<String>,
    set: GlobSet,
}

impl GlobList {
    /// Compile every pattern in `patterns`
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        let mut sources = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            builder.add(build(pattern)?);
            sources.push(pattern.to_string());
        }
        let set = builder.build().map_err(|e| Error::InvalidPattern {
            pattern: sources.join(", "),
            message: e.to_string(),
        })?;
        Ok(Self {
            patterns: sources,
            set,
        })
    }

    /// An empty list that matches nothing
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
        }
    }

    /// Whether the list holds no patterns
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The source pattern strings
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Test a relative path against every pattern
    pub fn is_match(&self, path: impl AsRef<Path>) -> bool {
        self.set.is_match(slash_path(path.as_ref()))
    }
}

impl fmt::Debug for GlobList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobList").field(&self.patterns).finish()
    }
}

/// Allow/deny pattern filter
///
/// A path passes when there are no positive patterns or at least one
/// positive pattern matches, and no negative pattern matches.
#[derive(Debug, Clone)]
pub struct Grep {
    positive: GlobList,
    negative: GlobList,
}

impl Grep {
    /// Build from pattern strings; `!`-prefixed ones are negative
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut positive = Vec::new();
        let mut negative = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            match pattern.strip_prefix('!') {
                Some(neg) => negative.push(neg.to_string()),
                None => positive.push(pattern.to_string()),
            }
        }
        Ok(Self {
            positive: GlobList::new(positive)?,
            negative: GlobList::new(negative)?,
        })
    }

    /// A filter that lets everything through
    pub fn any() -> Self {
        Self {
            positive: GlobList::empty(),
            negative: GlobList::empty(),
        }
    }

    /// Whether `path` passes the filter
    pub fn is_match(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        (self.positive.is_empty() || self.positive.is_match(path)) && !self.negative.is_match(path)
    }
}

fn build(pattern: &str) -> Result<globset::Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .backslash_escape(true)
        .build()
        .map_err(|e| Error::InvalidPattern {
            pattern: pattern.to_string(),
            message: e.kind().to_string(),
        })
}

/// Render a path with `/` separators
pub fn slash_path(path: &Path) -> String {
    let s = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        s.into_owned()
    } else {
        s.replace(std::path::MAIN_SEPARATOR, "/")
    }
}
