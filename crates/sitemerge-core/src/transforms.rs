//! Transform configuration
//!
//! Transforms are attached to glob patterns in `sitemerge.yaml` and turned
//! into rules on every project. Each one names a built-in stage kind.
//!
//! # Built-in Transforms
//!
//! - `rewrite_url` - Prefix site-root and relative URLs in HTML and CSS
//! - `inject` - Insert a snippet before a marker
//! - `replace` - Regex search and replace
//! - `symlink` - Link the file to its original instead of copying it
//! - `rename` - Change the output path or extension
//!
//! # Example
//!
//! ```yaml
//! rules:
//!   - pattern: "**/*.html"
//!     transform:
//!       inject:
//!         before: "</body>"
//!         content: "<!-- inject -->"
//!
//!   - pattern: "**/*"
//!     transform:
//!       symlink:
//!         patterns: ["!**/*.{html,css}"]
//! ```

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::rule::StageFactory;
use crate::stages;

/// Built-in stage kinds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// URL rewriting
    RewriteUrl,
    /// Snippet injection
    Inject,
    /// Regex replace
    Replace,
    /// Symlink marking
    Symlink,
    /// Path rename
    Rename,
}

impl StageKind {
    /// Configuration key of the kind
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RewriteUrl => "rewrite_url",
            Self::Inject => "inject",
            Self::Replace => "replace",
            Self::Symlink => "symlink",
            Self::Rename => "rename",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// URL rewrite configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RewriteUrlConfig {
    /// Prefix to apply instead of the owning project's
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// Injection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct InjectConfig {
    /// Marker to insert before (case-insensitive); appended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Snippet to insert
    pub content: String,
}

/// Replace configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplaceConfig {
    /// Regex to search for
    pub pattern: String,
    /// Replacement, `$1`/`${name}` expand capture groups
    #[serde(default)]
    pub replacement: String,
}

/// Symlink configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SymlinkConfig {
    /// Filter on the relative path; `!` negates. Empty links everything.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Rename configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RenameConfig {
    /// New project-relative path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// New extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

/// Transform configuration from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TransformConfig {
    /// Rewrite URLs
    RewriteUrl {
        /// Rewrite configuration
        rewrite_url: RewriteUrlConfig,
    },

    /// Inject a snippet
    Inject {
        /// Injection configuration
        inject: InjectConfig,
    },

    /// Regex replace
    Replace {
        /// Replace configuration
        replace: ReplaceConfig,
    },

    /// Mark for symlinking
    Symlink {
        /// Symlink configuration
        symlink: SymlinkConfig,
    },

    /// Rename the output
    Rename {
        /// Rename configuration
        rename: RenameConfig,
    },
}

impl TransformConfig {
    /// Stage kind this transform builds
    pub fn kind(&self) -> StageKind {
        match self {
            Self::RewriteUrl { .. } => StageKind::RewriteUrl,
            Self::Inject { .. } => StageKind::Inject,
            Self::Replace { .. } => StageKind::Replace,
            Self::Symlink { .. } => StageKind::Symlink,
            Self::Rename { .. } => StageKind::Rename,
        }
    }

    /// Factory and captured arguments for registering this transform as a rule
    pub fn to_rule_parts(&self) -> Result<(Arc<dyn StageFactory>, Value)> {
        let args = match self {
            Self::RewriteUrl { rewrite_url } => serde_json::to_value(rewrite_url)?,
            Self::Inject { inject } => serde_json::to_value(inject)?,
            Self::Replace { replace } => serde_json::to_value(replace)?,
            Self::Symlink { symlink } => serde_json::to_value(symlink)?,
            Self::Rename { rename } => serde_json::to_value(rename)?,
        };
        Ok((stages::factory(self.kind()), args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inject_transform() {
        let yaml = r#"
inject:
  before: "</body>"
  content: "<!-- inject -->"
"#;
        let config: TransformConfig = serde_yaml::from_str(yaml).unwrap();
        match config {
            TransformConfig::Inject { inject } => {
                assert_eq!(inject.before.as_deref(), Some("</body>"));
                assert_eq!(inject.content, "<!-- inject -->");
            }
            _ => panic!("Expected Inject transform"),
        }
    }

    #[test]
    fn test_parse_symlink_transform() {
        let yaml = r#"
symlink:
  patterns:
    - "!**/*.{html,css}"
"#;
        let config: TransformConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.kind(), StageKind::Symlink);
        match config {
            TransformConfig::Symlink { symlink } => {
                assert_eq!(symlink.patterns, vec!["!**/*.{html,css}".to_string()]);
            }
            _ => panic!("Expected Symlink transform"),
        }
    }

    #[test]
    fn test_parse_empty_rewrite() {
        let config: TransformConfig = serde_yaml::from_str("rewrite_url: {}").unwrap();
        assert_eq!(config.kind(), StageKind::RewriteUrl);
    }

    #[test]
    fn test_parse_replace_transform() {
        let yaml = r#"
replace:
  pattern: 'v(\d+)'
  replacement: "version $1"
"#;
        let config: TransformConfig = serde_yaml::from_str(yaml).unwrap();
        match config {
            TransformConfig::Replace { replace } => {
                assert!(replace.pattern.contains(r"\d"));
                assert_eq!(replace.replacement, "version $1");
            }
            _ => panic!("Expected Replace transform"),
        }
    }

    #[test]
    fn test_parse_rename_transform() {
        let config: TransformConfig = serde_yaml::from_str("rename:\n  extension: css\n").unwrap();
        assert_eq!(config.kind(), StageKind::Rename);
    }

    #[test]
    fn test_unknown_transform_rejected() {
        let result: std::result::Result<TransformConfig, _> =
            serde_yaml::from_str("minify:\n  level: 2\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_rule_parts_build_a_stage() {
        let config: TransformConfig =
            serde_yaml::from_str("inject:\n  content: \"<!-- x -->\"\n").unwrap();
        let (factory, args) = config.to_rule_parts().unwrap();
        assert_eq!(factory.name(), "inject");
        assert_eq!(args["content"], "<!-- x -->");
        assert!(factory.create(&args).is_ok());
    }
}
