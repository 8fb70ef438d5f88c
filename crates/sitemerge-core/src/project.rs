//! Per-project configuration and rule routing
//!
//! A [`ProjectConfig`] owns the ordered transform rules of one project
//! together with its identity (source root, URL prefix, name). Any change
//! to the rule list clears the pipeline cache before the call returns.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entry::normalize_prefix;
use crate::error::Result;
use crate::glob::GlobList;
use crate::router::{ChainShape, PipelineCache};
use crate::rule::{RuleId, StageFactory, TransformRule};

/// Ignore patterns applied when none are configured
pub const DEFAULT_IGNORE: &str = "{node_modules,bower_components}/**";

/// How matching rules are selected for a path
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Compose every matching rule, in registration order
    #[default]
    All,
    /// Only the rule with the longest pattern (earliest wins a tie)
    LongestPattern,
}

/// Rules and identity of one project
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    rules: Vec<TransformRule>,
    cache: PipelineCache,
    ignore: Vec<String>,
    src: PathBuf,
    prefix: String,
    name: String,

    /// Read file contents into memory (otherwise stream them)
    pub buffer: bool,

    /// Rule selection policy
    pub match_mode: MatchMode,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            cache: PipelineCache::new(),
            ignore: vec![DEFAULT_IGNORE.to_string()],
            src: PathBuf::new(),
            prefix: "/".to_string(),
            name: String::new(),
            buffer: true,
            match_mode: MatchMode::All,
        }
    }
}

impl ProjectConfig {
    /// Config for the project rooted at `src`, mounted at `prefix`
    pub fn new(src: impl Into<PathBuf>, prefix: &str) -> Self {
        Self {
            src: src.into(),
            prefix: normalize_prefix(prefix),
            ..Self::default()
        }
    }

    /// Copy this config (rules included) for another project
    pub fn for_project(&self, src: impl Into<PathBuf>, prefix: &str, name: &str) -> Self {
        Self {
            src: src.into(),
            prefix: normalize_prefix(prefix),
            name: name.to_string(),
            ..self.clone()
        }
    }

    /// Project source root
    pub fn src(&self) -> &Path {
        &self.src
    }

    /// Normalized URL prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Display name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ignore patterns
    pub fn ignore(&self) -> &[String] {
        &self.ignore
    }

    /// Replace the ignore patterns
    pub fn set_ignore<I, S>(&mut self, patterns: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore = patterns.into_iter().map(Into::into).collect();
    }

    /// Compile the ignore patterns
    pub fn ignore_globs(&self) -> Result<GlobList> {
        GlobList::new(&self.ignore)
    }

    /// Registered rules, in registration order
    pub fn rules(&self) -> &[TransformRule] {
        &self.rules
    }

    /// Register a rule; several rules may share a pattern
    pub fn add_rule(
        &mut self,
        pattern: &str,
        factory: Arc<dyn StageFactory>,
        args: Value,
    ) -> Result<RuleId> {
        let rule = TransformRule::new(pattern, factory, args)?;
        let id = rule.id();
        tracing::debug!(prefix = %self.prefix, %pattern, rule = %id, "registered rule");
        self.rules.push(rule);
        self.cache.invalidate();
        Ok(id)
    }

    /// Remove rules registered for `pattern`, optionally only those using `factory`
    ///
    /// Returns how many rules were removed.
    pub fn remove_rule(&mut self, pattern: &str, factory: Option<&Arc<dyn StageFactory>>) -> usize {
        let before = self.rules.len();
        self.rules.retain(|rule| {
            let same = rule.pattern() == pattern && factory.is_none_or(|f| rule.uses_factory(f));
            !same
        });
        let removed = before - self.rules.len();
        if removed > 0 {
            self.cache.invalidate();
        }
        removed
    }

    /// Rules whose pattern matches the project-relative `path`
    pub fn matched_rules(&self, path: impl AsRef<Path>) -> Vec<TransformRule> {
        let path = path.as_ref();
        let matched = self.rules.iter().filter(|rule| rule.is_match(path));
        match self.match_mode {
            MatchMode::All => matched.cloned().collect(),
            MatchMode::LongestPattern => matched
                .fold(None::<&TransformRule>, |best, rule| match best {
                    Some(b) if b.pattern().len() >= rule.pattern().len() => Some(b),
                    _ => Some(rule),
                })
                .into_iter()
                .cloned()
                .collect(),
        }
    }

    /// Chain shape for `path`, or `None` when the file passes through untouched
    pub fn resolve(&self, path: impl AsRef<Path>) -> Option<Arc<ChainShape>> {
        let matched = self.matched_rules(path);
        if matched.is_empty() {
            return None;
        }
        Some(self.cache.get_or_insert(matched))
    }

    /// Number of cached chain shapes
    pub fn cached_shapes(&self) -> usize {
        self.cache.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::rule::factory_fn;

    fn noop() -> Arc<dyn StageFactory> {
        factory_fn("noop", |_| Err(Error::stage("noop", "unused")))
    }

    #[test]
    fn test_prefix_normalized() {
        let config = ProjectConfig::new("/src/p2", "foo\\bar\\p2\\");
        assert_eq!(config.prefix(), "/foo/bar/p2");
    }

    #[test]
    fn test_default_ignore() {
        let config = ProjectConfig::default();
        let ignore = config.ignore_globs().unwrap();
        assert!(ignore.is_match("node_modules/x/index.js"));
        assert!(ignore.is_match("bower_components/jquery/dist/jquery.js"));
        assert!(!ignore.is_match("js/app.js"));
    }

    #[test]
    fn test_matched_rules_in_registration_order() {
        let mut config = ProjectConfig::default();
        let generic = config.add_rule("**/*.*", noop(), Value::Null).unwrap();
        let html = config.add_rule("**/*.html", noop(), Value::Null).unwrap();
        let css = config.add_rule("**/*.css", noop(), Value::Null).unwrap();

        let ids: Vec<_> = config
            .matched_rules("about/index.html")
            .iter()
            .map(TransformRule::id)
            .collect();
        assert_eq!(ids, vec![generic, html]);

        let ids: Vec<_> = config
            .matched_rules("style.css")
            .iter()
            .map(TransformRule::id)
            .collect();
        assert_eq!(ids, vec![generic, css]);

        assert!(config.matched_rules("LICENSE").is_empty());
    }

    #[test]
    fn test_longest_pattern_mode() {
        let mut config = ProjectConfig::default();
        config.match_mode = MatchMode::LongestPattern;
        config.add_rule("**/*", noop(), Value::Null).unwrap();
        let specific = config.add_rule("about/**/*.html", noop(), Value::Null).unwrap();

        let matched = config.matched_rules("about/index.html");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id(), specific);
    }

    #[test]
    fn test_remove_rule_by_pattern_and_factory() {
        let mut config = ProjectConfig::default();
        let keep = noop();
        let drop = noop();
        config.add_rule("**/*.html", keep.clone(), Value::Null).unwrap();
        config.add_rule("**/*.html", drop.clone(), Value::Null).unwrap();
        config.add_rule("**/*.css", drop.clone(), Value::Null).unwrap();

        assert_eq!(config.remove_rule("**/*.html", Some(&drop)), 1);
        assert_eq!(config.rules().len(), 2);
        assert!(config.rules()[0].uses_factory(&keep));

        assert_eq!(config.remove_rule("**/*.css", None), 1);
        assert_eq!(config.remove_rule("**/*.js", None), 0);
        assert_eq!(config.rules().len(), 1);
    }

    #[test]
    fn test_resolve_passthrough_and_cache() {
        let mut config = ProjectConfig::default();
        config.add_rule("**/*.html", noop(), Value::Null).unwrap();

        assert!(config.resolve("img/logo.png").is_none());

        let a = config.resolve("index.html").unwrap();
        let b = config.resolve("about/index.html").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(config.cached_shapes(), 1);
    }

    #[test]
    fn test_rule_change_invalidates_cache() {
        let mut config = ProjectConfig::default();
        let factory = noop();
        config.add_rule("**/*.html", factory.clone(), Value::Null).unwrap();
        let before = config.resolve("index.html").unwrap();
        assert_eq!(before.rules().len(), 1);

        config.add_rule("**/*", factory.clone(), Value::Null).unwrap();
        assert_eq!(config.cached_shapes(), 0);
        let after = config.resolve("index.html").unwrap();
        assert_eq!(after.rules().len(), 2);

        config.remove_rule("**/*", None);
        assert_eq!(config.cached_shapes(), 0);
        assert_eq!(config.resolve("index.html").unwrap().rules().len(), 1);
    }

    #[test]
    fn test_for_project_keeps_rules() {
        let mut template = ProjectConfig::default();
        template.add_rule("**/*.html", noop(), Value::Null).unwrap();

        let project = template.for_project("/real/p1", "p1", "demo-project");
        assert_eq!(project.prefix(), "/p1");
        assert_eq!(project.name(), "demo-project");
        assert_eq!(project.rules().len(), 1);
        assert_eq!(project.rules()[0].id(), template.rules()[0].id());
    }
}
