//! Transform rules and pipeline stages
//!
//! A rule pairs a glob pattern with a stage *factory* and the arguments
//! captured at registration. Rules never hold live stages: every file that
//! matches gets brand-new instances from [`TransformRule::instantiate`], so
//! a stage may keep file-scoped state without leaking it to other files.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use crate::entry::FileEntry;
use crate::error::Result;
use crate::glob::Glob;

/// One step of a file pipeline
#[async_trait]
pub trait Stage: Send {
    /// Stage name, used in logs and errors
    fn name(&self) -> &str;

    /// Transform one entry into zero, one or many entries
    async fn process(&mut self, entry: FileEntry) -> Result<Vec<FileEntry>>;

    /// Emit anything held back once the input is exhausted
    async fn finish(&mut self) -> Result<Vec<FileEntry>> {
        Ok(Vec::new())
    }
}

/// Builds fresh [`Stage`] instances
pub trait StageFactory: Send + Sync {
    /// Name of the stages this factory builds
    fn name(&self) -> &str;

    /// Create a new, independent stage from the captured arguments
    fn create(&self, args: &Value) -> Result<Box<dyn Stage>>;
}

/// Factory backed by a closure
pub struct FnFactory<F> {
    name: String,
    f: F,
}

impl<F> StageFactory for FnFactory<F>
where
    F: Fn(&Value) -> Result<Box<dyn Stage>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn create(&self, args: &Value) -> Result<Box<dyn Stage>> {
        (self.f)(args)
    }
}

/// Wrap a closure as a shareable factory
pub fn factory_fn<F>(name: impl Into<String>, f: F) -> Arc<dyn StageFactory>
where
    F: Fn(&Value) -> Result<Box<dyn Stage>> + Send + Sync + 'static,
{
    Arc::new(FnFactory {
        name: name.into(),
        f,
    })
}

/// Process-unique rule identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(u64);

impl RuleId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A registered (pattern, factory, args) triple
#[derive(Clone)]
pub struct TransformRule {
    id: RuleId,
    glob: Glob,
    factory: Arc<dyn StageFactory>,
    args: Arc<Value>,
}

impl TransformRule {
    /// Compile `pattern` and allocate a new rule id
    pub fn new(pattern: &str, factory: Arc<dyn StageFactory>, args: Value) -> Result<Self> {
        Ok(Self {
            id: RuleId::next(),
            glob: Glob::new(pattern)?,
            factory,
            args: Arc::new(args),
        })
    }

    /// Rule identity
    pub fn id(&self) -> RuleId {
        self.id
    }

    /// Source glob pattern
    pub fn pattern(&self) -> &str {
        self.glob.as_str()
    }

    /// The registered factory
    pub fn factory(&self) -> &Arc<dyn StageFactory> {
        &self.factory
    }

    /// Arguments captured at registration
    pub fn args(&self) -> &Value {
        &self.args
    }

    /// Whether this rule was registered with exactly `factory`
    pub fn uses_factory(&self, factory: &Arc<dyn StageFactory>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.factory), Arc::as_ptr(factory))
    }

    /// Test a project-relative path against the pattern
    pub fn is_match(&self, path: impl AsRef<Path>) -> bool {
        self.glob.is_match(path)
    }

    /// Build a fresh stage for one file
    pub fn instantiate(&self) -> Result<Box<dyn Stage>> {
        self.factory.create(&self.args)
    }
}

impl fmt::Debug for TransformRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformRule")
            .field("id", &self.id)
            .field("pattern", &self.glob.as_str())
            .field("factory", &self.factory.name())
            .field("args", &self.args)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Contents;
    use crate::error::Error;

    struct Tag(String);

    #[async_trait]
    impl Stage for Tag {
        fn name(&self) -> &str {
            "tag"
        }

        async fn process(&mut self, mut entry: FileEntry) -> Result<Vec<FileEntry>> {
            entry.meta.insert("tag".into(), Value::String(self.0.clone()));
            Ok(vec![entry])
        }
    }

    fn tag_factory() -> Arc<dyn StageFactory> {
        factory_fn("tag", |args| {
            let tag = args
                .as_str()
                .ok_or_else(|| Error::stage("tag", "expected a string argument"))?;
            Ok(Box::new(Tag(tag.to_string())))
        })
    }

    #[test]
    fn test_rule_ids_are_unique() {
        let factory = tag_factory();
        let a = TransformRule::new("**/*", factory.clone(), Value::Null).unwrap();
        let b = TransformRule::new("**/*", factory, Value::Null).unwrap();
        assert_ne!(a.id(), b.id());
        assert!(a.id() < b.id());
    }

    #[test]
    fn test_uses_factory_by_reference() {
        let factory = tag_factory();
        let other = tag_factory();
        let rule = TransformRule::new("*.html", factory.clone(), Value::Null).unwrap();
        assert!(rule.uses_factory(&factory));
        assert!(!rule.uses_factory(&other));
    }

    #[tokio::test]
    async fn test_instantiate_uses_captured_args() {
        let rule = TransformRule::new("**/*.txt", tag_factory(), Value::from("blue")).unwrap();
        let mut stage = rule.instantiate().unwrap();
        let entry = FileEntry::new("/src/a.txt", "/src", Contents::Empty);
        let out = stage.process(entry).await.unwrap();
        assert_eq!(out[0].meta["tag"], "blue");
    }

    #[test]
    fn test_instantiate_error_from_bad_args() {
        let rule = TransformRule::new("**/*.txt", tag_factory(), Value::Null).unwrap();
        assert!(rule.instantiate().is_err());
    }
}
