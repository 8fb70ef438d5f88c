//! Pipeline routing
//!
//! Files that match the same set of rules share a cached [`ChainShape`],
//! the ordered list of rules to instantiate. The cache never holds running
//! stages; [`ChainShape::instantiate`] builds a new chain for every file.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::Result;
use crate::rule::{RuleId, Stage, TransformRule};

/// Ordered rules a file pipeline is built from
#[derive(Debug, Clone)]
pub struct ChainShape {
    rules: Vec<TransformRule>,
}

impl ChainShape {
    /// Shape for the given rules, in pipeline order
    pub fn new(rules: Vec<TransformRule>) -> Self {
        Self { rules }
    }

    /// Rules in pipeline order
    pub fn rules(&self) -> &[TransformRule] {
        &self.rules
    }

    /// Cache key: the ids of the rules, in order
    pub fn key(&self) -> Vec<RuleId> {
        self.rules.iter().map(TransformRule::id).collect()
    }

    /// Build one fresh stage per rule
    pub fn instantiate(&self) -> Result<Vec<Box<dyn Stage>>> {
        self.rules.iter().map(TransformRule::instantiate).collect()
    }
}

/// Shapes keyed by matched rule ids
#[derive(Debug, Default)]
pub struct PipelineCache {
    shapes: RwLock<HashMap<Vec<RuleId>, Arc<ChainShape>>>,
}

impl PipelineCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the shape for `matched`, inserting it on first use
    pub fn get_or_insert(&self, matched: Vec<TransformRule>) -> Arc<ChainShape> {
        let key: Vec<RuleId> = matched.iter().map(TransformRule::id).collect();
        if let Some(shape) = self.read().get(&key) {
            return shape.clone();
        }

        let mut shapes = self.write();
        shapes
            .entry(key)
            .or_insert_with(|| {
                tracing::debug!(rules = matched.len(), "caching new pipeline shape");
                Arc::new(ChainShape::new(matched))
            })
            .clone()
    }

    /// Drop every cached shape
    pub fn invalidate(&self) {
        self.write().clear();
    }

    /// Number of cached shapes
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<Vec<RuleId>, Arc<ChainShape>>> {
        self.shapes.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<Vec<RuleId>, Arc<ChainShape>>> {
        self.shapes.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clone for PipelineCache {
    /// Clones start empty; shapes are rebuilt against the clone's own rules
    fn clone(&self) -> Self {
        Self::new()
    }
}
