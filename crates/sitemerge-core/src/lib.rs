//! Sitemerge Core Library
//!
//! This crate provides the building blocks for merging symlinked site
//! projects into one output tree:
//! - Configuration parsing and validation
//! - Transform rules, pipeline stages and per-path routing
//! - File entries and source tree enumeration
//! - Project boundary detection and naming
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │   Source    │────▶│   Router    │────▶│   Stages    │
//! │   (walk)    │     │  (rules)    │     │ (per file)  │
//! └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use sitemerge_core::{Config, ProjectDetector};
//!
//! let config = Config::load("./sitemerge.yaml")?;
//! let template = config.project_template()?;
//! for project in ProjectDetector::new().discover_projects("./site").await? {
//!     let project = template.for_project(&project.src, &project.prefix, &project.name);
//!     println!("{} -> {}", project.prefix(), project.src().display());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundary;
pub mod config;
pub mod entry;
pub mod error;
pub mod fs;
pub mod glob;
pub mod manifest;
pub mod project;
pub mod router;
pub mod rule;
pub mod source;
pub mod stages;
pub mod transforms;

pub use boundary::{ProjectBoundary, ProjectDetector};
pub use config::{Config, SiteConfig};
pub use entry::{Contents, FileEntry};
pub use error::{Error, FileImportError, ProjectImportError, Result};
pub use project::{MatchMode, ProjectConfig};
pub use router::ChainShape;
pub use rule::{RuleId, Stage, StageFactory, TransformRule, factory_fn};
pub use transforms::{StageKind, TransformConfig};
