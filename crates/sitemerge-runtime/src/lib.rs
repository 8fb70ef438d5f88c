//! Sitemerge Runtime
//!
//! This crate runs exports: it enumerates each project, pushes every file
//! through its pipeline and writes the results into the merged tree.
//!
//! # Features
//!
//! - Concurrent file pipelines with bounded queues
//! - Copy and symlink writers joined by a completion barrier
//! - Per-project state tracking and reporting
//!
//! # Usage
//!
//! ```rust,ignore
//! use sitemerge_runtime::Exporter;
//!
//! let exporter = Exporter::from_config(&config)?;
//! let report = exporter.export("./site".as_ref(), "./out".as_ref()).await?;
//! assert!(report.is_success());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod executor;
pub mod jobs;
pub mod writer;

pub use engine::Exporter;
pub use error::{Error, Result};
pub use jobs::{ExportReport, ProjectOutcome, ProjectState};
