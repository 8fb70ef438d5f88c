//! Runtime error types
//!
//! The runtime raises the same errors as the core library; file and project
//! failures are wrapped so the offending path and prefix stay attached.

pub use sitemerge_core::error::{Error, FileImportError, ProjectImportError, Result};
