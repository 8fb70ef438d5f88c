//! Error types for sitemerge-core

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias for sitemerge-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in sitemerge-core
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file could not be found
    #[error("configuration file not found: {path}")]
    ConfigNotFound {
        /// Path that was searched
        path: String,
    },

    /// Failed to parse YAML configuration
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {message}")]
    ConfigInvalid {
        /// Description of what's invalid
        message: String,
    },

    /// Glob pattern could not be compiled
    #[error("invalid glob pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The pattern that failed
        pattern: String,
        /// Error message from the glob compiler
        message: String,
    },

    /// A pipeline stage could not be created or failed while processing
    #[error("stage '{stage}' failed: {message}")]
    Stage {
        /// Name of the stage
        stage: String,
        /// Description of the error
        message: String,
    },

    /// Manifest file exists but could not be used
    #[error("manifest {}: {message}", path.display())]
    Manifest {
        /// Manifest file path
        path: PathBuf,
        /// Description of the error
        message: String,
    },

    /// An output path would land outside its project
    #[error("output path {} leaves the project root", path.display())]
    OutsideProject {
        /// Offending entry path
        path: PathBuf,
    },

    /// Directory walk failed
    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Invalid regex in a stage configuration
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure scoped to a single file
    #[error(transparent)]
    File(#[from] FileImportError),

    /// Failure scoped to a whole project
    #[error(transparent)]
    Project(#[from] ProjectImportError),
}

impl Error {
    /// Shorthand for a stage failure
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

/// An error raised while importing one file.
///
/// The original error is kept intact as the `source`, only the rendered
/// message gains the offending path.
#[derive(Error, Debug)]
#[error("{source} in file {}", file.display())]
pub struct FileImportError {
    /// Path of the file whose pipeline failed
    pub file: PathBuf,
    /// The underlying error
    pub source: Box<Error>,
}

impl FileImportError {
    /// Wrap `err` as a failure of `file`
    pub fn new(file: impl AsRef<Path>, err: impl Into<Error>) -> Self {
        Self {
            file: file.as_ref().to_path_buf(),
            source: Box::new(err.into()),
        }
    }

    /// The error originally raised inside the pipeline
    pub fn cause(&self) -> &Error {
        &self.source
    }
}

/// An error that failed a whole project export.
#[derive(Error, Debug)]
#[error("{source} of project {prefix}")]
pub struct ProjectImportError {
    /// URL prefix of the failed project
    pub prefix: String,
    /// The underlying error
    pub source: Box<Error>,
}

impl ProjectImportError {
    /// Wrap `err` as a failure of the project mounted at `prefix`
    pub fn new(prefix: impl Into<String>, err: impl Into<Error>) -> Self {
        Self {
            prefix: prefix.into(),
            source: Box::new(err.into()),
        }
    }

    /// The error originally raised, unwrapped from any file-level wrapper
    pub fn root_cause(&self) -> &Error {
        match self.source.as_ref() {
            Error::File(file) => file.cause(),
            other => other,
        }
    }

    /// The file that triggered the failure, if the failure was file-scoped
    pub fn file(&self) -> Option<&Path> {
        match self.source.as_ref() {
            Error::File(file) => Some(&file.file),
            _ => None,
        }
    }
}
