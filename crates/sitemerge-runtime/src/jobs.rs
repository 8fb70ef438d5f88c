//! Project export jobs
//!
//! Every project of an export runs as one job that moves through
//! `Pending → Enumerating → Transforming → Writing → Done | Failed`.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::ProjectImportError;

/// Lifecycle of one project export
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectState {
    /// Not started
    Pending,
    /// Listing source files
    Enumerating,
    /// Running file pipelines
    Transforming,
    /// Waiting for the writers to drain
    Writing,
    /// Finished without error
    Done,
    /// Finished with an error
    Failed,
}

impl ProjectState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Enumerating => "enumerating",
            Self::Transforming => "transforming",
            Self::Writing => "writing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ProjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State tracker for one project
#[derive(Debug)]
pub struct ProjectJob {
    prefix: String,
    state: ProjectState,
}

impl ProjectJob {
    /// New job in `Pending`
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            state: ProjectState::Pending,
        }
    }

    /// Project prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Current state
    pub fn state(&self) -> ProjectState {
        self.state
    }

    /// Move to `next`; backwards moves and moves out of a terminal state are refused
    pub fn advance(&mut self, next: ProjectState) -> bool {
        if self.state.is_terminal() || next <= self.state {
            tracing::debug!(
                prefix = %self.prefix,
                from = %self.state,
                to = %next,
                "ignoring state change"
            );
            return false;
        }
        tracing::debug!(prefix = %self.prefix, from = %self.state, to = %next, "project state");
        self.state = next;
        true
    }
}

/// Result of exporting one project
#[derive(Debug)]
pub struct ProjectOutcome {
    /// URL prefix
    pub prefix: String,

    /// Display name
    pub name: String,

    /// Real source directory
    pub src: PathBuf,

    /// Final state, `Done` or `Failed`
    pub state: ProjectState,

    /// Files read from the source
    pub files: usize,

    /// Entries copied
    pub copied: usize,

    /// Entries linked
    pub linked: usize,

    /// The failure, when the project failed
    pub error: Option<ProjectImportError>,
}

impl ProjectOutcome {
    /// Whether the project exported cleanly
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Serializable view of the outcome
    pub fn summary(&self) -> ProjectSummary {
        ProjectSummary {
            prefix: self.prefix.clone(),
            name: self.name.clone(),
            src: self.src.clone(),
            state: self.state,
            files: self.files,
            copied: self.copied,
            linked: self.linked,
            error: self.error.as_ref().map(ToString::to_string),
        }
    }
}

/// Flat, serializable project outcome
#[derive(Debug, Clone, Serialize)]
pub struct ProjectSummary {
    /// URL prefix
    pub prefix: String,
    /// Display name
    pub name: String,
    /// Real source directory
    pub src: PathBuf,
    /// Final state
    pub state: ProjectState,
    /// Files read
    pub files: usize,
    /// Entries copied
    pub copied: usize,
    /// Entries linked
    pub linked: usize,
    /// Rendered error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One outcome per exported project
#[derive(Debug, Default)]
pub struct ExportReport {
    /// Outcomes in discovery order
    pub projects: Vec<ProjectOutcome>,
}

impl ExportReport {
    /// Number of projects exported
    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    /// Whether every project succeeded
    pub fn is_success(&self) -> bool {
        self.projects.iter().all(ProjectOutcome::is_ok)
    }

    /// Projects that failed
    pub fn failed(&self) -> impl Iterator<Item = &ProjectOutcome> {
        self.projects.iter().filter(|p| !p.is_ok())
    }

    /// Outcome for `prefix`
    pub fn project(&self, prefix: &str) -> Option<&ProjectOutcome> {
        self.projects.iter().find(|p| p.prefix == prefix)
    }

    /// Serializable view of every outcome
    pub fn summaries(&self) -> Vec<ProjectSummary> {
        self.projects.iter().map(ProjectOutcome::summary).collect()
    }
}
