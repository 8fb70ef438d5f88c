//! Export engine

use std::path::Path;
use std::sync::Arc;

use sitemerge_core::fs as sfs;
use sitemerge_core::source::list_files;
use sitemerge_core::{Config, ProjectConfig, ProjectDetector};

use crate::error::{Error, ProjectImportError, Result};
use crate::executor::dispatch;
use crate::jobs::{ExportReport, ProjectJob, ProjectOutcome, ProjectState};
use crate::writer::{DualWriter, ExportSession};

/// Default number of file pipelines in flight per project
pub const DEFAULT_CONCURRENCY: usize = 16;

/// Default capacity of the queues between stages
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Exports every project of a site tree into one destination
pub struct Exporter {
    template: ProjectConfig,
    detector: ProjectDetector,
    concurrency: usize,
    channel_capacity: usize,
}

impl Exporter {
    /// Exporter applying the rules of `template` to every project
    pub fn new(template: ProjectConfig) -> Self {
        Self {
            template,
            detector: ProjectDetector::new(),
            concurrency: DEFAULT_CONCURRENCY,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Exporter built from a loaded configuration
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(config.project_template()?)
            .with_concurrency(config.site.concurrency)
            .with_channel_capacity(config.site.channel_capacity))
    }

    /// Limit file pipelines in flight per project
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the capacity of the internal queues
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Rules and settings every project starts from
    pub fn template(&self) -> &ProjectConfig {
        &self.template
    }

    /// Mutable access to the template, to register extra rules
    pub fn template_mut(&mut self) -> &mut ProjectConfig {
        &mut self.template
    }

    /// Project configs for every project found under `src`
    pub async fn projects(&self, src: &Path) -> Result<Vec<ProjectConfig>> {
        let boundaries = self.detector.discover_projects(src).await?;
        Ok(boundaries
            .iter()
            .map(|b| self.template.for_project(&b.src, &b.prefix, &b.name))
            .collect())
    }

    /// Export every project under `src` into `dest`
    ///
    /// Projects run concurrently; a failed project is reported in its
    /// outcome and does not stop the others. Errors returned here are
    /// ones that prevent the export from starting at all.
    pub async fn export(&self, src: &Path, dest: &Path) -> Result<ExportReport> {
        let projects = self.projects(src).await?;

        sfs::create_dir_all(dest).await?;
        let dest = tokio::fs::canonicalize(dest).await?;
        tracing::info!(
            src = %src.display(),
            dest = %dest.display(),
            projects = projects.len(),
            "starting export"
        );

        let outcomes = futures::future::join_all(
            projects
                .into_iter()
                .map(|project| self.export_project(project, &dest)),
        )
        .await;

        let report = ExportReport { projects: outcomes };
        tracing::info!(
            projects = report.project_count(),
            failed = report.failed().count(),
            "export finished"
        );
        Ok(report)
    }

    /// Export one project into the absolute directory `dest`
    pub async fn export_project(&self, project: ProjectConfig, dest: &Path) -> ProjectOutcome {
        let mut job = ProjectJob::new(project.prefix());
        tracing::info!(
            prefix = %project.prefix(),
            name = %project.name(),
            src = %project.src().display(),
            "exporting project"
        );

        let mut outcome = ProjectOutcome {
            prefix: project.prefix().to_string(),
            name: project.name().to_string(),
            src: project.src().to_path_buf(),
            state: ProjectState::Pending,
            files: 0,
            copied: 0,
            linked: 0,
            error: None,
        };

        let ignore = match project.ignore_globs() {
            Ok(ignore) => ignore,
            Err(e) => return finish(job, outcome, Some(e)),
        };

        job.advance(ProjectState::Enumerating);
        let project = Arc::new(project);
        let input = list_files(
            project.src(),
            ignore,
            project.buffer,
            self.channel_capacity,
        );
        let writer = DualWriter::spawn(
            Arc::new(ExportSession::new(dest)),
            self.channel_capacity,
        );

        job.advance(ProjectState::Transforming);
        let dispatched = dispatch(project, input, writer.sender(), self.concurrency).await;
        outcome.files = dispatched.files;

        job.advance(ProjectState::Writing);
        let mut error = dispatched.error;
        match writer.finish().await {
            Ok(written) => {
                outcome.copied = written.copied;
                outcome.linked = written.linked;
                error = error.or(written.error);
            }
            Err(e) => error = error.or(Some(e)),
        }

        finish(job, outcome, error)
    }
}

fn finish(
    mut job: ProjectJob,
    mut outcome: ProjectOutcome,
    error: Option<Error>,
) -> ProjectOutcome {
    match error {
        Some(e) => {
            job.advance(ProjectState::Failed);
            let err = ProjectImportError::new(job.prefix(), e);
            tracing::warn!(error = %err, "project failed");
            outcome.error = Some(err);
        }
        None => {
            job.advance(ProjectState::Done);
            tracing::info!(
                prefix = %job.prefix(),
                files = outcome.files,
                copied = outcome.copied,
                linked = outcome.linked,
                "project done"
            );
        }
    }
    outcome.state = job.state();
    outcome
}
