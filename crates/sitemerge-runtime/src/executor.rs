//! File pipeline execution
//!
//! Every file is decorated with its project identity, routed to the chain
//! shape matching its path and pushed through freshly created stages. The
//! dispatcher runs up to `concurrency` file pipelines at once and forwards
//! their outputs to the writers.

use std::sync::Arc;

use sitemerge_core::{FileEntry, ProjectConfig, Stage};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinError, JoinSet};

use crate::error::{Error, FileImportError, Result};

/// Run one file through the pipeline of `project`
///
/// Files no rule matches are returned untouched, without building a chain.
pub async fn run_pipeline(
    project: &ProjectConfig,
    mut entry: FileEntry,
) -> std::result::Result<Vec<FileEntry>, FileImportError> {
    entry.assign_project(project.prefix());

    let Some(shape) = project.resolve(entry.relative()) else {
        tracing::trace!(file = %entry.relative().display(), "no rules, passing through");
        return Ok(vec![entry]);
    };

    let file = entry.original_path().to_path_buf();
    tracing::debug!(
        prefix = %project.prefix(),
        file = %entry.relative().display(),
        rules = shape.rules().len(),
        "transforming"
    );

    let stages = shape
        .instantiate()
        .map_err(|e| FileImportError::new(&file, e))?;
    run_chain(stages, entry)
        .await
        .map_err(|e| FileImportError::new(&file, e))
}

/// Feed `entry` through `stages` in order
///
/// Every entry a stage emits is fed to the next stage; whatever a stage
/// emits from `finish` joins the same batch.
pub async fn run_chain(stages: Vec<Box<dyn Stage>>, entry: FileEntry) -> Result<Vec<FileEntry>> {
    let mut batch = vec![entry];
    for mut stage in stages {
        let mut next = Vec::with_capacity(batch.len());
        for entry in batch {
            tracing::trace!(stage = stage.name(), file = %entry.relative().display(), "stage");
            next.extend(stage.process(entry).await?);
        }
        next.extend(stage.finish().await?);
        batch = next;
    }
    Ok(batch)
}

/// Totals of one dispatch run
#[derive(Debug, Default)]
pub struct DispatchSummary {
    /// Files scheduled
    pub files: usize,

    /// Entries forwarded to the writers
    pub outputs: usize,

    /// Files whose pipeline failed
    pub failed: usize,

    /// First error raised
    pub error: Option<Error>,
}

impl DispatchSummary {
    fn record(
        &mut self,
        done: std::result::Result<std::result::Result<usize, FileImportError>, JoinError>,
    ) {
        match done {
            Ok(Ok(outputs)) => self.outputs += outputs,
            Ok(Err(e)) => {
                self.failed += 1;
                tracing::warn!(error = %e, "file pipeline failed");
                self.fail(Error::File(e));
            }
            Err(e) => {
                self.failed += 1;
                self.fail(Error::Io(std::io::Error::other(e)));
            }
        }
    }

    fn fail(&mut self, err: Error) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }
}

/// Drive every entry of `input` through its pipeline
///
/// Stops scheduling new files after the first failure; pipelines already
/// running finish and their outputs are still forwarded.
pub async fn dispatch(
    project: Arc<ProjectConfig>,
    mut input: mpsc::Receiver<Result<FileEntry>>,
    output: mpsc::Sender<FileEntry>,
    concurrency: usize,
) -> DispatchSummary {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut summary = DispatchSummary::default();

    while let Some(item) = input.recv().await {
        while let Some(done) = tasks.try_join_next() {
            summary.record(done);
        }
        if summary.error.is_some() {
            break;
        }

        let entry = match item {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(prefix = %project.prefix(), error = %e, "enumeration failed");
                summary.fail(e);
                break;
            }
        };

        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        summary.files += 1;

        let project = project.clone();
        let output = output.clone();
        tasks.spawn(async move {
            let _permit = permit;
            let entries = run_pipeline(&project, entry).await?;
            let count = entries.len();
            for entry in entries {
                if output.send(entry).await.is_err() {
                    tracing::debug!("writer closed, dropping output");
                    break;
                }
            }
            Ok::<_, FileImportError>(count)
        });
    }
    drop(input);

    while let Some(done) = tasks.join_next().await {
        summary.record(done);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rstest::rstest;
    use serde_json::Value;
    use sitemerge_core::rule::factory_fn;
    use sitemerge_core::{Contents, StageFactory};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts the entries it processed and stamps the count
    struct Counter {
        seen: usize,
    }

    #[async_trait]
    impl Stage for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        async fn process(&mut self, mut entry: FileEntry) -> Result<Vec<FileEntry>> {
            self.seen += 1;
            tokio::time::sleep(Duration::from_millis(5)).await;
            entry.meta.insert("seen".into(), Value::from(self.seen));
            Ok(vec![entry])
        }
    }

    /// Emits a `.min` copy next to every entry, and a trailer on finish
    struct Split {
        base: Option<std::path::PathBuf>,
    }

    #[async_trait]
    impl Stage for Split {
        fn name(&self) -> &str {
            "split"
        }

        async fn process(&mut self, entry: FileEntry) -> Result<Vec<FileEntry>> {
            let mut copy = FileEntry::new(
                entry.path().with_extension("min.js"),
                entry.base(),
                Contents::Empty,
            );
            copy.assign_project(&entry.prefix);
            self.base = Some(entry.base().to_path_buf());
            Ok(vec![entry, copy])
        }

        async fn finish(&mut self) -> Result<Vec<FileEntry>> {
            let Some(base) = self.base.take() else {
                return Ok(Vec::new());
            };
            Ok(vec![FileEntry::new(base.join("trailer.txt"), base, Contents::Empty)])
        }
    }

    struct Fail;

    #[async_trait]
    impl Stage for Fail {
        fn name(&self) -> &str {
            "fail"
        }

        async fn process(&mut self, _entry: FileEntry) -> Result<Vec<FileEntry>> {
            Err(Error::stage("fail", "boom"))
        }
    }

    /// Tracks how many pipelines are inside the stage at once
    #[derive(Default)]
    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    struct Measure(Arc<Gauge>);

    #[async_trait]
    impl Stage for Measure {
        fn name(&self) -> &str {
            "measure"
        }

        async fn process(&mut self, entry: FileEntry) -> Result<Vec<FileEntry>> {
            let now = self.0.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.0.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.0.current.fetch_sub(1, Ordering::SeqCst);
            Ok(vec![entry])
        }
    }

    fn counter() -> Arc<dyn StageFactory> {
        factory_fn("counter", |_| Ok(Box::new(Counter { seen: 0 })))
    }

    fn entry(rel: &str, body: &str) -> FileEntry {
        FileEntry::new(
            std::path::Path::new("/src/p1").join(rel),
            "/src/p1",
            Contents::from(body.to_string()),
        )
    }

    #[tokio::test]
    async fn test_passthrough_keeps_bytes() {
        let mut project = ProjectConfig::new("/src/p1", "p1");
        project.add_rule("**/*.html", counter(), Value::Null).unwrap();

        let body = "\u{0}binary\u{ff} stays";
        let mut out = run_pipeline(&project, entry("img/a.bin", body)).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].url, "/p1/img/a.bin");
        assert!(out[0].meta.is_empty());
        assert_eq!(out[0].buffer().await.unwrap().as_slice(), body.as_bytes());
        assert_eq!(project.cached_shapes(), 0);
    }

    #[tokio::test]
    async fn test_stages_are_not_shared_between_files() {
        let mut project = ProjectConfig::new("/src/p1", "p1");
        project.add_rule("**/*.html", counter(), Value::Null).unwrap();
        let project = Arc::new(project);

        let mut handles = Vec::new();
        for i in 0..8 {
            let project = project.clone();
            handles.push(tokio::spawn(async move {
                run_pipeline(&project, entry(&format!("page{i}.html"), "x")).await
            }));
        }
        for handle in handles {
            let out = handle.await.unwrap().unwrap();
            assert_eq!(out[0].meta["seen"], 1);
        }
        assert_eq!(project.cached_shapes(), 1);
    }

    #[tokio::test]
    async fn test_fan_out_and_finish() {
        let mut project = ProjectConfig::new("/src/p1", "p1");
        let split = factory_fn("split", |_| Ok(Box::new(Split { base: None })));
        project.add_rule("**/*.js", split, Value::Null).unwrap();
        project.add_rule("**/*", counter(), Value::Null).unwrap();

        let out = run_pipeline(&project, entry("app.js", "x")).await.unwrap();
        let rels: Vec<_> = out.iter().map(FileEntry::relative_slash).collect();
        assert_eq!(rels, vec!["app.js", "app.min.js", "trailer.txt"]);
        let seen: Vec<_> = out.iter().map(|e| e.meta["seen"].as_u64().unwrap()).collect();
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_failure_carries_original_path() {
        let mut project = ProjectConfig::new("/src/p1", "p1");
        project
            .add_rule("**/*.css", factory_fn("fail", |_| Ok(Box::new(Fail))), Value::Null)
            .unwrap();

        let err = run_pipeline(&project, entry("css/site.css", "a{}")).await.unwrap_err();
        assert_eq!(err.file, std::path::Path::new("/src/p1/css/site.css"));
        assert_eq!(
            err.to_string(),
            "stage 'fail' failed: boom in file /src/p1/css/site.css"
        );
    }

    #[tokio::test]
    async fn test_stage_creation_failure() {
        let mut project = ProjectConfig::new("/src/p1", "p1");
        let broken = factory_fn("broken", |_| Err(Error::stage("broken", "bad args")));
        project.add_rule("**/*", broken, Value::Null).unwrap();

        let err = run_pipeline(&project, entry("a.txt", "")).await.unwrap_err();
        assert!(matches!(*err.source, Error::Stage { .. }));
    }

    #[tokio::test]
    async fn test_dispatch_forwards_everything() {
        let mut project = ProjectConfig::new("/src/p1", "p1");
        project.add_rule("**/*.html", counter(), Value::Null).unwrap();

        let (in_tx, in_rx) = mpsc::channel(2);
        let (out_tx, mut out_rx) = mpsc::channel(2);
        let feeder = tokio::spawn(async move {
            for i in 0..10 {
                in_tx.send(Ok(entry(&format!("f{i}.html"), "x"))).await.unwrap();
            }
        });
        let drained = Arc::new(AtomicUsize::new(0));
        let counter = drained.clone();
        let drain = tokio::spawn(async move {
            while out_rx.recv().await.is_some() {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        let summary = dispatch(Arc::new(project), in_rx, out_tx, 3).await;
        feeder.await.unwrap();
        drain.await.unwrap();

        assert!(summary.error.is_none());
        assert_eq!(summary.files, 10);
        assert_eq!(summary.outputs, 10);
        assert_eq!(drained.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_dispatch_stops_after_failure() {
        let mut project = ProjectConfig::new("/src/p1", "p1");
        project
            .add_rule("bad.txt", factory_fn("fail", |_| Ok(Box::new(Fail))), Value::Null)
            .unwrap();

        let (in_tx, in_rx) = mpsc::channel(1);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        tokio::spawn(async move {
            let _ = in_tx.send(Ok(entry("bad.txt", ""))).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            for i in 0..5 {
                if in_tx.send(Ok(entry(&format!("ok{i}.txt"), ""))).await.is_err() {
                    break;
                }
            }
        });

        let summary = dispatch(Arc::new(project), in_rx, out_tx, 1).await;
        assert_eq!(summary.failed, 1);
        assert!(matches!(summary.error, Some(Error::File(_))));
        assert!(summary.files < 6);

        let mut forwarded = 0;
        while out_rx.recv().await.is_some() {
            forwarded += 1;
        }
        assert_eq!(forwarded, summary.outputs);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[tokio::test]
    async fn test_dispatch_bounds_pipelines_in_flight(#[case] concurrency: usize) {
        let gauge = Arc::new(Gauge::default());
        let mut project = ProjectConfig::new("/src/p1", "p1");
        let shared = gauge.clone();
        let measure = factory_fn("measure", move |_| Ok(Box::new(Measure(shared.clone()))));
        project.add_rule("**/*", measure, Value::Null).unwrap();

        let (in_tx, in_rx) = mpsc::channel(16);
        for i in 0..12 {
            in_tx.send(Ok(entry(&format!("f{i}.txt"), "x"))).await.unwrap();
        }
        drop(in_tx);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let drain = tokio::spawn(async move { while out_rx.recv().await.is_some() {} });

        let summary = dispatch(Arc::new(project), in_rx, out_tx, concurrency).await;
        drain.await.unwrap();

        assert_eq!(summary.files, 12);
        let peak = gauge.peak.load(Ordering::SeqCst);
        assert!((1..=concurrency).contains(&peak), "peak {peak} over {concurrency}");
    }

    #[tokio::test]
    async fn test_dispatch_waits_for_full_writer_queue() {
        let project = ProjectConfig::new("/src/p1", "p1");
        let (in_tx, in_rx) = mpsc::channel(16);
        for i in 0..5 {
            in_tx.send(Ok(entry(&format!("f{i}.txt"), "x"))).await.unwrap();
        }
        drop(in_tx);
        let (out_tx, mut out_rx) = mpsc::channel(1);

        let running = tokio::spawn(dispatch(Arc::new(project), in_rx, out_tx, 2));
        tokio::time::sleep(Duration::from_millis(50)).await;
        // One queued entry, the rest held back by the full queue
        assert!(!running.is_finished());

        let mut received = 0;
        while out_rx.recv().await.is_some() {
            received += 1;
        }
        let summary = running.await.unwrap();
        assert_eq!(received, 5);
        assert_eq!(summary.outputs, 5);
    }
}
