//! Dual destination writer
//!
//! Transformed entries are routed by their `symlink` flag: flagged entries
//! become symlinks to their original source file, everything else is
//! copied. Each writer drains its own bounded queue and checks in at a
//! [`CompletionBarrier`] once its queue is closed and empty.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sitemerge_core::fs as sfs;
use sitemerge_core::{Contents, FileEntry};
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Fires once after a fixed number of parties have arrived
#[derive(Debug)]
pub struct CompletionBarrier {
    pending: AtomicUsize,
    done: watch::Sender<bool>,
}

impl CompletionBarrier {
    /// Barrier waiting for `parties` arrivals
    pub fn new(parties: usize) -> Self {
        let (done, _) = watch::channel(parties == 0);
        Self {
            pending: AtomicUsize::new(parties),
            done,
        }
    }

    /// Record one arrival; the last one fires the barrier
    pub fn arrive(&self) {
        let previous = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if previous == Ok(1) {
            self.done.send_replace(true);
        }
    }

    /// Arrivals still missing
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the barrier has fired
    pub fn is_done(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait until the barrier fires
    pub async fn wait(&self) {
        let mut rx = self.done.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// State shared by the writers of one project export
#[derive(Debug)]
pub struct ExportSession {
    dest: PathBuf,
    dirs: Mutex<HashSet<PathBuf>>,
}

impl ExportSession {
    /// Session writing under `dest`, which must be absolute
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Self {
            dest: dest.into(),
            dirs: Mutex::new(HashSet::new()),
        }
    }

    /// Destination root
    pub fn dest(&self) -> &Path {
        &self.dest
    }

    /// Output location of `entry`: destination root, project prefix, relative path
    ///
    /// Fails when the relative path climbs out of the project or is absolute.
    pub fn output_path(&self, entry: &FileEntry) -> Result<PathBuf> {
        let mut out = self.dest.join(entry.prefix.trim_start_matches('/'));
        let mut depth = 0usize;
        for component in entry.relative().components() {
            match component {
                Component::Normal(part) => {
                    out.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir if depth > 0 => {
                    out.pop();
                    depth -= 1;
                }
                _ => {
                    return Err(Error::OutsideProject {
                        path: entry.path().to_path_buf(),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Create `dir` unless this session already did
    pub async fn ensure_dir(&self, dir: &Path) -> std::io::Result<()> {
        if self.dirs().contains(dir) {
            return Ok(());
        }
        sfs::create_dir_all(dir).await?;
        self.dirs().insert(dir.to_path_buf());
        Ok(())
    }

    fn dirs(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.dirs.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn ensure_parent(&self, path: &Path) -> std::io::Result<()> {
        match path.parent() {
            Some(parent) => self.ensure_dir(parent).await,
            None => Ok(()),
        }
    }
}

/// Write the contents of `entry` to its output path
pub async fn copy_entry(session: &ExportSession, mut entry: FileEntry) -> Result<PathBuf> {
    let out = session.output_path(&entry)?;
    session.ensure_parent(&out).await?;

    // A link left by an earlier export would be written through into the source
    if sfs::is_symlink(&out).await {
        tokio::fs::remove_file(&out).await?;
    }

    match std::mem::replace(&mut entry.contents, Contents::Empty) {
        Contents::Buffer(buf) => tokio::fs::write(&out, buf).await?,
        Contents::Stream(mut stream) => {
            let mut file = tokio::fs::File::create(&out).await?;
            tokio::io::copy(&mut stream, &mut file).await?;
            file.flush().await?;
        }
        Contents::Empty => tokio::fs::write(&out, b"").await?,
    }

    tracing::trace!(file = %out.display(), "copied");
    Ok(out)
}

/// Link the output path of `entry` to the file it was read from
pub async fn link_entry(session: &ExportSession, entry: FileEntry) -> Result<PathBuf> {
    let out = session.output_path(&entry)?;
    let original = entry.original_path().to_path_buf();
    drop(entry);
    session.ensure_parent(&out).await?;

    let dir = out.parent().unwrap_or(session.dest());
    let target = sfs::relative_path(&original, dir);
    sfs::symlink(&target, &out).await?;

    tracing::trace!(file = %out.display(), target = %target.display(), "linked");
    Ok(out)
}

/// Totals of one writer
#[derive(Debug, Default)]
pub struct WriterStats {
    /// Entries written
    pub written: usize,

    /// Entries that failed to write
    pub failed: usize,

    /// First write error
    pub error: Option<Error>,
}

impl WriterStats {
    fn record(&mut self, result: Result<PathBuf>) {
        match result {
            Ok(_) => self.written += 1,
            Err(e) => {
                self.failed += 1;
                tracing::warn!(error = %e, "write failed");
                if self.error.is_none() {
                    self.error = Some(e);
                }
            }
        }
    }
}

/// Totals of both writers
#[derive(Debug, Default)]
pub struct WriteSummary {
    /// Entries copied
    pub copied: usize,

    /// Entries linked
    pub linked: usize,

    /// Entries that failed to write
    pub failed: usize,

    /// First write error
    pub error: Option<Error>,
}

/// Running copy and symlink writers behind one input queue
pub struct DualWriter {
    input: mpsc::Sender<FileEntry>,
    barrier: Arc<CompletionBarrier>,
    router: JoinHandle<()>,
    copy: JoinHandle<WriterStats>,
    link: JoinHandle<WriterStats>,
}

impl DualWriter {
    /// Spawn the router and both writers for `session`
    pub fn spawn(session: Arc<ExportSession>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (input, mut routed) = mpsc::channel::<FileEntry>(capacity);
        let (copy_tx, mut copy_rx) = mpsc::channel::<FileEntry>(capacity);
        let (link_tx, mut link_rx) = mpsc::channel::<FileEntry>(capacity);
        let barrier = Arc::new(CompletionBarrier::new(2));

        let router = tokio::spawn(async move {
            while let Some(entry) = routed.recv().await {
                let target = if entry.symlink { &link_tx } else { &copy_tx };
                if target.send(entry).await.is_err() {
                    break;
                }
            }
        });

        let copy = tokio::spawn({
            let session = session.clone();
            let barrier = barrier.clone();
            async move {
                let mut stats = WriterStats::default();
                while let Some(entry) = copy_rx.recv().await {
                    stats.record(copy_entry(&session, entry).await);
                }
                barrier.arrive();
                stats
            }
        });

        let link = tokio::spawn({
            let barrier = barrier.clone();
            async move {
                let mut stats = WriterStats::default();
                while let Some(entry) = link_rx.recv().await {
                    stats.record(link_entry(&session, entry).await);
                }
                barrier.arrive();
                stats
            }
        });

        Self {
            input,
            barrier,
            router,
            copy,
            link,
        }
    }

    /// Sender transformed entries are pushed into
    pub fn sender(&self) -> mpsc::Sender<FileEntry> {
        self.input.clone()
    }

    /// The barrier both writers check in at
    pub fn barrier(&self) -> Arc<CompletionBarrier> {
        self.barrier.clone()
    }

    /// Close the input and wait for both writers to drain
    pub async fn finish(self) -> Result<WriteSummary> {
        let Self {
            input,
            barrier,
            router,
            copy,
            link,
        } = self;
        drop(input);

        router.await.map_err(join_error)?;
        barrier.wait().await;

        let copy = copy.await.map_err(join_error)?;
        let link = link.await.map_err(join_error)?;

        Ok(WriteSummary {
            copied: copy.written,
            linked: link.written,
            failed: copy.failed + link.failed,
            error: copy.error.or(link.error),
        })
    }
}

fn join_error(e: tokio::task::JoinError) -> Error {
    Error::Io(std::io::Error::other(e))
}
