//! Bounded-concurrency batch conversion.
//!
//! Each object is handled by its own task; a semaphore caps how many run
//! at once. Per-item failures are logged and counted, never propagated, so
//! one bad file cannot stop the rest of the batch.

pub mod item;

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::progress::{NoProgress, Progress};
use crate::storage::{ObjectRef, Storage};

pub use item::{ItemOutcome, ItemStage};

/// Upper bound on concurrent workers.
pub const MAX_WORKERS: usize = 10;

/// Requested worker count limited to `1..=MAX_WORKERS`.
pub fn clamp_workers(requested: usize) -> usize {
    requested.clamp(1, MAX_WORKERS)
}

#[derive(Debug, Clone)]
pub struct BatchJob {
    pub objects: Vec<ObjectRef>,
    pub workers: usize,
    pub remove_source: bool,
}

/// Counts of terminal item states for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    /// Sorted references of every failed item.
    pub failed_objects: Vec<ObjectRef>,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.skipped + self.cancelled
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    fn record(&mut self, object: ObjectRef, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Converted { .. } => self.succeeded += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Cancelled => self.cancelled += 1,
            ItemOutcome::Failed { .. } => {
                self.failed += 1;
                self.failed_objects.push(object);
            }
        }
    }
}

/// Stops a running batch from starting new items. Items already in flight
/// run to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct Pipeline {
    storage: Arc<dyn Storage>,
    progress: Arc<dyn Progress>,
    cancel: CancelHandle,
}

impl Pipeline {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            progress: Arc::new(NoProgress),
            cancel: CancelHandle::default(),
        }
    }

    /// Observer notified once per item that reaches a terminal state.
    pub fn with_progress(mut self, progress: Arc<dyn Progress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Candidate sources for a batch.
    pub async fn list(&self, extension: &str) -> Result<Vec<ObjectRef>> {
        self.storage.list_filtered(extension).await
    }

    /// Process every object in `job` and report how each one ended.
    pub async fn run(&self, job: BatchJob) -> BatchSummary {
        let workers = clamp_workers(job.workers);
        if workers != job.workers {
            warn!(requested = job.workers, workers, "worker count clamped");
        }

        let objects = dedup(job.objects);
        info!(
            items = objects.len(),
            workers,
            remove_source = job.remove_source,
            "batch started"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        let mut task_objects = HashMap::with_capacity(objects.len());
        for object in objects {
            let storage = Arc::clone(&self.storage);
            let progress = Arc::clone(&self.progress);
            let semaphore = Arc::clone(&semaphore);
            let cancel = self.cancel.clone();
            let remove_source = job.remove_source;
            let key = object.clone();

            let handle = tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) if !cancel.is_cancelled() => {
                        item::process(storage.as_ref(), &object, remove_source).await
                    }
                    _ => ItemOutcome::Cancelled,
                };
                progress.on_item(1);
                (object, outcome)
            });
            task_objects.insert(handle.id(), key);
        }

        let mut summary = BatchSummary::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((object, outcome)) => summary.record(object, outcome),
                Err(e) => {
                    let object = task_objects.remove(&e.id());
                    error!(object = ?object, error = %e, "item task aborted");
                    self.progress.on_item(1);
                    summary.failed += 1;
                    summary.failed_objects.extend(object);
                }
            }
        }
        summary.failed_objects.sort();

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "batch finished"
        );
        summary
    }
}

/// Drop repeated references, keeping first occurrences in order.
fn dedup(objects: Vec<ObjectRef>) -> Vec<ObjectRef> {
    let mut seen = HashSet::with_capacity(objects.len());
    objects
        .into_iter()
        .filter(|o| seen.insert(o.clone()))
        .collect()
}
