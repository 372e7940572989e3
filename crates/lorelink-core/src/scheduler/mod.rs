//! Batch scheduler
//!
//! Drives relationship generation at graph scale. Scheduling claims a graph
//! with a compare-and-swap on its progress record and hands the job to a
//! background worker over a channel; the caller never waits for the job.
//! Each job walks every unordered entity pair in fixed-size batches, pausing
//! between batches, and reports progress through the ephemeral store.

mod progress;
mod rate_limit;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::cache::EphemeralStore;
use crate::config::SchedulerConfig;
use crate::domain::GraphStore;
use crate::error::{Error, Result};
use crate::prediction::{RelationshipPredictor, entity_pairs};

use progress::ProgressBoard;

pub use progress::{JobStatus, ProgressRecord, progress_key};
pub use rate_limit::{RateLimiter, RateSlot, rate_key};

/// A claimed job waiting for the worker
#[derive(Debug)]
struct Job {
    graph_id: String,
    job_id: String,
}

/// Outcome of one pass over every graph
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub scheduled: Vec<String>,
    pub skipped: Vec<String>,
}

struct Inner {
    graph: Arc<dyn GraphStore>,
    predictor: Arc<RelationshipPredictor>,
    board: ProgressBoard,
    limiter: RateLimiter,
    config: SchedulerConfig,
    tracker: TaskTracker,
    /// Jobs sent to the worker that have not finished yet
    outstanding: AtomicUsize,
    idle: Notify,
}

/// Schedules and runs generation jobs, one per graph at a time
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<Inner>,
    queue: mpsc::UnboundedSender<Job>,
}

impl BatchScheduler {
    /// Create a scheduler and start its worker
    ///
    /// Must be called from within a tokio runtime. The worker stops once every
    /// clone of the scheduler has been dropped.
    pub fn new(
        graph: Arc<dyn GraphStore>,
        predictor: Arc<RelationshipPredictor>,
        cache: Arc<dyn EphemeralStore>,
        config: SchedulerConfig,
    ) -> Self {
        let inner = Arc::new(Inner {
            graph,
            predictor,
            board: ProgressBoard::new(cache.clone(), config.progress_ttl()),
            limiter: RateLimiter::new(cache, config.max_jobs_per_window, config.rate_window()),
            config,
            tracker: TaskTracker::new(),
            outstanding: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let (queue, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker(inner.clone(), rx));

        Self { inner, queue }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Queue a generation job for a graph
    ///
    /// Returns `false` without touching the existing record when a job is
    /// already queued or running for the graph, when the graph's rate window
    /// is full, or when a concurrent scheduler claimed the graph first.
    pub async fn schedule_generation_job(&self, graph_id: &str) -> Result<bool> {
        let inner = &self.inner;
        if !inner.graph.graph_exists(graph_id).await? {
            return Err(Error::GraphNotFound(graph_id.to_string()));
        }

        let current = inner.board.get_versioned(graph_id).await?;
        if let Some(seen) = &current {
            if seen.record.status.is_active() {
                info!(
                    graph_id = %graph_id,
                    job_id = %seen.record.job_id,
                    status = %seen.record.status,
                    "Job already active, not scheduling"
                );
                return Ok(false);
            }
        }

        let Some(slot) = inner.limiter.try_acquire(graph_id).await? else {
            warn!(
                graph_id = %graph_id,
                max_jobs = inner.config.max_jobs_per_window,
                window_secs = inner.config.rate_window_secs,
                "Rate limit reached, not scheduling"
            );
            return Ok(false);
        };

        let record = ProgressRecord::queued(graph_id);
        let claimed = inner.board.swap(current.as_ref(), &record).await;
        if !matches!(claimed, Ok(true)) {
            // the slot only counts once a job is actually queued
            if let Err(e) = inner.limiter.release(graph_id, slot).await {
                warn!(graph_id = %graph_id, error = %e, "Could not release rate slot");
            }
        }
        if !claimed? {
            info!(graph_id = %graph_id, "Graph claimed by another scheduler");
            return Ok(false);
        }

        inner.outstanding.fetch_add(1, Ordering::SeqCst);
        let job = Job {
            graph_id: graph_id.to_string(),
            job_id: record.job_id.clone(),
        };
        if self.queue.send(job).is_err() {
            inner.finish_one();
            inner
                .mark_failed(graph_id, &record.job_id, "scheduler worker stopped")
                .await;
            return Err(Error::Other("scheduler worker stopped".to_string()));
        }

        info!(graph_id = %graph_id, job_id = %record.job_id, "Scheduled generation job");
        Ok(true)
    }

    /// Run a generation job for a graph on the calling task
    ///
    /// Claims the graph the same way scheduling does but skips the rate limit.
    /// A failure inside the job is recorded on the progress record and
    /// returned as [`Error::JobFailed`].
    pub async fn process_graph(&self, graph_id: &str) -> Result<ProgressRecord> {
        let inner = &self.inner;
        if !inner.graph.graph_exists(graph_id).await? {
            return Err(Error::GraphNotFound(graph_id.to_string()));
        }

        let current = inner.board.get_versioned(graph_id).await?;
        if let Some(seen) = &current {
            if seen.record.status.is_active() {
                return Err(Error::InvalidInput(format!(
                    "graph {} already has a {} job",
                    graph_id, seen.record.status
                )));
            }
        }

        let record = ProgressRecord::queued(graph_id).started();
        if !inner.board.swap(current.as_ref(), &record).await? {
            return Err(Error::InvalidInput(format!(
                "graph {} was claimed by another scheduler",
                graph_id
            )));
        }
        inner.execute(record).await
    }

    pub async fn get_progress(&self, graph_id: &str) -> Result<Option<ProgressRecord>> {
        self.inner.board.get(graph_id).await
    }

    /// Cancel a job that has not started yet
    ///
    /// A running job is never interrupted, so this returns `false` for it.
    pub async fn cancel_job(&self, graph_id: &str) -> Result<bool> {
        let Some(seen) = self.inner.board.get_versioned(graph_id).await? else {
            return Ok(false);
        };
        if seen.record.status != JobStatus::Queued {
            debug!(graph_id = %graph_id, status = %seen.record.status, "Nothing to cancel");
            return Ok(false);
        }

        let mut cancelled = seen.record.clone();
        cancelled.finish(JobStatus::Cancelled, None);
        let swapped = self.inner.board.swap(Some(&seen), &cancelled).await?;
        if swapped {
            info!(graph_id = %graph_id, job_id = %cancelled.job_id, "Cancelled queued job");
        }
        Ok(swapped)
    }

    /// Schedule a job for every graph, pausing between graphs
    pub async fn refresh_all_graphs(&self) -> Result<RefreshReport> {
        let graphs = self.inner.graph.list_graphs().await?;
        let mut report = RefreshReport::default();

        for (index, graph) in graphs.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.inner.config.stagger()).await;
            }
            match self.schedule_generation_job(&graph.id).await {
                Ok(true) => report.scheduled.push(graph.id.clone()),
                Ok(false) => report.skipped.push(graph.id.clone()),
                Err(e) => {
                    warn!(graph_id = %graph.id, code = e.code(), error = %e, "Refresh could not schedule graph");
                    report.skipped.push(graph.id.clone());
                }
            }
        }

        info!(
            graphs = graphs.len(),
            scheduled = report.scheduled.len(),
            skipped = report.skipped.len(),
            "Refresh pass finished"
        );
        Ok(report)
    }

    /// Refresh all graphs on the configured interval until `shutdown` fires
    pub async fn run_periodic_refresh(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.inner.config.refresh_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.inner.config.refresh_interval_secs,
            "Periodic refresh started"
        );
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Periodic refresh stopping");
                    break;
                }

                _ = interval.tick() => {
                    if let Err(e) = self.refresh_all_graphs().await {
                        error!(code = e.code(), error = %e, "Refresh pass failed");
                    }
                }
            }
        }
    }

    /// Wait until every scheduled job has finished
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Wait for outstanding jobs, then close the job tracker
    pub async fn shutdown(&self) {
        self.wait_idle().await;
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("config", &self.inner.config)
            .field("outstanding", &self.inner.outstanding.load(Ordering::SeqCst))
            .finish()
    }
}

async fn worker(inner: Arc<Inner>, mut rx: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = rx.recv().await {
        inner.dispatch(job);
    }
    debug!("Scheduler worker stopped");
}

impl Inner {
    /// Run a job on its own task so a panic only fails that graph
    fn dispatch(self: &Arc<Self>, job: Job) {
        let inner = self.clone();
        self.tracker.spawn(async move {
            let runner = inner.clone();
            let graph_id = job.graph_id.clone();
            let job_id = job.job_id.clone();
            let handle =
                tokio::spawn(async move { runner.run_queued(&job.graph_id, &job.job_id).await });

            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(graph_id = %graph_id, job_id = %job_id, error = %e, "Job ended with error");
                }
                Err(join_error) => {
                    error!(graph_id = %graph_id, job_id = %job_id, error = %join_error, "Job panicked");
                    inner.mark_failed(&graph_id, &job_id, "job panicked").await;
                }
            }
            inner.finish_one();
        });
    }

    fn finish_one(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    /// Move a queued job to running and execute it
    async fn run_queued(&self, graph_id: &str, job_id: &str) -> Result<()> {
        let Some(seen) = self.board.get_versioned(graph_id).await? else {
            warn!(graph_id = %graph_id, job_id = %job_id, "Progress record expired before the job started");
            return Ok(());
        };
        if seen.record.job_id != job_id || seen.record.status != JobStatus::Queued {
            info!(
                graph_id = %graph_id,
                job_id = %job_id,
                status = %seen.record.status,
                "Job no longer queued, skipping"
            );
            return Ok(());
        }

        let running = seen.record.clone().started();
        if !self.board.swap(Some(&seen), &running).await? {
            info!(graph_id = %graph_id, job_id = %job_id, "Job changed before it started, skipping");
            return Ok(());
        }
        self.execute(running).await.map(|_| ())
    }

    /// Run a claimed job and record how it ended
    async fn execute(&self, mut record: ProgressRecord) -> Result<ProgressRecord> {
        let graph_id = record.graph_id.clone();
        info!(graph_id = %graph_id, job_id = %record.job_id, "Generation job started");

        match self.generate(&mut record).await {
            Ok(()) => {
                record.finish(JobStatus::Completed, None);
                self.board.put(&record).await?;
                info!(
                    graph_id = %graph_id,
                    job_id = %record.job_id,
                    total = record.total,
                    created = record.created,
                    skipped = record.skipped,
                    "Generation job completed"
                );
                Ok(record)
            }
            Err(e) => {
                let message = e.to_string();
                record.finish(JobStatus::Failed, Some(message.clone()));
                if let Err(write_error) = self.board.put(&record).await {
                    error!(graph_id = %graph_id, error = %write_error, "Could not record job failure");
                }
                error!(
                    graph_id = %graph_id,
                    job_id = %record.job_id,
                    processed = record.processed,
                    code = e.code(),
                    error = %message,
                    "Generation job failed"
                );
                Err(Error::JobFailed { graph_id, message })
            }
        }
    }

    async fn generate(&self, record: &mut ProgressRecord) -> Result<()> {
        let graph_id = record.graph_id.clone();
        if !self.graph.graph_exists(&graph_id).await? {
            return Err(Error::GraphNotFound(graph_id));
        }

        let entities = self.graph.get_entities(&graph_id).await?;
        let pairs: Vec<(usize, usize)> = entity_pairs(entities.len()).collect();
        record.total = pairs.len() as u64;
        self.board.put(record).await?;

        for (index, batch) in pairs.chunks(self.config.batch_size.max(1)).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_pause()).await;
            }

            for &(i, j) in batch {
                let (a, b) = (&entities[i], &entities[j]);
                match self.predictor.predict_and_store(a, b, &graph_id).await {
                    Ok(Some(_)) => record.created += 1,
                    Ok(None) => {}
                    Err(e) if e.is_pair_recoverable() => {
                        warn!(
                            graph_id = %graph_id,
                            source = %a.id,
                            target = %b.id,
                            code = e.code(),
                            error = %e,
                            "Skipping pair"
                        );
                        record.skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
                record.processed += 1;
            }

            self.board.put(record).await?;
            debug!(
                graph_id = %graph_id,
                batch = index,
                processed = record.processed,
                total = record.total,
                "Batch finished"
            );
        }
        Ok(())
    }

    async fn mark_failed(&self, graph_id: &str, job_id: &str, message: &str) {
        let seen = match self.board.get_versioned(graph_id).await {
            Ok(Some(seen)) if seen.record.job_id == job_id => seen,
            Ok(_) => return,
            Err(e) => {
                error!(graph_id = %graph_id, error = %e, "Could not read progress record");
                return;
            }
        };
        let mut failed = seen.record.clone();
        failed.finish(JobStatus::Failed, Some(message.to_string()));
        if let Err(e) = self.board.put(&failed).await {
            error!(graph_id = %graph_id, error = %e, "Could not record job failure");
        }
    }
}
