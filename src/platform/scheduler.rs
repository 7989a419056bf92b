//! Order Scheduler - worker pool over the durable job queue
//!
//! Workers claim jobs one at a time, pass the rate limiter and run the
//! pipeline. The job store keys jobs by order id and a claim is a lease that
//! the worker renews while the pipeline runs, so one order is never held by
//! two workers at once. Each pipeline run is its own task; a panic settles
//! the job like any other aborted attempt.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use super::pipeline::{OrderPipeline, PipelineOutcome};
use super::rate_limit::SlidingWindowLimiter;
use crate::config::QueueConfig;
use crate::domain::Order;
use crate::error::{DexFlowError, Result};
use crate::persistence::{Job, JobCounts, JobStore};

/// Scheduler counters since start
#[derive(Debug, Clone, Default, Serialize)]
pub struct SchedulerStats {
    pub workers: usize,
    pub enqueued: u64,
    pub duplicates: u64,
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub retried: u64,
}

impl std::fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scheduler[workers={}, enqueued={}, started={}, completed={}, failed={}, retried={}]",
            self.workers, self.enqueued, self.started, self.completed, self.failed, self.retried
        )
    }
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    duplicates: AtomicU64,
    started: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    retried: AtomicU64,
}

/// State shared by every worker
struct Shared {
    jobs: Arc<dyn JobStore>,
    pipeline: Arc<OrderPipeline>,
    limiter: SlidingWindowLimiter,
    config: QueueConfig,
    wakeup: Notify,
    counters: Counters,
}

/// `base × 2^(attempt−1)` for the attempt that just failed (1-based)
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    base.saturating_mul(1u32 << exponent)
}

pub struct OrderScheduler {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl OrderScheduler {
    pub fn new(jobs: Arc<dyn JobStore>, pipeline: Arc<OrderPipeline>, config: QueueConfig) -> Self {
        let limiter = SlidingWindowLimiter::new(config.rate_limit_max, config.rate_limit_window());
        let (shutdown, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                jobs,
                pipeline,
                limiter,
                config,
                wakeup: Notify::new(),
                counters: Counters::default(),
            }),
            shutdown,
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Admit an order for processing. Returns `false` when a job for the same
    /// order already exists.
    pub async fn enqueue(&self, order: &Order) -> Result<bool> {
        let admitted = self
            .shared
            .jobs
            .enqueue(order.id, self.shared.config.max_attempts)
            .await?;

        if admitted {
            self.shared.counters.enqueued.fetch_add(1, Ordering::Relaxed);
            self.shared.wakeup.notify_one();
            debug!(order_id = %order.id, "Order enqueued");
        } else {
            self.shared.counters.duplicates.fetch_add(1, Ordering::Relaxed);
            debug!(order_id = %order.id, "Duplicate enqueue ignored");
        }
        Ok(admitted)
    }

    /// Requeue jobs whose holder stopped renewing and spawn the workers
    pub async fn start(&self) -> Result<()> {
        let mut workers = self.workers.lock().await;
        if !workers.is_empty() {
            warn!("Scheduler already started");
            return Ok(());
        }

        self.shared.jobs.recover_expired().await?;

        let concurrency = self.shared.config.concurrency.max(1);
        for worker_id in 0..concurrency {
            let shared = Arc::clone(&self.shared);
            let shutdown = self.shutdown.subscribe();
            workers.push(tokio::spawn(worker_loop(shared, worker_id, shutdown)));
        }

        info!(
            concurrency,
            rate_limit = self.shared.config.rate_limit_max,
            window_ms = self.shared.config.rate_limit_window_ms,
            "Order scheduler started"
        );
        Ok(())
    }

    /// Stop claiming new jobs and wait for in-flight pipelines to finish
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);

        let handles: Vec<_> = self.workers.lock().await.drain(..).collect();
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker task failed: {}", e);
            }
        }

        info!(workers = count, "Order scheduler stopped");
    }

    pub fn stats(&self) -> SchedulerStats {
        let c = &self.shared.counters;
        SchedulerStats {
            workers: self.shared.config.concurrency,
            enqueued: c.enqueued.load(Ordering::Relaxed),
            duplicates: c.duplicates.load(Ordering::Relaxed),
            started: c.started.load(Ordering::Relaxed),
            completed: c.completed.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            retried: c.retried.load(Ordering::Relaxed),
        }
    }

    pub async fn job_counts(&self) -> Result<JobCounts> {
        self.shared.jobs.counts().await
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        backoff_delay(
            Duration::from_millis(self.shared.config.backoff_base_ms),
            attempt,
        )
    }
}

async fn worker_loop(shared: Arc<Shared>, worker_id: usize, mut shutdown: watch::Receiver<bool>) {
    debug!(worker_id, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        let job = match shared.jobs.claim_next(shared.config.lease()).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tokio::select! {
                    _ = shared.wakeup.notified() => {}
                    _ = tokio::time::sleep(shared.config.poll_interval()) => {}
                    changed = shutdown.changed() => {
                        // Sender gone: the scheduler was dropped
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }
            Err(e) => {
                error!(worker_id, "Failed to claim job: {}", e);
                tokio::select! {
                    _ = tokio::time::sleep(shared.config.poll_interval()) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                continue;
            }
        };

        tokio::select! {
            _ = shared.limiter.acquire() => {}
            _ = shutdown.changed() => {
                if let Err(e) = shared.jobs.release(job.order_id).await {
                    warn!(order_id = %job.order_id, "Failed to release job: {}", e);
                }
                break;
            }
        }

        process(&shared, worker_id, job).await;
    }

    debug!(worker_id, "Worker stopped");
}

async fn process(shared: &Shared, worker_id: usize, job: Job) {
    let order_id = job.order_id;
    let attempt = job.attempt();
    shared.counters.started.fetch_add(1, Ordering::Relaxed);
    info!(%order_id, attempt, max_attempts = job.max_attempts, worker_id, "Processing job");

    let outcome = match run_leased(shared, &job).await {
        Ok(outcome) => outcome,
        Err(join_err) => Err(DexFlowError::Internal(format!(
            "pipeline task failed: {}",
            join_err
        ))),
    };

    let settled = match outcome {
        Ok(PipelineOutcome::Confirmed) | Ok(PipelineOutcome::Skipped) => {
            shared.counters.completed.fetch_add(1, Ordering::Relaxed);
            shared.jobs.complete(order_id).await
        }
        Ok(PipelineOutcome::Failed { reason }) => {
            shared.counters.failed.fetch_add(1, Ordering::Relaxed);
            shared.jobs.fail(order_id, &reason).await
        }
        Ok(PipelineOutcome::Retry { error }) => {
            shared.counters.retried.fetch_add(1, Ordering::Relaxed);
            let delay = backoff_delay(Duration::from_millis(shared.config.backoff_base_ms), attempt);
            info!(%order_id, attempt, delay_ms = delay.as_millis() as u64, "Job scheduled for retry");
            shared.jobs.schedule_retry(order_id, delay, &error).await
        }
        Err(e) => {
            let message = e.to_string();
            error!(%order_id, attempt, "Pipeline attempt aborted: {}", message);

            if job.is_final_attempt() {
                shared.counters.failed.fetch_add(1, Ordering::Relaxed);
                if let Err(abandon_err) = shared.pipeline.abandon(order_id, &message).await {
                    warn!(%order_id, "Could not finalize abandoned order: {}", abandon_err);
                }
                shared.jobs.fail(order_id, &message).await
            } else {
                shared.counters.retried.fetch_add(1, Ordering::Relaxed);
                let delay =
                    backoff_delay(Duration::from_millis(shared.config.backoff_base_ms), attempt);
                shared.jobs.schedule_retry(order_id, delay, &message).await
            }
        }
    };

    if let Err(e) = settled {
        error!(%order_id, "Failed to settle job: {}", e);
    }
}

/// Run one pipeline attempt in its own task, renewing the job lease until it returns
async fn run_leased(
    shared: &Shared,
    job: &Job,
) -> std::result::Result<Result<PipelineOutcome>, JoinError> {
    let pipeline = Arc::clone(&shared.pipeline);
    let claimed = job.clone();
    let mut task = tokio::spawn(async move { pipeline.run(&claimed).await });

    let mut renewal = tokio::time::interval(shared.config.lease_renewal());
    // First tick is immediate; the claim itself started the lease
    renewal.tick().await;

    loop {
        tokio::select! {
            joined = &mut task => return joined,
            _ = renewal.tick() => {
                match shared.jobs.renew(job.order_id, shared.config.lease()).await {
                    Ok(true) => debug!(order_id = %job.order_id, "Lease renewed"),
                    Ok(false) => warn!(order_id = %job.order_id, "Lease lost while processing"),
                    Err(e) => warn!(order_id = %job.order_id, "Failed to renew lease: {}", e),
                }
            }
        }
    }
}
