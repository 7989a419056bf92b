//! Durable job queue
//!
//! A job references exactly one order and is keyed by the order id, so a
//! second enqueue for an outstanding order is a no-op and no two workers can
//! hold the same order at once.
//!
//! A claim is a lease: the holder renews it while the pipeline runs, and only
//! an expired lease lets another worker take the job over.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DexFlowError, Result};

/// Job state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Ready once `run_at` has passed
    Waiting,
    /// Claimed by a worker until `locked_until`
    Active,
    /// Gave up; retained until purged
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for JobState {
    type Error = String;

    fn try_from(s: &str) -> std::result::Result<Self, Self::Error> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "failed" => Ok(JobState::Failed),
            _ => Err(format!("Unknown job state: {}", s)),
        }
    }
}

/// Queued unit of work for one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub order_id: Uuid,
    /// Attempts that already ran to an outcome
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub state: JobState,
    pub run_at: DateTime<Utc>,
    /// Lease held by the claiming worker; only meaningful while active
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(order_id: Uuid, max_attempts: u32) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            attempts_made: 0,
            max_attempts,
            state: JobState::Waiting,
            run_at: now,
            locked_until: None,
            last_error: None,
            created_at: now,
        }
    }

    /// 1-based number of the attempt about to run
    pub fn attempt(&self) -> u32 {
        self.attempts_made + 1
    }

    pub fn is_final_attempt(&self) -> bool {
        self.attempt() >= self.max_attempts
    }

    /// Active, but the holder stopped renewing before `now`
    pub fn lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Active && self.locked_until.map_or(true, |until| until <= now)
    }

    /// Ready to be claimed at `now`
    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        match self.state {
            JobState::Waiting => self.run_at <= now,
            JobState::Active => self.lease_expired(now),
            JobState::Failed => false,
        }
    }
}

pub(crate) fn lease_deadline(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    now + chrono::Duration::from_std(lease).unwrap_or_else(|_| chrono::Duration::zero())
}

/// Queue depth per state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    pub waiting: u64,
    pub active: u64,
    pub failed: u64,
}

impl std::fmt::Display for JobCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Jobs[waiting={}, active={}, failed={}]",
            self.waiting, self.active, self.failed
        )
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Admit a job for `order_id`. Returns `false` when a job for that order
    /// is already queued, running, or retained as failed.
    async fn enqueue(&self, order_id: Uuid, max_attempts: u32) -> Result<bool>;

    /// Atomically lease the oldest ready job for `lease` and return it.
    /// Active jobs whose lease has run out are ready again.
    async fn claim_next(&self, lease: Duration) -> Result<Option<Job>>;

    /// Extend the lease on a job this worker holds. Returns `false` when the
    /// job is no longer active.
    async fn renew(&self, order_id: Uuid, lease: Duration) -> Result<bool>;

    /// Discard a finished job
    async fn complete(&self, order_id: Uuid) -> Result<()>;

    /// Record a failed attempt and make the job ready again after `delay`
    async fn schedule_retry(&self, order_id: Uuid, delay: Duration, error: &str) -> Result<()>;

    /// Return a claimed job to the queue without consuming an attempt
    async fn release(&self, order_id: Uuid) -> Result<()>;

    /// Record the last attempt and retain the job as failed
    async fn fail(&self, order_id: Uuid, error: &str) -> Result<()>;

    /// Return active jobs whose lease expired (holder crashed) to the queue.
    /// Jobs under a live lease are left alone.
    async fn recover_expired(&self) -> Result<u64>;

    /// Delete retained failed jobs
    async fn purge_failed(&self) -> Result<u64>;

    async fn counts(&self) -> Result<JobCounts>;

    async fn get(&self, order_id: Uuid) -> Result<Option<Job>>;
}

/// Process-local job store for development and tests.
///
/// Satisfies the same claim/dedup contract as the Postgres store but loses
/// its contents on restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: Mutex<HashMap<Uuid, (u64, Job)>>,
    sequence: std::sync::atomic::AtomicU64,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn active_job_missing(order_id: Uuid) -> DexFlowError {
        DexFlowError::Queue(format!("no active job for order {}", order_id))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(&self, order_id: Uuid, max_attempts: u32) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&order_id) {
            debug!("Job for order {} already exists, skipping enqueue", order_id);
            return Ok(false);
        }

        let sequence = self
            .sequence
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        jobs.insert(order_id, (sequence, Job::new(order_id, max_attempts)));
        Ok(true)
    }

    async fn claim_next(&self, lease: Duration) -> Result<Option<Job>> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;

        let next = jobs
            .values()
            .filter(|(_, job)| job.is_claimable(now))
            .min_by_key(|(sequence, job)| (job.run_at, *sequence))
            .map(|(_, job)| job.order_id);

        Ok(next.and_then(|order_id| {
            jobs.get_mut(&order_id).map(|(_, job)| {
                if job.state == JobState::Active {
                    info!(%order_id, "Taking over job with expired lease");
                }
                job.state = JobState::Active;
                job.locked_until = Some(lease_deadline(now, lease));
                job.clone()
            })
        }))
    }

    async fn renew(&self, order_id: Uuid, lease: Duration) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get_mut(&order_id) {
            Some((_, job)) if job.state == JobState::Active => {
                job.locked_until = Some(lease_deadline(Utc::now(), lease));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn complete(&self, order_id: Uuid) -> Result<()> {
        self.jobs.lock().await.remove(&order_id);
        Ok(())
    }

    async fn schedule_retry(&self, order_id: Uuid, delay: Duration, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let (_, job) = jobs
            .get_mut(&order_id)
            .filter(|(_, job)| job.state == JobState::Active)
            .ok_or_else(|| Self::active_job_missing(order_id))?;

        job.attempts_made += 1;
        job.state = JobState::Waiting;
        job.locked_until = None;
        job.last_error = Some(error.to_string());
        job.run_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        Ok(())
    }

    async fn release(&self, order_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let (_, job) = jobs
            .get_mut(&order_id)
            .filter(|(_, job)| job.state == JobState::Active)
            .ok_or_else(|| Self::active_job_missing(order_id))?;

        job.state = JobState::Waiting;
        job.locked_until = None;
        Ok(())
    }

    async fn fail(&self, order_id: Uuid, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        let (_, job) = jobs
            .get_mut(&order_id)
            .filter(|(_, job)| job.state == JobState::Active)
            .ok_or_else(|| Self::active_job_missing(order_id))?;

        job.attempts_made += 1;
        job.state = JobState::Failed;
        job.locked_until = None;
        job.last_error = Some(error.to_string());
        Ok(())
    }

    async fn recover_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut jobs = self.jobs.lock().await;
        let mut recovered = 0;
        for (_, job) in jobs.values_mut() {
            if job.lease_expired(now) {
                job.state = JobState::Waiting;
                job.locked_until = None;
                recovered += 1;
            }
        }
        if recovered > 0 {
            info!("Recovered {} jobs with expired leases", recovered);
        }
        Ok(recovered)
    }

    async fn purge_failed(&self) -> Result<u64> {
        let mut jobs = self.jobs.lock().await;
        let before = jobs.len();
        jobs.retain(|_, (_, job)| job.state != JobState::Failed);
        Ok((before - jobs.len()) as u64)
    }

    async fn counts(&self) -> Result<JobCounts> {
        let jobs = self.jobs.lock().await;
        let mut counts = JobCounts::default();
        for (_, job) in jobs.values() {
            match job.state {
                JobState::Waiting => counts.waiting += 1,
                JobState::Active => counts.active += 1,
                JobState::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    async fn get(&self, order_id: Uuid) -> Result<Option<Job>> {
        Ok(self
            .jobs
            .lock()
            .await
            .get(&order_id)
            .map(|(_, job)| job.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_enqueue_dedups_by_order_id() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();

        assert!(store.enqueue(id, 3).await.unwrap());
        assert!(!store.enqueue(id, 3).await.unwrap());
        assert_eq!(store.counts().await.unwrap().waiting, 1);

        // Still deduped while active
        store.claim_next(LEASE).await.unwrap().unwrap();
        assert!(!store.enqueue(id, 3).await.unwrap());

        // A completed job is discarded, so the id is admissible again
        store.complete(id).await.unwrap();
        assert!(store.get(id).await.unwrap().is_none());
        assert!(store.enqueue(id, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_is_exclusive_and_fifo() {
        let store = MemoryJobStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        store.enqueue(first, 3).await.unwrap();
        store.enqueue(second, 3).await.unwrap();

        assert_eq!(store.claim_next(LEASE).await.unwrap().unwrap().order_id, first);
        assert_eq!(store.claim_next(LEASE).await.unwrap().unwrap().order_id, second);
        assert!(store.claim_next(LEASE).await.unwrap().is_none());

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.active, 2);
        assert_eq!(counts.waiting, 0);
    }

    #[tokio::test]
    async fn test_retry_delays_and_counts_attempts() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.enqueue(id, 3).await.unwrap();

        let job = store.claim_next(LEASE).await.unwrap().unwrap();
        assert_eq!(job.attempt(), 1);
        assert!(!job.is_final_attempt());

        store
            .schedule_retry(id, Duration::from_secs(3600), "Slippage tolerance exceeded")
            .await
            .unwrap();
        assert!(store.claim_next(LEASE).await.unwrap().is_none());

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 1);
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.last_error.as_deref(), Some("Slippage tolerance exceeded"));

        store.schedule_retry(id, Duration::ZERO, "x").await.unwrap_err();
    }

    #[tokio::test]
    async fn test_failed_jobs_are_retained_until_purged() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.enqueue(id, 1).await.unwrap();
        let job = store.claim_next(LEASE).await.unwrap().unwrap();
        assert!(job.is_final_attempt());

        store.fail(id, "no route found").await.unwrap();
        assert_eq!(store.counts().await.unwrap().failed, 1);
        assert!(!store.enqueue(id, 1).await.unwrap());

        assert_eq!(store.purge_failed().await.unwrap(), 1);
        assert_eq!(store.counts().await.unwrap(), JobCounts::default());
    }

    #[tokio::test]
    async fn test_live_lease_is_not_recovered() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.enqueue(id, 3).await.unwrap();
        let job = store.claim_next(LEASE).await.unwrap().unwrap();
        assert!(job.locked_until.unwrap() > Utc::now());

        assert_eq!(store.recover_expired().await.unwrap(), 0);
        assert!(store.claim_next(LEASE).await.unwrap().is_none());
        assert_eq!(store.counts().await.unwrap().active, 1);
    }

    #[tokio::test]
    async fn test_expired_lease_is_recovered() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.enqueue(id, 3).await.unwrap();
        store.claim_next(Duration::ZERO).await.unwrap().unwrap();

        assert_eq!(store.recover_expired().await.unwrap(), 1);
        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert!(job.locked_until.is_none());
        assert_eq!(store.claim_next(LEASE).await.unwrap().unwrap().order_id, id);
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_claimed_directly() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.enqueue(id, 3).await.unwrap();
        store.claim_next(Duration::ZERO).await.unwrap().unwrap();

        let job = store.claim_next(LEASE).await.unwrap().unwrap();
        assert_eq!(job.order_id, id);
        assert_eq!(job.attempts_made, 0);
        assert!(store.claim_next(LEASE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_renew_extends_lease() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.enqueue(id, 3).await.unwrap();
        store.claim_next(Duration::ZERO).await.unwrap().unwrap();

        assert!(store.renew(id, LEASE).await.unwrap());
        assert!(store.claim_next(LEASE).await.unwrap().is_none());

        store.complete(id).await.unwrap();
        assert!(!store.renew(id, LEASE).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_keeps_attempt_count() {
        let store = MemoryJobStore::new();
        let id = Uuid::new_v4();
        store.enqueue(id, 3).await.unwrap();
        store.claim_next(LEASE).await.unwrap().unwrap();

        store.release(id).await.unwrap();
        let job = store.claim_next(LEASE).await.unwrap().unwrap();
        assert_eq!(job.attempts_made, 0);

        store.complete(id).await.unwrap();
        assert!(store.release(id).await.is_err());
    }
}
