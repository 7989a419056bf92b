//! Persistence contracts consumed by the order pipeline:
//! - order records (`OrderStore`)
//! - the durable job queue (`JobStore`)

pub mod job_store;
pub mod order_store;

pub use job_store::{Job, JobCounts, JobState, JobStore, MemoryJobStore};
pub use order_store::OrderStore;

#[cfg(test)]
pub use job_store::MockJobStore;
#[cfg(test)]
pub use order_store::MockOrderStore;
