// Public API
mod priority;
pub use self::priority::JobPriority;
pub(crate) use self::priority::PRIORITY_BUCKETS;

#[allow(clippy::module_inception)]
mod job;
pub use self::job::Job;

// Exports
mod queue;
pub(crate) use self::queue::JobQueue;

mod slab;
pub(crate) use self::slab::{JOB_REF_BITS, JobRef, jobs};
