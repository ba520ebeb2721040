//! Single-threaded global pool. Jobs run only when the thread owning the
//! runtime drives it, which makes scheduling fully deterministic.

pub(crate) mod scheduler;
pub(crate) use scheduler::{Handle, Scheduler};
