//! Implementation of a work stealing scheduler.

pub(crate) mod scheduler;
pub(crate) use scheduler::{Handle, Scheduler};

mod context;

mod pool;

mod shared;
pub(crate) use shared::Shared;

mod worker;
