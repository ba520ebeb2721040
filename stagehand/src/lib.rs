//! Scheduler core for default actors.
//!
//! A default actor is a serial executor: jobs enqueued on it run one at a
//! time, highest priority first, on threads borrowed from the runtime's
//! global pool. Tasks move between executors with [`hop_to`], and a thread
//! that leaves one idle actor for another keeps running the task in place.
//!
//! ```no_run
//! use stagehand::{Builder, Job, JobPriority};
//!
//! let runtime = Builder::new_stealing().worker_threads(4).try_build()?;
//! let actor = runtime.new_actor();
//!
//! actor.enqueue(Job::new(JobPriority::UserInitiated, || println!("isolated")));
//!
//! let answer = runtime.block_on({
//!     let executor = actor.executor();
//!     async move {
//!         stagehand::hop_to(executor).await;
//!         42
//!     }
//! });
//! assert_eq!(answer, 42);
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod actor;
pub use actor::{Actor, ActorRef};

pub mod escalation;
pub use escalation::{NoEscalation, PriorityEscalation};

pub mod executor;
pub use executor::{
    SerialExecutor, SerialExecutorRef, TaskExecutor, TaskExecutorRef, is_current_executor,
    report_unexpected_executor, run_job, run_job_on_task_executor,
};

pub mod job;
pub use job::{Job, JobPriority};

pub mod runtime;
pub use runtime::runtime::BuildError;
pub use runtime::{Builder, Runtime, SpawnBuilder};

pub mod task;
pub use task::{Hop, Id, JoinError, JoinHandle, ThreadId, hop_to};

mod utils;

#[cfg(test)]
mod test_utils;
