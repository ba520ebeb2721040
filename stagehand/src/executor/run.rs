use crate::actor::ActorRef;
use crate::executor::tracking::{ActiveExecutor, TrackingGuard};
use crate::executor::{SerialExecutorRef, TaskExecutorRef};
use crate::job::Job;
use std::sync::Arc;
use tracing::trace;

/// Runs `job` synchronously on the current thread, as `executor`.
///
/// Running on a default actor takes the actor's lock for the duration of the
/// job, which requires the actor to be idle. Anything else means the caller
/// is not isolated to the actor, and we panic.
///
/// Only the generic executor lets a task hop the thread to another executor
/// in place. On an actor or a custom executor the job runs exactly there, and
/// a task asking to move suspends and is enqueued on its new executor.
pub fn run_job(job: Job, executor: &SerialExecutorRef) {
    let (active, allows_switching) = match executor {
        SerialExecutorRef::Generic => (ActiveExecutor::Generic, true),
        SerialExecutorRef::DefaultActor(actor) => (assume_actor(actor), false),
        SerialExecutorRef::Custom(custom) => (ActiveExecutor::Custom(Arc::clone(custom)), false),
    };

    run_in_frame(job, active, TaskExecutorRef::undefined(), allows_switching);
}

/// Runs `job` on the current thread on behalf of `task_executor`, isolated to
/// `executor`. Switching is never allowed.
///
/// A task executor does not know whether the actor is busy. When another
/// thread holds the actor, the job is handed to the actor instead, and runs
/// once its drainer gets to it.
pub fn run_job_on_task_executor(
    job: Job,
    executor: &SerialExecutorRef,
    task_executor: TaskExecutorRef,
) {
    let active = match executor {
        SerialExecutorRef::Generic => ActiveExecutor::Generic,
        SerialExecutorRef::DefaultActor(actor) => match actor.try_lock_assume() {
            Some(lock) => ActiveExecutor::Actor(lock),
            None => {
                trace!(actor = %actor.id(), ?job, "actor busy, job handed back to it");
                actor.enqueue(job);
                return;
            }
        },
        SerialExecutorRef::Custom(custom) => ActiveExecutor::Custom(Arc::clone(custom)),
    };

    run_in_frame(job, active, task_executor, false);
}

fn run_in_frame(
    job: Job,
    active: ActiveExecutor,
    task_executor: TaskExecutorRef,
    allows_switching: bool,
) {
    let guard = TrackingGuard::enter(active, task_executor, allows_switching);
    job.run_in_established_context();

    // Whatever executor the job left the thread on, we give it up here.
    guard.leave().executor.give_up();
}

fn assume_actor(actor: &ActorRef) -> ActiveExecutor {
    match actor.try_lock_assume() {
        Some(lock) => ActiveExecutor::Actor(lock),
        None => not_isolated(actor),
    }
}

#[cold]
#[track_caller]
fn not_isolated(actor: &ActorRef) -> ! {
    panic!(
        "cannot run job on actor {}: actor is not idle, the caller is not isolated to it",
        actor.id()
    )
}
