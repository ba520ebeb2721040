use crate::actor::{ActorLock, ActorRef};
use crate::executor::TaskExecutorRef;
use crate::executor::tracking::{self, ActiveExecutor, TrackingGuard};
use crate::job::JobPriority;
use crate::task::Task;
use std::fmt;
use tracing::{debug, trace};

/// Job scheduled on the global pool to drain an actor.
///
/// Every processing job in flight stands for one of the actor's `N`
/// processing jobs. Whichever takes the lock drains; the others release
/// their reference and return.
///
/// A processing job dropped without running, typically by a pool shutting
/// down, still resolves its share: it takes the lock like a drainer would,
/// drops the actor's jobs and lets it go idle, so the actor can be finalized.
pub(crate) struct ProcessingJob {
    actor: ActorRef,
    priority: JobPriority,

    /// Cleared once the job runs.
    unresolved: bool,
}

impl ProcessingJob {
    pub(crate) fn new(actor: ActorRef, priority: JobPriority) -> Self {
        Self {
            actor,
            priority,
            unresolved: true,
        }
    }

    pub(crate) fn priority(&self) -> JobPriority {
        self.priority
    }

    /// Drains the actor on the current thread.
    ///
    /// The thread follows tasks that hand it over to another actor, and stops
    /// once it ends up on anything that is not a default actor.
    pub(crate) fn process(mut self) {
        self.unresolved = false;

        let Some(lock) = self.actor.try_lock_as_drainer() else {
            return;
        };

        let budget = self.actor.scheduler().cfg().drain_budget;
        debug!(actor = %self.actor.id(), priority = ?self.priority, "draining actor");

        let guard = TrackingGuard::enter(
            ActiveExecutor::Actor(lock),
            TaskExecutorRef::undefined(),
            true,
        );

        let mut drained = 0usize;
        loop {
            let Some(next) = tracking::with_actor_lock(ActorLock::drain_one) else {
                break;
            };

            let Some(job) = next else {
                let Some(lock) = tracking::take_actor_lock() else {
                    break;
                };

                match lock.unlock(false) {
                    Ok(unlocked) => {
                        trace!(actor = %self.actor.id(), drained, ?unlocked, "drain finished");
                        break;
                    }
                    Err(lock) => {
                        tracking::restore_actor_lock(lock);
                        tracking::with_actor_lock(ActorLock::process_incoming_queue);
                        continue;
                    }
                }
            };

            let task_executor = job.as_task().map(Task::task_executor).unwrap_or_default();
            tracking::set_task_executor(task_executor);

            job.run_in_established_context();
            drained += 1;

            let on_actor = tracking::with_frame(|frame| frame.executor.is_default_actor());
            if on_actor != Some(true) {
                break;
            }

            if budget.is_some_and(|budget| drained >= budget) {
                if let Some(lock) = tracking::take_actor_lock() {
                    debug!(actor = %lock.actor().id(), drained, "drain budget spent, yielding thread");
                    lock.give_up();
                }
                break;
            }

            tracking::with_actor_lock(ActorLock::process_incoming_queue);
        }

        guard.leave().executor.give_up();
    }
}

impl Drop for ProcessingJob {
    fn drop(&mut self) {
        if !self.unresolved {
            return;
        }
        self.unresolved = false;

        debug!(actor = %self.actor.id(), priority = ?self.priority, "processing job dropped before running");
        if let Some(lock) = self.actor.try_lock_as_drainer() {
            lock.discard_all();
        }
    }
}

impl fmt::Debug for ProcessingJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessingJob")
            .field("actor", &self.actor.id())
            .field("priority", &self.priority)
            .finish()
    }
}
