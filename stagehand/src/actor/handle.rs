use crate::actor::ActorRef;
use crate::executor::tracking;
use crate::executor::{SerialExecutorRef, report_unexpected_executor};
use crate::job::Job;
use crate::runtime::{Runtime, Scheduler};
use crate::task::Id;
use std::fmt;
use std::panic::Location;

/// Counted handle to a default actor.
///
/// Each `Actor` owns one reference to the actor. Dropping the last handle
/// deallocates the actor: immediately if it is idle, otherwise as soon as the
/// thread draining it lets go.
pub struct Actor {
    actor: ActorRef,
}

impl Actor {
    /// Creates an idle actor whose processing jobs run on `runtime`.
    pub fn new(runtime: &Runtime) -> Self {
        Self::from_scheduler(runtime.scheduler().clone())
    }

    pub(crate) fn from_scheduler(scheduler: Scheduler) -> Self {
        let actor = ActorRef::new(scheduler);
        actor.retain();
        Self { actor }
    }

    /// Sets a closure run once, when the actor is deallocated.
    pub fn with_finalizer<F>(self, finalizer: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.actor.set_finalizer(Box::new(finalizer));
        self
    }

    pub fn id(&self) -> Id {
        self.actor.id()
    }

    /// The serial executor jobs and tasks use to run isolated to this actor.
    pub fn executor(&self) -> SerialExecutorRef {
        SerialExecutorRef::DefaultActor(self.actor.clone())
    }

    pub fn actor_ref(&self) -> &ActorRef {
        &self.actor
    }

    pub fn enqueue(&self, job: Job) {
        self.actor.enqueue(job);
    }

    /// Whether the current thread runs isolated to this actor.
    pub fn is_isolated(&self) -> bool {
        tracking::current_executor() == self.executor()
    }

    /// Reports a data race when the caller is not isolated to this actor.
    #[track_caller]
    pub fn precondition_isolated(&self) {
        if self.is_isolated() {
            return;
        }

        let caller = Location::caller();
        report_unexpected_executor(caller.file(), caller.line(), &self.executor());
    }
}

impl Clone for Actor {
    fn clone(&self) -> Self {
        self.actor.retain();
        Self {
            actor: self.actor.clone(),
        }
    }
}

impl Drop for Actor {
    fn drop(&mut self) {
        self.actor.release();
    }
}

impl fmt::Debug for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Actor").field(&self.actor).finish()
    }
}
