use crate::actor::ProcessingJob;
use crate::actor::status::{ActorStatus, AtomicActorStatus, Pending};
use crate::job::{Job, JobPriority, JobQueue, jobs};
use crate::runtime::{RuntimeConfig, Schedule, Scheduler};
use crate::task::{Id, ThreadId};
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering, fence};
use tracing::{debug, trace, warn};

/// Scheduler state of a default actor.
///
/// # Ownership
///
/// `refs` counts the language-level references to the actor: every
/// [`Actor`](crate::actor::Actor) handle, plus one per extra processing job.
/// With `R` = 1 while the actor has jobs or a running job and `N` the number
/// of processing jobs in flight for it, `refs` always holds exactly `N - R`
/// extra references on top of the handles:
///
/// 1. Leaving `Idle` schedules the owning processing job. No extra reference.
/// 2. A stealer scheduled for an escalated `Scheduled` actor takes one.
/// 3. Escalating a `Running` actor schedules nothing.
/// 4. A processing job that fails to take the lock releases one.
/// 5. Unlocking to `Idle` drops the owning job. No change.
/// 6. A forced unlock with jobs left swaps the expiring processing job for a
///    new one. No change.
pub(crate) struct DefaultActor {
    id: Id,

    status: AtomicActorStatus,

    /// Only touched by the thread holding the actor lock.
    queue: UnsafeCell<JobQueue>,

    refs: AtomicUsize,

    /// The last reference was dropped. Finalization happens as soon as the
    /// actor is seen idle.
    released: AtomicBool,

    finalized: AtomicBool,

    finalizer: Mutex<Option<Box<dyn FnOnce() + Send + 'static>>>,

    scheduler: Scheduler,
}

// Safety: `queue` is only accessed by the lock holder, everything else is
// atomic or behind a mutex.
unsafe impl Sync for DefaultActor {}

/// Uncounted handle identifying a default actor.
///
/// Executor references, tracking frames and processing jobs hold an
/// `ActorRef`. It keeps the actor's memory alive but does not keep the actor
/// from being finalized.
#[derive(Clone)]
pub struct ActorRef(Arc<DefaultActor>);

/// Outcome of a successful unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unlocked {
    Idle,
    Rescheduled,
    Deallocated,
}

impl ActorRef {
    pub(crate) fn new(scheduler: Scheduler) -> Self {
        let actor = DefaultActor {
            id: Id::next(),
            status: AtomicActorStatus::new(),
            queue: UnsafeCell::new(JobQueue::new()),
            refs: AtomicUsize::new(0),
            released: AtomicBool::new(false),
            finalized: AtomicBool::new(false),
            finalizer: Mutex::new(None),
            scheduler,
        };

        debug!(actor = %actor.id, "actor created");
        ActorRef(Arc::new(actor))
    }

    pub fn id(&self) -> Id {
        self.0.id
    }

    pub(crate) fn ptr_eq(&self, other: &ActorRef) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.0.scheduler
    }

    fn cfg(&self) -> &RuntimeConfig {
        self.0.scheduler.cfg()
    }

    pub(crate) fn status(&self) -> ActorStatus {
        self.0.status.load(Ordering::Acquire)
    }

    pub(crate) fn is_finalized(&self) -> bool {
        self.0.finalized.load(Ordering::Acquire)
    }

    pub(crate) fn set_finalizer(&self, finalizer: Box<dyn FnOnce() + Send + 'static>) {
        *self.0.finalizer.lock() = Some(finalizer);
    }

    #[cfg(test)]
    pub(crate) fn ref_count(&self) -> usize {
        self.0.refs.load(Ordering::Acquire)
    }

    /// Enqueues `job` on the actor, scheduling a processing job or escalating
    /// the current drainer as needed.
    pub(crate) fn enqueue(&self, job: Job) {
        if self.is_finalized() {
            warn!(actor = %self.id(), ?job, "dropping job enqueued on a deallocated actor");
            return;
        }

        let priority = job.priority();
        let job_ref = jobs().insert(job);

        let transition = self
            .0
            .status
            .fetch_update(Ordering::Release, Ordering::Relaxed, |old| {
                // Link before publishing: the release CAS makes the link
                // visible to whoever detaches the list.
                jobs().set_next(job_ref, old.incoming());

                Some(match old {
                    ActorStatus::Idle => ActorStatus::Scheduled(Pending::first(job_ref, priority)),
                    mut status => {
                        if let Some(pending) = status.pending_mut() {
                            pending.incoming = Some(job_ref);
                            pending.escalate_to(priority);
                        }
                        status
                    }
                })
            });

        let Ok((old, new)) = transition else {
            unreachable!("enqueue never declines a transition");
        };

        trace!(actor = %self.id(), ?old, ?new, ?priority, "enqueue");

        let max_priority = |status: &ActorStatus| status.pending().map(|p| p.max_priority);
        let raised = max_priority(&new) > max_priority(&old);
        match (old, new) {
            (ActorStatus::Idle, _) => self.schedule_processing(priority),
            (ActorStatus::Scheduled(_), _) if raised => {
                self.retain();
                self.schedule_processing(priority);
            }
            (_, ActorStatus::Running { drainer, .. }) if raised => {
                self.cfg().escalation.escalate_thread(drainer, priority);
            }
            (_, ActorStatus::Zombie { drainer, .. }) => {
                if raised {
                    self.cfg().escalation.escalate_thread(drainer, priority);
                }

                // Nobody drains a finalized zombie. Whoever observes both the
                // push and the finalization disposes of the list.
                fence(Ordering::SeqCst);
                if self.is_finalized() {
                    self.discard_incoming();
                }
            }
            _ => {}
        }
    }

    /// Represents `priority` on an actor a job was already enqueued on.
    pub(crate) fn enqueue_stealer(&self, priority: JobPriority) {
        let res = self
            .0
            .status
            .fetch_update(Ordering::Release, Ordering::Relaxed, |old| {
                // An idle actor already ran the job, or is about to.
                let mut status = old;
                status
                    .pending_mut()
                    .is_some_and(|pending| pending.escalate_to(priority))
                    .then_some(status)
            });

        let Ok((old, new)) = res else {
            return;
        };

        trace!(actor = %self.id(), ?old, ?new, ?priority, "enqueue stealer");

        match new {
            ActorStatus::Scheduled(_) => {
                self.retain();
                self.schedule_processing(priority);
            }
            ActorStatus::Running { drainer, .. } | ActorStatus::Zombie { drainer, .. } => {
                self.cfg().escalation.escalate_thread(drainer, priority);
            }
            ActorStatus::Idle => unreachable!("escalated an idle actor"),
        }
    }

    /// Takes the lock of a `Scheduled` actor on behalf of a processing job and
    /// claims its incoming list. Losing the race releases the reference the
    /// processing job stood for.
    pub(crate) fn try_lock_as_drainer(&self) -> Option<ActorLock> {
        let drainer = ThreadId::current();

        let res = self
            .0
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |old| match old {
                ActorStatus::Scheduled(pending) => Some(ActorStatus::Running {
                    drainer,
                    pending: Pending {
                        max_priority: pending.max_priority,
                        escalated: false,
                        incoming: None,
                    },
                }),
                _ => None,
            });

        match res {
            Ok((old, new)) => {
                trace!(actor = %self.id(), ?old, ?new, "locked as drainer");

                let mut lock = ActorLock::new(self.clone());
                if let Some(head) = old.incoming() {
                    lock.queue().enqueue_contents_of(head);
                }
                Some(lock)
            }
            Err(status) => {
                trace!(actor = %self.id(), ?status, "lost the race to drain");
                self.release();
                None
            }
        }
    }

    /// Takes the lock of an `Idle` actor for the current thread, without
    /// claiming any job. Used for same-thread hand-offs.
    pub(crate) fn try_lock_assume(&self) -> Option<ActorLock> {
        let drainer = ThreadId::current();

        let res = self
            .0
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |old| match old {
                ActorStatus::Idle => Some(ActorStatus::Running {
                    drainer,
                    pending: Pending::default(),
                }),
                _ => None,
            });

        match res {
            Ok((old, new)) => {
                trace!(actor = %self.id(), ?old, ?new, "assumed thread");
                let mut lock = ActorLock::new(self.clone());
                debug_assert!(lock.queue().is_empty(), "idle actor has queued jobs");
                Some(lock)
            }
            Err(_) => None,
        }
    }

    fn unlock_inner(&self, force: bool) -> Option<Unlocked> {
        // Safety: called by the lock holder.
        let queue_empty = unsafe { (*self.0.queue.get()).is_empty() };

        let res = self
            .0
            .status
            .fetch_update(Ordering::Release, Ordering::Relaxed, |old| match old {
                ActorStatus::Running { pending, .. } => {
                    if queue_empty && pending.incoming.is_none() {
                        Some(ActorStatus::Idle)
                    } else if force {
                        Some(ActorStatus::Scheduled(Pending {
                            escalated: false,
                            ..pending
                        }))
                    } else {
                        None
                    }
                }
                ActorStatus::Zombie { .. } => None,
                status => not_locked(self.id(), status),
            });

        let (old, new) = match res {
            Ok(transition) => transition,
            Err(ActorStatus::Zombie { pending, .. }) => {
                if pending.escalated {
                    self.cfg().escalation.end_escalation(pending.max_priority);
                }

                self.dispose_queue();
                self.finalize();
                return Some(Unlocked::Deallocated);
            }
            Err(_) => {
                trace!(actor = %self.id(), "unlock failed, jobs remain");
                return None;
            }
        };

        trace!(actor = %self.id(), ?old, ?new, force, "unlocked");

        let unlocked = match new {
            ActorStatus::Scheduled(pending) => {
                self.schedule_processing(pending.max_priority);
                Unlocked::Rescheduled
            }
            _ => {
                fence(Ordering::SeqCst);
                if self.0.released.load(Ordering::Relaxed) && self.claim_idle_for_finalize() {
                    self.finalize();
                    Unlocked::Deallocated
                } else {
                    Unlocked::Idle
                }
            }
        };

        // Only after rescheduling, so the priority is never unrepresented.
        if old.is_escalated()
            && let Some(pending) = old.pending()
        {
            self.cfg().escalation.end_escalation(pending.max_priority);
        }

        Some(unlocked)
    }

    fn schedule_processing(&self, priority: JobPriority) {
        debug!(actor = %self.id(), ?priority, "scheduling processing job");

        let job = ProcessingJob::new(self.clone(), priority);
        self.scheduler().schedule(Job::process_actor(job));
    }

    pub(crate) fn retain(&self) {
        self.0.refs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn release(&self) {
        let prev = self.0.refs.fetch_sub(1, Ordering::Release);
        assert!(prev > 0, "actor {} released more than retained", self.id());

        if prev == 1 {
            fence(Ordering::Acquire);
            self.deallocate();
        }
    }

    /// Called once the last reference is gone. An idle actor is finalized on
    /// the spot. A running actor becomes a zombie and is finalized by its
    /// drainer. A scheduled one is finalized when it next goes idle.
    fn deallocate(&self) {
        if self.0.released.swap(true, Ordering::AcqRel) {
            return;
        }

        fence(Ordering::SeqCst);

        let finalized = ActorStatus::finalized_by(ThreadId::current());
        let res = self
            .0
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |old| match old {
                ActorStatus::Idle => Some(finalized),
                ActorStatus::Running { drainer, pending } => {
                    Some(ActorStatus::Zombie { drainer, pending })
                }
                _ => None,
            });

        match res {
            Ok((ActorStatus::Idle, _)) => self.finalize(),
            Ok((old, new)) => {
                trace!(actor = %self.id(), ?old, ?new, "deallocation deferred to drainer");
            }
            Err(status) => {
                debug!(actor = %self.id(), ?status, "deallocation deferred until idle");
            }
        }
    }

    /// Moves a released actor from `Idle` to its terminal status. Fails if an
    /// enqueue got there first, in which case the actor is finalized when it
    /// next goes idle.
    fn claim_idle_for_finalize(&self) -> bool {
        let finalized = ActorStatus::finalized_by(ThreadId::current());
        let res = self
            .0
            .status
            .fetch_update(Ordering::AcqRel, Ordering::Relaxed, |old| {
                (old == ActorStatus::Idle).then_some(finalized)
            });

        match res {
            Ok(_) => true,
            Err(status) => {
                debug!(actor = %self.id(), ?status, "actor rescheduled before finalization");
                false
            }
        }
    }

    fn finalize(&self) {
        if self.0.finalized.swap(true, Ordering::AcqRel) {
            return;
        }

        fence(Ordering::SeqCst);
        self.discard_incoming();

        debug!(actor = %self.id(), "actor deallocated");

        // Bind first, the finalizer may enqueue on other actors.
        let finalizer = self.0.finalizer.lock().take();
        if let Some(finalizer) = finalizer {
            finalizer();
        }
    }

    /// Drops the jobs left in the prioritized queue. Lock holder only.
    fn dispose_queue(&self) {
        // Safety: called by the lock holder of a zombie, which never unlocks.
        let queue = unsafe { &mut *self.0.queue.get() };

        let mut dropped = 0;
        while let Some(job_ref) = queue.dequeue() {
            // Safety: dequeued by the lock holder.
            drop(unsafe { jobs().take(job_ref) });
            dropped += 1;
        }

        if dropped > 0 {
            warn!(actor = %self.id(), dropped, "dropping jobs queued on a deallocated actor");
        }
    }

    /// Detaches and drops the incoming list of a finalized actor.
    fn discard_incoming(&self) {
        let res = self
            .0
            .status
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |old| match old {
                ActorStatus::Zombie { drainer, pending } if pending.incoming.is_some() => {
                    Some(ActorStatus::Zombie {
                        drainer,
                        pending: Pending {
                            incoming: None,
                            ..pending
                        },
                    })
                }
                _ => None,
            });

        let Ok((old, _)) = res else {
            return;
        };

        let mut dropped = 0;
        let mut cursor = old.incoming();
        while let Some(job_ref) = cursor {
            cursor = jobs().next(job_ref);
            // Safety: the CAS above detached the list, we own every job on it.
            drop(unsafe { jobs().take(job_ref) });
            dropped += 1;
        }

        warn!(actor = %self.id(), dropped, "dropping jobs enqueued on a deallocated actor");
    }
}

#[cold]
#[track_caller]
fn not_locked(id: Id, status: ActorStatus) -> ! {
    panic!("actor {id} unlocked while not locked: {status:?}")
}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}

/// Proof that the current thread holds an actor's lock.
///
/// Dropping an armed lock force-unlocks the actor, so an unwinding drainer
/// never leaves the actor stuck in `Running`.
#[must_use = "dropping the lock force-unlocks the actor"]
pub(crate) struct ActorLock {
    actor: ActorRef,
    armed: bool,

    // The lock belongs to the drainer thread recorded in the status.
    _not_send: PhantomData<*const ()>,
}

impl ActorLock {
    fn new(actor: ActorRef) -> Self {
        Self {
            actor,
            armed: true,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn actor(&self) -> &ActorRef {
        &self.actor
    }

    fn queue(&mut self) -> &mut JobQueue {
        // Safety: we hold the lock, and `&mut self` makes this the only
        // borrow of the queue.
        unsafe { &mut *self.actor.0.queue.get() }
    }

    /// Removes the highest priority job from the actor.
    pub(crate) fn drain_one(&mut self) -> Option<Job> {
        let job_ref = self.queue().dequeue()?;
        // Safety: dequeued under the lock.
        let job = unsafe { jobs().take(job_ref) };

        trace!(actor = %self.actor.id(), ?job, "drained job");
        Some(job)
    }

    /// Moves jobs enqueued since the lock was taken into the prioritized
    /// queue.
    pub(crate) fn process_incoming_queue(&mut self) {
        let res = self
            .actor
            .0
            .status
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |old| {
                let mut status = old;
                status.pending_mut()?.incoming.take()?;
                Some(status)
            });

        if let Ok((old, _)) = res
            && let Some(head) = old.incoming()
        {
            self.queue().enqueue_contents_of(head);
        }
    }

    /// Gives the actor up. Without `force`, fails and hands the lock back if
    /// jobs remain. With `force`, an actor with jobs left is rescheduled.
    pub(crate) fn unlock(mut self, force: bool) -> Result<Unlocked, ActorLock> {
        match self.actor.unlock_inner(force) {
            Some(unlocked) => {
                self.armed = false;
                Ok(unlocked)
            }
            None => Err(self),
        }
    }

    /// Drops every job the actor holds, including jobs enqueued meanwhile,
    /// then unlocks it.
    pub(crate) fn discard_all(mut self) -> Unlocked {
        let id = self.actor.id();
        let mut dropped = 0usize;

        loop {
            self.process_incoming_queue();
            while let Some(job) = self.drain_one() {
                drop(job);
                dropped += 1;
            }

            match self.unlock(false) {
                Ok(unlocked) => {
                    if dropped > 0 {
                        warn!(actor = %id, dropped, ?unlocked, "dropped jobs of an actor nobody drains");
                    }
                    return unlocked;
                }
                Err(lock) => self = lock,
            }
        }
    }

    /// Force-unlocks the actor.
    pub(crate) fn give_up(self) -> Unlocked {
        match self.unlock(true) {
            Ok(unlocked) => unlocked,
            Err(_) => unreachable!("forced unlock cannot fail"),
        }
    }
}

impl Drop for ActorLock {
    fn drop(&mut self) {
        if self.armed {
            self.armed = false;
            self.actor.unlock_inner(true);
        }
    }
}

impl fmt::Debug for ActorLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorLock")
            .field("actor", &self.actor.id())
            .finish()
    }
}
