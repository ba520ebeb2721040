use crate::job::{JOB_REF_BITS, JobPriority, JobRef};
use crate::task::{THREAD_ID_BITS, ThreadId};
use std::sync::atomic::{AtomicU64, Ordering};

/// Work an actor has accepted but not yet handed to a drainer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Pending {
    /// Highest priority of any job enqueued since the actor was scheduled.
    pub(crate) max_priority: JobPriority,

    /// Set when `max_priority` was raised above the priority the actor was
    /// scheduled or locked at.
    pub(crate) escalated: bool,

    /// Head of the incoming list, most recently enqueued job first.
    pub(crate) incoming: Option<JobRef>,
}

impl Pending {
    /// Pending work made of a single job.
    pub(crate) fn first(job: JobRef, priority: JobPriority) -> Self {
        Self {
            max_priority: priority,
            escalated: false,
            incoming: Some(job),
        }
    }

    /// Raises `max_priority` to `priority`, flagging the escalation. Returns
    /// `false` if `priority` does not exceed the current maximum.
    pub(crate) fn escalate_to(&mut self, priority: JobPriority) -> bool {
        if priority <= self.max_priority {
            return false;
        }

        self.max_priority = priority;
        self.escalated = true;
        true
    }
}

/// Lifecycle state of a default actor.
///
/// An idle actor carries nothing: no jobs, no priority, no drainer. A running
/// or zombie actor always names the thread draining it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ActorStatus {
    #[default]
    Idle,

    /// A processing job was handed to the global pool but has not taken the
    /// lock yet.
    Scheduled(Pending),

    /// `drainer` holds the actor lock.
    Running { drainer: ThreadId, pending: Pending },

    /// The last reference to the actor was dropped while `drainer` held the
    /// lock. The drainer finalizes the actor when it unlocks.
    Zombie { drainer: ThreadId, pending: Pending },
}

impl ActorStatus {
    /// Terminal status of an actor finalized while idle, claimed by `thread`.
    ///
    /// Nobody ever unlocks it. The priority is pinned at the top so late
    /// enqueues never count as an escalation.
    pub(crate) fn finalized_by(thread: ThreadId) -> Self {
        Self::Zombie {
            drainer: thread,
            pending: Pending {
                max_priority: JobPriority::UserInteractive,
                escalated: false,
                incoming: None,
            },
        }
    }

    pub(crate) fn pending(&self) -> Option<&Pending> {
        match self {
            Self::Idle => None,
            Self::Scheduled(pending)
            | Self::Running { pending, .. }
            | Self::Zombie { pending, .. } => Some(pending),
        }
    }

    pub(crate) fn pending_mut(&mut self) -> Option<&mut Pending> {
        match self {
            Self::Idle => None,
            Self::Scheduled(pending)
            | Self::Running { pending, .. }
            | Self::Zombie { pending, .. } => Some(pending),
        }
    }

    #[allow(unused)]
    pub(crate) fn drainer(&self) -> Option<ThreadId> {
        match self {
            Self::Running { drainer, .. } | Self::Zombie { drainer, .. } => Some(*drainer),
            _ => None,
        }
    }

    pub(crate) fn incoming(&self) -> Option<JobRef> {
        self.pending().and_then(|p| p.incoming)
    }

    pub(crate) fn is_escalated(&self) -> bool {
        self.pending().is_some_and(|p| p.escalated)
    }
}

// Layout of the packed status word, low bits first:
//
//   [0..2)   state tag
//   [2]      escalated
//   [3..11)  max priority
//   [11..40) drainer thread id
//   [40..64) incoming list head
const TAG_MASK: u64 = 0b11;
const TAG_IDLE: u64 = 0;
const TAG_SCHEDULED: u64 = 1;
const TAG_RUNNING: u64 = 2;
const TAG_ZOMBIE: u64 = 3;

const ESCALATED_BIT: u64 = 1 << 2;

const PRIORITY_SHIFT: u32 = 3;
const PRIORITY_MASK: u64 = 0xff;

const DRAINER_SHIFT: u32 = 11;
const DRAINER_MASK: u64 = (1 << THREAD_ID_BITS) - 1;

const JOB_SHIFT: u32 = DRAINER_SHIFT + THREAD_ID_BITS;
const JOB_MASK: u64 = (1 << JOB_REF_BITS) - 1;

const _: () = assert!(JOB_SHIFT + JOB_REF_BITS == u64::BITS);

impl ActorStatus {
    fn pack(self) -> u64 {
        let (tag, drainer, pending) = match self {
            Self::Idle => return TAG_IDLE,
            Self::Scheduled(pending) => (TAG_SCHEDULED, None, pending),
            Self::Running { drainer, pending } => (TAG_RUNNING, Some(drainer), pending),
            Self::Zombie { drainer, pending } => (TAG_ZOMBIE, Some(drainer), pending),
        };

        let mut word = tag;
        if pending.escalated {
            word |= ESCALATED_BIT;
        }
        word |= (pending.max_priority.as_u8() as u64) << PRIORITY_SHIFT;
        word |= drainer.map_or(0, |t| t.as_u32() as u64 & DRAINER_MASK) << DRAINER_SHIFT;
        word |= pending.incoming.map_or(0, |j| j.to_bits() as u64) << JOB_SHIFT;
        word
    }

    fn unpack(word: u64) -> Self {
        let tag = word & TAG_MASK;
        if tag == TAG_IDLE {
            return Self::Idle;
        }

        let pending = Pending {
            max_priority: JobPriority::from_raw(((word >> PRIORITY_SHIFT) & PRIORITY_MASK) as u8),
            escalated: word & ESCALATED_BIT != 0,
            incoming: JobRef::from_bits(((word >> JOB_SHIFT) & JOB_MASK) as u32),
        };

        if tag == TAG_SCHEDULED {
            return Self::Scheduled(pending);
        }

        let Some(drainer) = ThreadId::from_bits(((word >> DRAINER_SHIFT) & DRAINER_MASK) as u32)
        else {
            corrupt(word);
        };

        if tag == TAG_RUNNING {
            Self::Running { drainer, pending }
        } else {
            Self::Zombie { drainer, pending }
        }
    }
}

#[cold]
fn corrupt(word: u64) -> ! {
    panic!("corrupt actor status word: {word:#018x}")
}

/// An [`ActorStatus`] updated atomically as a whole.
#[derive(Debug)]
pub(crate) struct AtomicActorStatus {
    word: AtomicU64,
}

impl AtomicActorStatus {
    pub(crate) fn new() -> Self {
        Self {
            word: AtomicU64::new(ActorStatus::Idle.pack()),
        }
    }

    pub(crate) fn load(&self, order: Ordering) -> ActorStatus {
        ActorStatus::unpack(self.word.load(order))
    }

    /// Applies `f` to the current status until the swap succeeds or `f`
    /// returns `None`. Returns the old and new status on success, the status
    /// `f` declined on failure.
    pub(crate) fn fetch_update<F>(
        &self,
        success: Ordering,
        failure: Ordering,
        mut f: F,
    ) -> Result<(ActorStatus, ActorStatus), ActorStatus>
    where
        F: FnMut(ActorStatus) -> Option<ActorStatus>,
    {
        let mut old = self.load(failure);
        loop {
            let Some(new) = f(old) else {
                return Err(old);
            };

            match self
                .word
                .compare_exchange_weak(old.pack(), new.pack(), success, failure)
            {
                Ok(_) => return Ok((old, new)),
                Err(actual) => old = ActorStatus::unpack(actual),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{Job, jobs};
    use rstest::rstest;

    fn some_job() -> JobRef {
        jobs().insert(Job::new(JobPriority::Default, || {}))
    }

    #[test]
    fn test_idle_packs_to_zero() {
        assert_eq!(ActorStatus::Idle.pack(), 0);
        assert_eq!(ActorStatus::unpack(0), ActorStatus::Idle);
        assert!(ActorStatus::Idle.pending().is_none());
        assert!(ActorStatus::Idle.drainer().is_none());
    }

    #[rstest]
    #[case::scheduled_plain(false, false)]
    #[case::scheduled_escalated(false, true)]
    #[case::running_plain(true, false)]
    #[case::running_escalated(true, true)]
    fn test_status_survives_packing(#[case] running: bool, #[case] escalated: bool) {
        let job = some_job();
        let pending = Pending {
            max_priority: JobPriority::UserInitiated,
            escalated,
            incoming: Some(job),
        };

        let status = if running {
            ActorStatus::Running {
                drainer: ThreadId::current(),
                pending,
            }
        } else {
            ActorStatus::Scheduled(pending)
        };

        let unpacked = ActorStatus::unpack(status.pack());
        assert_eq!(unpacked, status);
        assert_eq!(unpacked.incoming(), Some(job));
        assert_eq!(unpacked.is_escalated(), escalated);
        assert_eq!(unpacked.drainer().is_some(), running);

        unsafe { drop(jobs().take(job)) };
    }

    #[test]
    fn test_zombie_keeps_drainer() {
        let status = ActorStatus::Zombie {
            drainer: ThreadId::current(),
            pending: Pending::default(),
        };

        assert_eq!(ActorStatus::unpack(status.pack()), status);
        assert_eq!(status.drainer(), Some(ThreadId::current()));
    }

    #[test]
    fn test_finalized_status_never_escalates() {
        let mut status = ActorStatus::finalized_by(ThreadId::current());
        assert_eq!(ActorStatus::unpack(status.pack()), status);

        let escalated = status
            .pending_mut()
            .is_some_and(|pending| pending.escalate_to(JobPriority::UserInteractive));
        assert!(!escalated);
        assert!(!status.is_escalated());
    }

    #[test]
    fn test_escalate_to_only_raises() {
        let mut pending = Pending::first(some_job(), JobPriority::Utility);
        assert!(!pending.escalate_to(JobPriority::Background));
        assert!(!pending.escalate_to(JobPriority::Utility));
        assert!(!pending.escalated);

        assert!(pending.escalate_to(JobPriority::UserInteractive));
        assert!(pending.escalated);
        assert_eq!(pending.max_priority, JobPriority::UserInteractive);

        if let Some(job) = pending.incoming {
            unsafe { drop(jobs().take(job)) };
        }
    }

    #[test]
    fn test_fetch_update_declined_leaves_status() {
        let status = AtomicActorStatus::new();

        let declined = status.fetch_update(Ordering::AcqRel, Ordering::Acquire, |_| None);
        assert_eq!(declined, Err(ActorStatus::Idle));

        let updated = status.fetch_update(Ordering::AcqRel, Ordering::Acquire, |old| {
            assert_eq!(old, ActorStatus::Idle);
            Some(ActorStatus::Scheduled(Pending::default()))
        });
        assert_eq!(
            updated,
            Ok((ActorStatus::Idle, ActorStatus::Scheduled(Pending::default())))
        );
        assert!(matches!(
            status.load(Ordering::Acquire),
            ActorStatus::Scheduled(_)
        ));
    }
}
