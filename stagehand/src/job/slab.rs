use crate::job::{Job, JobPriority};
use crossbeam_deque::{Injector, Steal};
use std::cell::UnsafeCell;
use std::fmt;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{LazyLock, OnceLock};

/// Width of a [`JobRef`] once packed into an actor status word.
pub(crate) const JOB_REF_BITS: u32 = 24;

const SEGMENT_SHIFT: u32 = 12;
const SEGMENT_LEN: usize = 1 << SEGMENT_SHIFT;
const NUM_SEGMENTS: usize = 1 << (JOB_REF_BITS - SEGMENT_SHIFT);

/// Highest slot index we can hand out. Index `i` is stored as `i + 1` so that
/// zero stays free to mean "no job".
const MAX_SLOTS: u32 = (1 << JOB_REF_BITS) - 1;

/// Compact handle to a job parked in the [`JobSlab`].
///
/// A `JobRef` is what actors link together: the incoming list head stored in
/// the actor status, the `next` links of the LIFO chain and the per-priority
/// buckets of the [`JobQueue`](crate::job::JobQueue) are all `JobRef`s.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct JobRef(NonZeroU32);

impl JobRef {
    fn from_index(index: u32) -> Self {
        debug_assert!(index < MAX_SLOTS);
        JobRef(NonZeroU32::MIN.saturating_add(index))
    }

    fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    pub(crate) fn to_bits(self) -> u32 {
        self.0.get()
    }

    pub(crate) fn from_bits(bits: u32) -> Option<Self> {
        NonZeroU32::new(bits).map(JobRef)
    }
}

impl fmt::Debug for JobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JobRef({})", self.0)
    }
}

struct Slot {
    /// Bits of the next `JobRef` in whichever list currently holds this slot.
    next: AtomicU32,

    /// Copy of the job priority, readable without touching `job`.
    priority: AtomicU8,

    job: UnsafeCell<Option<Job>>,
}

impl Slot {
    fn new() -> Self {
        Self {
            next: AtomicU32::new(0),
            priority: AtomicU8::new(JobPriority::Unspecified.as_u8()),
            job: UnsafeCell::new(None),
        }
    }
}

// Safety: a slot has a single owner at any time. The enqueuer owns it until
// the actor status CAS publishes it, then the thread holding the actor lock
// owns it until `take`. Only the atomics are read by anybody else.
unsafe impl Sync for Slot {}

/// Process-wide arena of job slots.
///
/// Segments are allocated lazily and never freed, so a `&Slot` stays valid
/// for the life of the process. Released slots are recycled through a
/// lock-free free list.
pub(crate) struct JobSlab {
    segments: Box<[OnceLock<Box<[Slot]>>]>,
    free: Injector<JobRef>,
    fresh: AtomicU32,
}

static JOBS: LazyLock<JobSlab> = LazyLock::new(JobSlab::new);

pub(crate) fn jobs() -> &'static JobSlab {
    &JOBS
}

impl JobSlab {
    fn new() -> Self {
        Self {
            segments: (0..NUM_SEGMENTS).map(|_| OnceLock::new()).collect(),
            free: Injector::new(),
            fresh: AtomicU32::new(0),
        }
    }

    /// Parks `job` in a free slot. The caller owns the returned slot.
    pub(crate) fn insert(&self, job: Job) -> JobRef {
        let job_ref = self.alloc();
        let slot = self.slot(job_ref);

        slot.next.store(0, Ordering::Relaxed);
        slot.priority.store(job.priority().as_u8(), Ordering::Relaxed);

        // Safety: `alloc` returned a slot nobody else references.
        unsafe {
            *slot.job.get() = Some(job);
        }

        job_ref
    }

    /// Removes the job from its slot and recycles the slot.
    ///
    /// # Safety
    ///
    /// The caller must own `job_ref`: either it inserted it and never published
    /// it, or it holds the lock of the actor the job was enqueued on and the job
    /// was detached from that actor's lists.
    pub(crate) unsafe fn take(&self, job_ref: JobRef) -> Job {
        let slot = self.slot(job_ref);

        let Some(job) = (unsafe { (*slot.job.get()).take() }) else {
            panic!("{job_ref:?} does not hold a job");
        };

        self.free.push(job_ref);
        job
    }

    pub(crate) fn next(&self, job_ref: JobRef) -> Option<JobRef> {
        JobRef::from_bits(self.slot(job_ref).next.load(Ordering::Relaxed))
    }

    // Links are published by the release CAS on the actor status, relaxed is
    // enough here.
    pub(crate) fn set_next(&self, job_ref: JobRef, next: Option<JobRef>) {
        self.slot(job_ref)
            .next
            .store(next.map_or(0, JobRef::to_bits), Ordering::Relaxed);
    }

    pub(crate) fn priority(&self, job_ref: JobRef) -> JobPriority {
        JobPriority::from_raw(self.slot(job_ref).priority.load(Ordering::Relaxed))
    }

    fn alloc(&self) -> JobRef {
        loop {
            match self.free.steal() {
                Steal::Success(job_ref) => return job_ref,
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }

        let index = self.fresh.fetch_add(1, Ordering::Relaxed);
        if index >= MAX_SLOTS {
            Self::exhausted();
        }

        JobRef::from_index(index)
    }

    fn slot(&self, job_ref: JobRef) -> &Slot {
        let index = job_ref.index();
        let segment = self.segments[index >> SEGMENT_SHIFT]
            .get_or_init(|| (0..SEGMENT_LEN).map(|_| Slot::new()).collect());

        &segment[index & (SEGMENT_LEN - 1)]
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to park job: {MAX_SLOTS} jobs already enqueued")
    }
}
