use std::cell::Cell;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::{fmt, num::NonZeroU32, num::NonZeroU64};

/// An opaque ID that uniquely identifies a task or an actor for the life of
/// the process.
///
/// IDs are handed out from a single counter and are never re-used.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(NonZeroU64);

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Id {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Even at a billion ids per second this takes centuries to wrap.
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique ID: bitspace exhausted")
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}

/// Width of a [`ThreadId`] once packed into an actor status word.
pub(crate) const THREAD_ID_BITS: u32 = 29;

/// Compact identity of an OS thread, recorded as the drainer of an actor and
/// handed to the priority escalation service.
///
/// `std::thread::ThreadId` has no stable integer form, so we assign our own on
/// first use from each thread.
#[derive(Eq, PartialEq, Clone, Copy, Hash, Debug)]
pub struct ThreadId(NonZeroU32);

thread_local! {
    static CURRENT_THREAD_ID: Cell<Option<ThreadId>> = const { Cell::new(None) };
}

impl ThreadId {
    /// Returns the id of the calling thread, assigning one if needed.
    pub fn current() -> ThreadId {
        CURRENT_THREAD_ID.with(|cell| match cell.get() {
            Some(id) => id,
            None => {
                let id = Self::next();
                cell.set(Some(id));
                id
            }
        })
    }

    fn next() -> ThreadId {
        static COUNTER: AtomicU32 = AtomicU32::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        if id >= 1 << THREAD_ID_BITS {
            Self::exhausted();
        }

        let Some(id) = NonZeroU32::new(id) else {
            Self::exhausted();
        };

        ThreadId(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique thread ID: bitspace exhausted")
    }

    pub fn as_u32(&self) -> u32 {
        self.0.get()
    }

    pub(crate) fn from_bits(bits: u32) -> Option<ThreadId> {
        NonZeroU32::new(bits).map(ThreadId)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
