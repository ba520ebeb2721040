use bitflags::bitflags;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub(crate) struct Snapshot: u8 {
        /// The task is being polled by some thread.
        const RUNNING = 1 << 0;

        /// The task must be polled again. While the task is idle this means it
        /// sits in a queue somewhere; while it is running it means the runner
        /// has to reschedule it after the poll.
        const NOTIFIED = 1 << 1;

        /// The future has completed or panicked. Terminal.
        const COMPLETE = 1 << 2;
    }
}

/// Lifecycle state of a task.
pub(crate) struct State {
    val: AtomicU8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionToRunning {
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransitionToIdle {
    Ok,
    OkNotified,
}

impl State {
    /// A new task is notified: its first job is about to be enqueued.
    pub(crate) fn new() -> State {
        State {
            val: AtomicU8::new(Snapshot::NOTIFIED.bits()),
        }
    }

    pub(crate) fn load(&self) -> Snapshot {
        Snapshot::from_bits_retain(self.val.load(Ordering::Acquire))
    }

    fn fetch_update<F>(&self, mut f: F) -> (Snapshot, Snapshot)
    where
        F: FnMut(Snapshot) -> Snapshot,
    {
        let mut curr = self.load();
        loop {
            let next = f(curr);
            match self.val.compare_exchange_weak(
                curr.bits(),
                next.bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return (curr, next),
                Err(actual) => curr = Snapshot::from_bits_retain(actual),
            }
        }
    }

    /// Consumes the notification and marks the task as running.
    pub(crate) fn transition_to_running(&self) -> TransitionToRunning {
        let (prev, next) = self.fetch_update(|curr| {
            let busy = curr.intersects(Snapshot::RUNNING | Snapshot::COMPLETE);
            if busy || !curr.contains(Snapshot::NOTIFIED) {
                return curr;
            }
            (curr - Snapshot::NOTIFIED) | Snapshot::RUNNING
        });

        if prev == next {
            TransitionToRunning::Failed
        } else {
            TransitionToRunning::Success
        }
    }

    /// Called by the runner after a `Pending` poll. If the task was woken
    /// while it was being polled, it stays notified and the runner must
    /// schedule it.
    pub(crate) fn transition_to_idle(&self) -> TransitionToIdle {
        let (prev, _) = self.fetch_update(|curr| {
            debug_assert!(curr.contains(Snapshot::RUNNING));
            curr - Snapshot::RUNNING
        });

        if prev.contains(Snapshot::NOTIFIED) {
            TransitionToIdle::OkNotified
        } else {
            TransitionToIdle::Ok
        }
    }

    /// Returns `true` if the caller is responsible for scheduling the task.
    pub(crate) fn transition_to_notified(&self) -> bool {
        let (prev, _) = self.fetch_update(|curr| {
            if curr.contains(Snapshot::COMPLETE) {
                curr
            } else {
                curr | Snapshot::NOTIFIED
            }
        });

        !prev.intersects(Snapshot::RUNNING | Snapshot::NOTIFIED | Snapshot::COMPLETE)
    }

    pub(crate) fn transition_to_complete(&self) {
        let (prev, _) = self.fetch_update(|curr| {
            (curr - Snapshot::RUNNING - Snapshot::NOTIFIED) | Snapshot::COMPLETE
        });
        debug_assert!(!prev.contains(Snapshot::COMPLETE), "task completed twice");
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.load().contains(Snapshot::COMPLETE)
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}
