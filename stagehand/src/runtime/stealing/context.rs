use crate::runtime::stealing::worker::Worker;
use std::cell::RefCell;
use std::rc::Rc;

// Set on worker threads for the lifetime of their event loop.
thread_local! {
    static CURRENT_WORKER: RefCell<Option<Rc<Worker>>> = const { RefCell::new(None) };
}

/// Clears the current worker on drop.
pub(super) struct WorkerGuard {
    _p: (),
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let worker = CURRENT_WORKER
            .try_with(|current| current.borrow_mut().take())
            .ok()
            .flatten();

        // Dropped outside the borrow, the worker owns queued jobs.
        drop(worker);
    }
}

#[must_use]
pub(super) fn enter(worker: Rc<Worker>) -> WorkerGuard {
    CURRENT_WORKER.with(|current| {
        let prev = current.borrow_mut().replace(worker);
        debug_assert!(prev.is_none(), "thread already runs a worker");
    });

    WorkerGuard { _p: () }
}

/// The worker running on the current thread, if any.
pub(super) fn current_worker() -> Option<Rc<Worker>> {
    CURRENT_WORKER
        .try_with(|current| current.borrow().clone())
        .ok()
        .flatten()
}
