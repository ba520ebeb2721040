use crossbeam_deque::Injector;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread};

#[derive(Debug)]
struct ParkedThread {
    thread: Thread,
    should_unpark: Arc<AtomicBool>,
}

/// State shared by every worker of a stealing scheduler.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) shutdown: AtomicBool,

    /// LIFO collection of parked threads. We unpark thread in LIFO order as the
    /// latest parked thread is the one where CPU cache will be the hotest.
    parked_threads: RwLock<VecDeque<ParkedThread>>,
}

impl Shared {
    pub(crate) fn new(worker_threads: usize) -> Self {
        Self {
            shutdown: AtomicBool::new(false),
            parked_threads: RwLock::new(VecDeque::with_capacity(worker_threads)),
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Parks the current thread until the scheduler unparks it because work
    /// was submitted, or the runtime shuts down.
    pub(crate) fn park_current_thread<T>(&self, injector: &Injector<T>, should_unpark: &Arc<AtomicBool>) {
        {
            let mut parked_threads = self.parked_threads.write();

            // Checked *while holding the lock*: submitters push before they
            // take it to unpark.
            if !injector.is_empty() || self.is_shutdown() {
                return;
            }

            should_unpark.store(false, Ordering::Release);
            parked_threads.push_back(ParkedThread {
                thread: thread::current(),
                should_unpark: Arc::clone(should_unpark),
            });
        }

        // Loop to account for spurious wakeups as per docs.
        while !should_unpark.load(Ordering::Acquire) {
            thread::park();
        }
    }

    pub(crate) fn unpark_one_thread(&self) -> bool {
        let Some(parked) = self.parked_threads.write().pop_back() else {
            return false;
        };

        parked.should_unpark.store(true, Ordering::Release);
        parked.thread.unpark();
        true
    }

    pub(crate) fn unpark_all_threads(&self) -> usize {
        let mut num_unparked = 0;
        let mut parked_threads = self.parked_threads.write();

        while let Some(parked) = parked_threads.pop_back() {
            num_unparked += 1;
            parked.should_unpark.store(true, Ordering::Release);
            parked.thread.unpark();
        }

        num_unparked
    }

    #[allow(unused)]
    pub(crate) fn num_parked(&self) -> usize {
        self.parked_threads.read().len()
    }
}
