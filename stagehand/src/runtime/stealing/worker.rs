use crate::executor::{SerialExecutorRef, run_job};
use crate::job::Job;
use crate::runtime::RuntimeConfig;
use crate::runtime::stealing::{Handle, Shared};
use crate::runtime::ticker::{Ticker, TickerData, TickerEvents};
use crossbeam_deque::{Stealer, Worker as CbWorker};
use std::cell::{Cell, RefCell};
use std::iter;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{debug, warn};

/// One thread of the stealing pool. Lives in the thread local context of the
/// thread it runs on.
#[derive(Debug)]
pub(crate) struct Worker {
    index: usize,

    scheduler: Handle,

    /// Jobs scheduled from this thread. LIFO, stealable by every other worker.
    local: CbWorker<Job>,

    /// Handle to all of the other worker's local queues. If there are N
    /// workers we will have N-1 queues to steal from.
    stealers: Vec<Stealer<Job>>,

    /// Set by whoever unparks this thread.
    should_unpark: Arc<AtomicBool>,

    ticker: RefCell<Ticker>,

    policy: RefCell<EventLoopPolicy>,

    /// Whether we should try to find our next job in the global queue.
    pop_global_queue: Cell<bool>,
}

impl Worker {
    pub(super) fn new(
        index: usize,
        scheduler: Handle,
        local: CbWorker<Job>,
        mut stealers: Vec<Stealer<Job>>,
    ) -> Self {
        // Each worker gets its own search order to spread contention.
        fastrand::shuffle(&mut stealers);
        let policy = RefCell::new(EventLoopPolicy::from(&scheduler.cfg));

        Self {
            index,
            scheduler,
            local,
            stealers,
            should_unpark: Arc::new(AtomicBool::new(false)),
            ticker: RefCell::new(Ticker::new()),
            policy,
            pop_global_queue: Cell::new(false),
        }
    }

    pub(super) fn belongs_to(&self, scheduler: &Handle) -> bool {
        self.scheduler.ptr_eq(scheduler)
    }

    /// Pushes a job scheduled from this thread.
    pub(super) fn push_local(&self, job: Job) {
        self.local.push(job);
    }

    fn find_job(&self) -> Option<Job> {
        let global = &self.scheduler.injector;

        // Jobs sitting in the global queue would otherwise starve behind a
        // worker that keeps feeding its own local queue.
        if self.pop_global_queue.replace(false)
            && let Some(job) = global.steal_batch_and_pop(&self.local).success()
        {
            return Some(job);
        }

        self.local.pop().or_else(|| {
            iter::repeat_with(|| {
                global.steal_batch_and_pop(&self.local).or_else(||
                    // `collect` stops at the first `Success`.
                    self.stealers.iter().map(|s| s.steal()).collect())
            })
            .take(self.policy.borrow().max_steal_retries)
            .find(|s| !s.is_retry())
            .and_then(|s| s.success())
        })
    }

    pub(super) fn run(&self) {
        debug!(worker = self.index, "worker started");
        let shared = &self.scheduler.shared;

        loop {
            if let Some(job) = self.find_job() {
                run_job(job, &SerialExecutorRef::Generic);
            } else {
                shared.park_current_thread(&self.scheduler.injector, &self.should_unpark);
            }

            let events = self
                .ticker
                .borrow_mut()
                .tick(shared, &mut *self.policy.borrow_mut());

            if events.contains(TickerEvents::SHUTDOWN) {
                break;
            } else if events.contains(TickerEvents::POP_GLOBAL_QUEUE) {
                self.pop_global_queue.set(true);
            }
        }

        self.shutdown();
        debug!(worker = self.index, "worker stopped");
    }

    fn shutdown(&self) {
        let dropped = iter::from_fn(|| self.local.pop()).count();
        if dropped > 0 {
            warn!(worker = self.index, dropped, "dropping jobs queued at shutdown");
        }
    }
}

#[derive(Debug, Clone)]
struct EventLoopPolicy {
    global_queue_interval: u32,
    max_steal_retries: usize,
}

impl From<&RuntimeConfig> for EventLoopPolicy {
    fn from(cfg: &RuntimeConfig) -> EventLoopPolicy {
        EventLoopPolicy {
            global_queue_interval: cfg.global_queue_interval,
            max_steal_retries: cfg.max_steal_retries,
        }
    }
}

impl TickerData for EventLoopPolicy {
    type Context = Shared;

    #[inline(always)]
    fn update_and_check(&mut self, shared: &Shared, tick: u32) -> TickerEvents {
        if shared.is_shutdown() {
            return TickerEvents::SHUTDOWN;
        }

        if tick.is_multiple_of(self.global_queue_interval) {
            TickerEvents::POP_GLOBAL_QUEUE
        } else {
            TickerEvents::empty()
        }
    }
}
