use crate::actor::Actor;
use crate::escalation::{NoEscalation, PriorityEscalation};
use crate::executor::{self, SerialExecutorRef};
use crate::job::Job;
use crate::runtime::local;
use crate::runtime::spawn::SpawnBuilder;
use crate::runtime::stealing;
use crate::runtime::Scheduler;
use crate::task::JoinHandle;
use crate::utils::thread::set_current_thread_name;
use anyhow::Result;
use std::cell::RefCell;
use std::convert::TryFrom;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error};

/// Global queue interval default value.
const GLOBAL_QUEUE_INTERVAL: u32 = 31;

/// Maximum number of stealing attempts.
const MAX_STEAL_RETRIES: usize = 3;

/// Every worker needs its own `ThreadId`, which must fit an actor status word.
const MAX_WORKER_THREADS: usize = 1 << 12;

const MIN_THREAD_STACK_SIZE: usize = 1 << 14;

/// How long `block_on` on the local runtime sleeps when no job is queued and
/// the root task waits on another thread.
const BLOCK_ON_WAIT: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    Local,
    Stealing,
}

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let worker_count = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let id = worker_count.fetch_add(1, Ordering::Relaxed);
        format!("stagehand-{id}")
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// Reasons a runtime configuration is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("cannot create a local runtime: a runtime is already active on this thread")]
    RuntimeActive,

    #[error("worker_threads ({0}) exceeds the maximum of {max}", max = MAX_WORKER_THREADS)]
    TooManyWorkers(usize),

    #[error("thread_stack_size ({0}) is below the minimum of {min} bytes", min = MIN_THREAD_STACK_SIZE)]
    StackTooSmall(usize),
}

#[derive(Debug)]
pub struct Builder {
    /// Runtime type
    kind: Kind,

    /// The number of worker threads, used by the stealing scheduler. Defaults
    /// to 1 per core.
    worker_threads: Option<usize>,

    /// Name fn used for threads spawned by the runtime.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the runtime.
    thread_stack_size: Option<usize>,

    /// How many ticks before pulling a job from the global injector queue.
    global_queue_interval: u32,

    /// How many times a worker will loop over the global injector queue and
    /// other stealable queues to try and find work, before parking.
    max_steal_retries: usize,

    /// Jobs a processing job drains before giving the thread back to the pool.
    drain_budget: Option<usize>,

    escalation: Arc<dyn PriorityEscalation>,
}

impl Builder {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            global_queue_interval: GLOBAL_QUEUE_INTERVAL,
            max_steal_retries: MAX_STEAL_RETRIES,
            drain_budget: None,
            escalation: Arc::new(NoEscalation),
        }
    }

    /// Returns a new builder with the local thread scheduler selected.
    ///
    /// Jobs only run when the owning thread calls
    /// [`Runtime::run_until_idle`] or [`Runtime::block_on`].
    pub fn new_local() -> Builder {
        Builder::new(Kind::Local)
    }

    /// Returns a new builder with the work stealing scheduler selected.
    pub fn new_stealing() -> Builder {
        Builder::new(Kind::Stealing)
    }

    /// The number of worker threads of the stealing scheduler.
    ///
    /// Defaults to 1 worker per CPU core.
    #[track_caller]
    pub fn worker_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "worker_threads must be greater than 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets name of threads spawned by the `Runtime`'s thread pool.
    ///
    /// The default name is "stagehand-{id}", where id is monotonically
    /// increasing.
    ///
    /// Thread names are truncated beyond 15 bytes according to pthread
    /// limitations.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of threads spawned by the
    /// `Runtime`'s thread pool.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for worker threads.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// specifies minimal stack size.
    #[track_caller]
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        assert!(
            val.is_power_of_two(),
            "thread_stack_size must be a power of two"
        );
        self.thread_stack_size = Some(val);
        self
    }

    /// Sets the number of scheduler ticks after which a worker pulls from
    /// the global queue before looking at its local queue.
    ///
    /// A tick is one job run, or one failed attempt at finding a job. Lower
    /// values get newly submitted jobs started sooner, at the cost of cache
    /// locality for jobs spawned locally.
    #[track_caller]
    pub fn global_queue_interval(mut self, val: u32) -> Self {
        assert!(val > 0, "global_queue_interval must be greater than 0");
        self.global_queue_interval = val;
        self
    }

    #[track_caller]
    pub fn max_steal_retries(mut self, val: usize) -> Self {
        assert!(val > 0, "max_steal_retries must be greater than 0");
        self.max_steal_retries = val;
        self
    }

    /// Caps how many jobs a thread drains from an actor before rescheduling
    /// the actor and going back to the pool. Unbounded by default.
    #[track_caller]
    pub fn drain_budget(mut self, val: usize) -> Self {
        assert!(val > 0, "drain_budget must be greater than 0");
        self.drain_budget = Some(val);
        self
    }

    /// Installs the service raising the priority of threads draining
    /// escalated actors.
    pub fn escalation(mut self, escalation: impl PriorityEscalation) -> Self {
        self.escalation = Arc::new(escalation);
        self
    }

    /// Creates the configured `Runtime`.
    pub fn try_build(self) -> Result<Runtime> {
        match &self.kind {
            Kind::Local => self.try_build_local_runtime(),
            Kind::Stealing => self.try_build_stealing_runtime(),
        }
    }
}

// The local runtime owned by this thread. It counts as active until it is shut
// down, whichever thread ends up dropping it.
thread_local! {
    static ACTIVE_LOCAL_RUNTIME: RefCell<Weak<local::Scheduler>> = const { RefCell::new(Weak::new()) };
}

impl Builder {
    fn try_build_local_runtime(self) -> Result<Runtime> {
        let cfg: RuntimeConfig = self.try_into()?;

        // Upgraded outside the borrow, the last strong reference may drop here.
        let active = ACTIVE_LOCAL_RUNTIME.with(|active| active.borrow().upgrade());
        if active.is_some_and(|scheduler| !scheduler.is_shutdown()) {
            return Err(BuildError::RuntimeActive.into());
        }

        let scheduler = local::Scheduler::new(&cfg).into_handle();
        ACTIVE_LOCAL_RUNTIME.with(|active| *active.borrow_mut() = scheduler.downgrade());

        // There is no way to modify the current thread name using `std::thread`,
        // so we use `libc::` and platform specific low-level interface.
        set_current_thread_name(&cfg.thread_name);

        debug!(kind = ?cfg.kind, "runtime started");
        Ok(Runtime::new(Scheduler::Local(scheduler)))
    }

    fn try_build_stealing_runtime(self) -> Result<Runtime> {
        let cfg: RuntimeConfig = self.try_into()?;
        let scheduler = stealing::Scheduler::new(&cfg).into_handle();

        scheduler.spawn_workers()?;

        debug!(kind = ?cfg.kind, workers = cfg.worker_threads, "runtime started");
        Ok(Runtime::new(Scheduler::Stealing(scheduler)))
    }
}

/// Owns the global pool that actors, tasks and generic jobs run on.
#[derive(Debug)]
pub struct Runtime {
    scheduler: Scheduler,
}

impl Runtime {
    pub(super) fn new(scheduler: Scheduler) -> Runtime {
        Runtime { scheduler }
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Creates an idle default actor draining on this runtime.
    pub fn new_actor(&self) -> Actor {
        Actor::new(self)
    }

    /// Spawns `future` as a task starting on `executor`.
    pub fn spawn<F>(&self, executor: SerialExecutorRef, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn_builder().spawn(executor, future)
    }

    /// Configures a task before spawning it.
    pub fn spawn_builder(&self) -> SpawnBuilder<'_> {
        SpawnBuilder::new(&self.scheduler)
    }

    /// Enqueues `job` on `executor`.
    pub fn enqueue(&self, executor: &SerialExecutorRef, job: Job) {
        executor::enqueue_on(&self.scheduler, executor, job);
    }

    /// Spawns `future` on the generic executor and blocks until it completes.
    ///
    /// On the local runtime, the calling thread runs queued jobs until then.
    /// Never call this from a job running on the same runtime.
    ///
    /// # Panics
    ///
    /// Panics if the future panics.
    #[track_caller]
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let handle = self.spawn(SerialExecutorRef::Generic, future);

        if let Scheduler::Local(local) = &self.scheduler {
            while !handle.is_finished() {
                if local.run_until_idle() == 0 {
                    local.wait_for_jobs(BLOCK_ON_WAIT);
                }
            }
        }

        match handle.join() {
            Ok(output) => output,
            Err(e) => panic!("failed to drive future to completion: {e}"),
        }
    }

    /// Runs queued jobs on the current thread until none is left, and returns
    /// how many ran. Always 0 on the stealing runtime, whose workers run jobs
    /// on their own.
    pub fn run_until_idle(&self) -> usize {
        match &self.scheduler {
            Scheduler::Local(handle) => handle.run_until_idle(),
            Scheduler::Stealing(_) => 0,
        }
    }

    /// Shuts the runtime down.
    ///
    /// Jobs still queued on the global pool are dropped. The thread initiating
    /// the shutdown blocks until every worker thread exited.
    pub fn shutdown(self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&self) {
        match &self.scheduler {
            Scheduler::Local(handle) => {
                handle.shutdown();
            }
            Scheduler::Stealing(handle) => {
                if let Err(e) = handle.shutdown() {
                    error!(error = ?e, "error during runtime shutdown");
                }
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

// Test-only helpers
#[cfg(test)]
impl Runtime {
    pub(crate) fn expect_local_scheduler(&self) -> local::Handle {
        match &self.scheduler {
            Scheduler::Local(handle) => handle.clone(),
            _ => panic!("Runtime not using local sheduler"),
        }
    }

    pub(crate) fn expect_stealing_scheduler(&self) -> stealing::Handle {
        match &self.scheduler {
            Scheduler::Stealing(handle) => handle.clone(),
            _ => panic!("Runtime not using stealing sheduler"),
        }
    }
}

// Export runtime builder as a RuntimeConfig object to be consumed by each
// scheduler and the actors draining on it.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) kind: Kind,
    pub(crate) worker_threads: usize,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) global_queue_interval: u32,
    pub(crate) max_steal_retries: usize,
    pub(crate) drain_budget: Option<usize>,
    pub(crate) escalation: Arc<dyn PriorityEscalation>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            kind: Kind::Local,
            worker_threads: 1,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            global_queue_interval: GLOBAL_QUEUE_INTERVAL,
            max_steal_retries: MAX_STEAL_RETRIES,
            drain_budget: None,
            escalation: Arc::new(NoEscalation),
        }
    }
}

impl RuntimeConfig {
    fn validate(&self) -> Result<(), BuildError> {
        if self.kind == Kind::Stealing && self.worker_threads > MAX_WORKER_THREADS {
            return Err(BuildError::TooManyWorkers(self.worker_threads));
        }

        if let Some(stack_size) = self.thread_stack_size
            && stack_size < MIN_THREAD_STACK_SIZE
        {
            return Err(BuildError::StackTooSmall(stack_size));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let worker_threads = match builder.worker_threads {
            Some(worker_threads) => worker_threads,
            None => thread::available_parallelism()?.get(),
        };

        let cfg = RuntimeConfig {
            kind: builder.kind,
            worker_threads,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            global_queue_interval: builder.global_queue_interval,
            max_steal_retries: builder.max_steal_retries,
            drain_budget: builder.drain_budget,
            escalation: builder.escalation,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}
