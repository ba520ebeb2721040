use crate::job::Job;
use crate::runtime::stealing::context;
use crate::runtime::stealing::{Handle, worker::Worker};
use anyhow::{Result, anyhow};
use crossbeam_deque::{Stealer, Worker as CbWorker};
use parking_lot::{Condvar, Mutex};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

/// Worker threads of a stealing scheduler.
#[derive(Debug)]
pub(super) struct ThreadPool {
    handles: Vec<thread::JoinHandle<()>>,
}

/// Counts started threads. Unlike a `Barrier`, waiting on fewer threads than
/// planned is possible when a spawn fails halfway.
#[derive(Debug, Default)]
struct StartLatch {
    started: Mutex<usize>,
    cond: Condvar,
}

impl StartLatch {
    fn count_down(&self) {
        *self.started.lock() += 1;
        self.cond.notify_all();
    }

    fn wait(&self, expected: usize) {
        let mut started = self.started.lock();
        while *started < expected {
            self.cond.wait(&mut started);
        }
    }
}

impl ThreadPool {
    pub(super) fn spawn(scheduler: &Handle) -> Result<Self> {
        let num_workers = scheduler.cfg.worker_threads;

        let mut local_queues = Vec::with_capacity(num_workers);
        let mut stealers = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            let w = CbWorker::new_lifo();
            stealers.push(w.stealer());
            local_queues.push(w);
        }

        let latch = Arc::new(StartLatch::default());
        let mut handles = Vec::with_capacity(num_workers);

        for (index, local) in local_queues.into_iter().enumerate() {
            // Each worker steals from every queue but its own.
            let other_stealers = stealers
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != index)
                .map(|(_, s)| s.clone())
                .collect::<Vec<_>>();

            match spawn_worker_thread(scheduler, index, local, other_stealers, &latch) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    // Stop whatever already started before reporting.
                    scheduler.shared.shutdown.store(true, Ordering::Release);
                    scheduler.shared.unpark_all_threads();

                    let pool = ThreadPool { handles };
                    if let Err(join_err) = pool.join_all() {
                        return Err(e.context(join_err));
                    }
                    return Err(e);
                }
            }
        }

        // Spawning threads is async, wait for all threads to be started...
        latch.wait(handles.len());

        Ok(Self { handles })
    }

    pub(super) fn join_all(self) -> Result<()> {
        let panicked = self
            .handles
            .into_iter()
            .filter_map(|handle| handle.join().err())
            .count();

        if panicked == 0 {
            Ok(())
        } else {
            Err(anyhow!("{} thread(s) panicked", panicked))
        }
    }
}

fn spawn_worker_thread(
    scheduler: &Handle,
    index: usize,
    local: CbWorker<Job>,
    stealers: Vec<Stealer<Job>>,
    latch: &Arc<StartLatch>,
) -> Result<thread::JoinHandle<()>> {
    let mut builder = thread::Builder::new().name((scheduler.cfg.thread_name.0)());

    if let Some(stack_size) = scheduler.cfg.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }

    let scheduler = scheduler.clone();
    let latch = Arc::clone(latch);

    let handle = builder.spawn(move || {
        let worker = Rc::new(Worker::new(index, scheduler, local, stealers));
        let _guard = context::enter(Rc::clone(&worker));
        latch.count_down();

        worker.run();
    })?;

    Ok(handle)
}
