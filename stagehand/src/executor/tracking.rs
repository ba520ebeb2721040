use crate::actor::ActorLock;
use crate::executor::{SerialExecutor, SerialExecutorRef, TaskExecutorRef};
use crate::task::Task;
use smallvec::SmallVec;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

/// Executor a thread is currently acting as.
pub(crate) enum ActiveExecutor {
    Generic,

    /// The thread holds the actor lock for as long as the frame does.
    Actor(ActorLock),

    Custom(Arc<dyn SerialExecutor>),
}

impl ActiveExecutor {
    pub(crate) fn to_ref(&self) -> SerialExecutorRef {
        match self {
            Self::Generic => SerialExecutorRef::Generic,
            Self::Actor(lock) => SerialExecutorRef::DefaultActor(lock.actor().clone()),
            Self::Custom(executor) => SerialExecutorRef::Custom(Arc::clone(executor)),
        }
    }

    pub(crate) fn is_default_actor(&self) -> bool {
        matches!(self, Self::Actor(_))
    }

    /// Releases the thread from whatever this executor held on to.
    pub(crate) fn give_up(self) {
        if let Self::Actor(lock) = self {
            lock.give_up();
        }
    }
}

/// One frame of the per-thread executor tracking stack.
pub(crate) struct ExecutorTrackingContext {
    pub(crate) executor: ActiveExecutor,
    pub(crate) task_executor: TaskExecutorRef,

    /// Whether a running task may move this thread to another executor.
    pub(crate) allows_switching: bool,

    /// Task being polled in this frame, if any.
    pub(crate) current_task: Option<Task>,
}

thread_local! {
    static FRAMES: RefCell<SmallVec<[ExecutorTrackingContext; 4]>> =
        RefCell::new(SmallVec::new());
}

/// Pushes a tracking frame, shadowing the current one, and pops it on drop.
///
/// Frames are only entered by the job execution entry points. Everything
/// deeper in the call chain reads the innermost frame.
pub(crate) struct TrackingGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl TrackingGuard {
    pub(crate) fn enter(
        executor: ActiveExecutor,
        task_executor: TaskExecutorRef,
        allows_switching: bool,
    ) -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(ExecutorTrackingContext {
                executor,
                task_executor,
                allows_switching,
                current_task: None,
            });
            frames.len()
        });

        Self {
            depth,
            _not_send: PhantomData,
        }
    }

    /// Pops the frame and returns it, with whatever executor the thread ended
    /// up on.
    pub(crate) fn leave(self) -> ExecutorTrackingContext {
        let frame = self.pop();
        std::mem::forget(self);

        match frame {
            Some(frame) => frame,
            None => unbalanced(),
        }
    }

    fn pop(&self) -> Option<ExecutorTrackingContext> {
        FRAMES
            .try_with(|frames| {
                let mut frames = frames.borrow_mut();
                if frames.len() != self.depth {
                    return None;
                }
                frames.pop()
            })
            .ok()
            .flatten()
    }
}

impl Drop for TrackingGuard {
    fn drop(&mut self) {
        // Dropped outside the borrow: an actor lock in the frame unlocks here.
        let frame = self.pop();
        drop(frame);
    }
}

#[cold]
fn unbalanced() -> ! {
    panic!("executor tracking frames left unbalanced")
}

/// Runs `f` on the innermost frame. Returns `None` on a thread that is not
/// running a job.
///
/// `f` must not run user code or re-enter tracking.
pub(crate) fn with_frame<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut ExecutorTrackingContext) -> R,
{
    FRAMES
        .try_with(|frames| frames.borrow_mut().last_mut().map(f))
        .ok()
        .flatten()
}

#[allow(unused)]
pub(crate) fn is_tracking() -> bool {
    with_frame(|_| ()).is_some()
}

/// Executor the current thread acts as. Untracked threads are generic.
pub(crate) fn current_executor() -> SerialExecutorRef {
    with_frame(|frame| frame.executor.to_ref()).unwrap_or(SerialExecutorRef::Generic)
}

#[allow(unused)]
pub(crate) fn current_task_executor() -> TaskExecutorRef {
    with_frame(|frame| frame.task_executor.clone()).unwrap_or_default()
}

pub(crate) fn set_task_executor(task_executor: TaskExecutorRef) {
    with_frame(|frame| frame.task_executor = task_executor);
}

/// Runs `f` with the lock of the actor the current frame holds.
pub(crate) fn with_actor_lock<F, R>(f: F) -> Option<R>
where
    F: FnOnce(&mut ActorLock) -> R,
{
    with_frame(|frame| match &mut frame.executor {
        ActiveExecutor::Actor(lock) => Some(f(lock)),
        _ => None,
    })
    .flatten()
}

/// Moves the actor lock out of the current frame, leaving it generic.
pub(crate) fn take_actor_lock() -> Option<ActorLock> {
    with_frame(|frame| {
        match std::mem::replace(&mut frame.executor, ActiveExecutor::Generic) {
            ActiveExecutor::Actor(lock) => Some(lock),
            other => {
                frame.executor = other;
                None
            }
        }
    })
    .flatten()
}

pub(crate) fn restore_actor_lock(lock: ActorLock) {
    let leftover = with_frame(|frame| {
        debug_assert!(matches!(frame.executor, ActiveExecutor::Generic));
        std::mem::replace(&mut frame.executor, ActiveExecutor::Actor(lock))
    });
    drop(leftover);
}

/// Swaps the executor of the current frame and returns the previous one,
/// which the caller must give up outside of this call.
pub(crate) fn replace_executor(
    executor: ActiveExecutor,
    task_executor: TaskExecutorRef,
) -> Option<ActiveExecutor> {
    let mut executor = Some(executor);
    let prev = with_frame(|frame| {
        frame.task_executor = task_executor;
        executor
            .take()
            .map(|executor| std::mem::replace(&mut frame.executor, executor))
    })
    .flatten();

    // No frame: hand the new executor back so its lock is released.
    prev.or(executor)
}

pub(crate) fn current_task() -> Option<Task> {
    with_frame(|frame| frame.current_task.clone()).flatten()
}

/// Records `task` as the task polled in the current frame and returns the
/// previous one.
pub(crate) fn replace_current_task(task: Option<Task>) -> Option<Task> {
    let mut task = task;
    with_frame(|frame| std::mem::replace(&mut frame.current_task, task.take())).flatten()
}
