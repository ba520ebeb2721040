use crate::executor::tracking::{self, ActiveExecutor};
use crate::executor::{SerialExecutorRef, TaskExecutorRef};
use crate::task::Task;
use tracing::debug;

/// Where a task goes after asking to run on another executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Switch {
    /// The task keeps running on the current thread, which now acts as the
    /// requested executor.
    Continue,

    /// The task must suspend and be enqueued on the requested executor.
    Suspend,
}

/// Moves the running `task` to `target`.
///
/// The task's resume executor is always set to `target`. When the current
/// thread can give up its executor and take over `target` without blocking,
/// the hand-off happens in place and nothing is enqueued.
pub(crate) fn task_switch(task: &Task, target: SerialExecutorRef) -> Switch {
    let target_task_executor = task.task_executor();

    let current = tracking::with_frame(|frame| {
        (
            frame.executor.to_ref(),
            frame.task_executor.clone(),
            frame.allows_switching,
        )
    });

    let Some((current, current_task_executor, allows_switching)) = current else {
        task.set_resume_on(target);
        return Switch::Suspend;
    };

    if !must_switch_to_run(
        &current,
        &target,
        &current_task_executor,
        &target_task_executor,
    ) {
        task.set_resume_on(target);
        return Switch::Continue;
    }

    let can_give_up = current_task_executor.is_undefined()
        && allows_switching
        && !matches!(current, SerialExecutorRef::Custom(_));

    if can_give_up
        && target_task_executor.is_undefined()
        && let Some(assumed) = try_assume_thread(&target)
    {
        let prev = tracking::replace_executor(assumed, TaskExecutorRef::undefined());
        if let Some(prev) = prev {
            prev.give_up();
        }

        debug!(task = %task.id(), from = ?current, to = ?target, "same-thread hand-off");
        task.set_resume_on(target);
        return Switch::Continue;
    }

    debug!(task = %task.id(), from = ?current, to = ?target, "suspending to switch executor");
    task.set_resume_on(target);
    Switch::Suspend
}

fn must_switch_to_run(
    current: &SerialExecutorRef,
    target: &SerialExecutorRef,
    current_task_executor: &TaskExecutorRef,
    target_task_executor: &TaskExecutorRef,
) -> bool {
    if current != target && !current.is_complex_equal(target) {
        return true;
    }

    current_task_executor != target_task_executor
}

/// Takes over the current thread for `target` without blocking.
fn try_assume_thread(target: &SerialExecutorRef) -> Option<ActiveExecutor> {
    match target {
        SerialExecutorRef::Generic => Some(ActiveExecutor::Generic),
        SerialExecutorRef::DefaultActor(actor) => actor.try_lock_assume().map(ActiveExecutor::Actor),
        SerialExecutorRef::Custom(_) => None,
    }
}
