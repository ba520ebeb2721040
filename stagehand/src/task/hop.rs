use crate::executor::SerialExecutorRef;
use crate::executor::switch::{Switch, task_switch};
use crate::executor::tracking;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Moves the current task to `executor`.
///
/// Completes immediately when the task already runs there, or when the
/// current thread could be handed over to `executor` in place. Otherwise the
/// task suspends and resumes from a job enqueued on `executor`.
///
/// # Panics
///
/// Polling the returned future outside of a task panics.
pub fn hop_to(executor: SerialExecutorRef) -> Hop {
    Hop {
        executor,
        suspended: false,
    }
}

/// Future returned by [`hop_to`].
#[must_use = "futures do nothing unless awaited"]
#[derive(Debug)]
pub struct Hop {
    executor: SerialExecutorRef,
    suspended: bool,
}

impl Future for Hop {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        // Resumed from the job enqueued on the target executor.
        if self.suspended {
            return Poll::Ready(());
        }

        let Some(task) = tracking::current_task() else {
            panic!("`hop_to` polled outside of a task");
        };

        match task_switch(&task, self.executor.clone()) {
            Switch::Continue => Poll::Ready(()),
            Switch::Suspend => {
                self.suspended = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        }
    }
}
