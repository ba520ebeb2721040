use crate::job::JobPriority;
use crate::task::ThreadId;
use std::fmt;

/// Service raising the scheduling priority of the OS thread draining an actor.
///
/// Escalation is advisory. The scheduler calls `escalate_thread` when a job of
/// higher priority lands on an actor that some thread is already draining, and
/// `end_escalation` when that thread gives the actor up.
///
/// Install one with [`Builder::escalation`](crate::runtime::Builder::escalation).
pub trait PriorityEscalation: Send + Sync + fmt::Debug + 'static {
    /// Asks the OS to run `thread` at least at `priority` until the matching
    /// [`end_escalation`](Self::end_escalation).
    fn escalate_thread(&self, thread: ThreadId, priority: JobPriority);

    /// Called on the escalated thread once it stops representing the actor.
    /// `priority` is the priority the thread was escalated to.
    fn end_escalation(&self, priority: JobPriority);
}

/// Default escalation service: does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEscalation;

impl PriorityEscalation for NoEscalation {
    fn escalate_thread(&self, _thread: ThreadId, _priority: JobPriority) {}

    fn end_escalation(&self, _priority: JobPriority) {}
}
