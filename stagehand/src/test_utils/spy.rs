use crate::escalation::PriorityEscalation;
use crate::job::JobPriority;
use crate::task::ThreadId;
use crate::utils::scheduler::{Call, Method, Tracker};

/// Escalation service recording every request it receives.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingEscalation {
    pub(crate) tracker: Tracker,
}

impl RecordingEscalation {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl PriorityEscalation for RecordingEscalation {
    fn escalate_thread(&self, thread: ThreadId, priority: JobPriority) {
        self.tracker
            .record(Method::EscalateThread, Call::EscalateThread { thread, priority });
    }

    fn end_escalation(&self, priority: JobPriority) {
        self.tracker
            .record(Method::EndEscalation, Call::EndEscalation { priority });
    }
}
