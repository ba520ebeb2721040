#![allow(unused)]

use crate::job::JobPriority;
use crate::task::ThreadId;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    Schedule,
    EscalateThread,
    EndEscalation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Schedule {
        priority: JobPriority,
        /// The job drains an actor, as opposed to running user code directly.
        processes_actor: bool,
    },
    EscalateThread {
        thread: ThreadId,
        priority: JobPriority,
    },
    EndEscalation {
        priority: JobPriority,
    },
}

/// Records calls made to the global pool and the escalation service, so that
/// tests can assert on exact scheduling behavior.
#[derive(Debug, Clone)]
pub(crate) struct Tracker {
    calls: Arc<DashMap<Method, Vec<Call>>>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        let map = DashMap::new();
        map.insert(Method::Schedule, Vec::new());
        map.insert(Method::EscalateThread, Vec::new());
        map.insert(Method::EndEscalation, Vec::new());

        Self {
            calls: Arc::new(map),
        }
    }

    pub(crate) fn record(&self, method: Method, call: Call) {
        self.calls
            .get_mut(&method)
            .expect("method not found")
            .push(call)
    }

    pub(crate) fn get_calls(&self, method: &Method) -> Vec<Call> {
        self.calls
            .get(method)
            .expect("method not found")
            .value()
            .clone()
    }

    pub(crate) fn num_calls(&self, method: &Method) -> usize {
        self.calls.get(method).map_or(0, |calls| calls.len())
    }

    pub(crate) fn reset(&self) {
        self.calls.iter_mut().for_each(|mut calls| calls.clear());
    }
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new()
    }
}
