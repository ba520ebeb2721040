use crate::job::slab::{JobRef, jobs};
use crate::job::priority::PRIORITY_BUCKETS;

#[derive(Debug, Default, Clone, Copy)]
struct Bucket {
    head: Option<JobRef>,
    tail: Option<JobRef>,
}

/// Prioritized job queue of a default actor.
///
/// Jobs are intrusively linked through their slab slots. One FIFO bucket per
/// priority class; `dequeue` always serves the highest non-empty bucket.
///
/// The queue is only ever touched by the thread holding the actor lock, so
/// none of this needs to be atomic.
#[derive(Debug, Default)]
pub(crate) struct JobQueue {
    buckets: [Bucket; PRIORITY_BUCKETS],
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.buckets.iter().all(|b| b.head.is_none())
    }

    /// Appends a single job at the tail of its priority bucket.
    pub(crate) fn enqueue(&mut self, job: JobRef) {
        let slab = jobs();
        let bucket = &mut self.buckets[slab.priority(job).bucket()];

        slab.set_next(job, None);
        match bucket.tail {
            Some(tail) => slab.set_next(tail, Some(job)),
            None => bucket.head = Some(job),
        }
        bucket.tail = Some(job);
    }

    /// Takes a chain detached from the incoming list, where `lifo_head` is the
    /// most recently enqueued job, and distributes it into the buckets oldest
    /// first.
    pub(crate) fn enqueue_contents_of(&mut self, lifo_head: JobRef) {
        let slab = jobs();

        // Reverse in place so the chain starts from the oldest job.
        let mut oldest = None;
        let mut cursor = Some(lifo_head);
        while let Some(job) = cursor {
            cursor = slab.next(job);
            slab.set_next(job, oldest);
            oldest = Some(job);
        }

        let mut cursor = oldest;
        while let Some(job) = cursor {
            cursor = slab.next(job);
            self.enqueue(job);
        }
    }

    /// Pops the oldest job of the highest non-empty priority bucket.
    pub(crate) fn dequeue(&mut self) -> Option<JobRef> {
        let slab = jobs();
        let bucket = self.buckets.iter_mut().find(|b| b.head.is_some())?;

        let job = bucket.head?;
        bucket.head = slab.next(job);
        if bucket.head.is_none() {
            bucket.tail = None;
        }

        slab.set_next(job, None);
        Some(job)
    }
}
