use crate::actor::status::ActorStatus;
use crate::actor::{Actor, ActorRef, Unlocked};
use crate::executor::tracking;
use crate::job::{Job, JobPriority};
use crate::runtime::Builder;
use crate::task::ThreadId;
use crate::test_utils::{
    CountingFinalizer, RecordingEscalation, RunLog, init_local_runtime, init_stealing_runtime,
    init_tracing, wait_until,
};
use crate::utils::scheduler::{Call, Method};
use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use rstest::rstest;
use static_assertions::assert_impl_all;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

assert_impl_all!(Actor: Send, Sync, Clone);
assert_impl_all!(ActorRef: Send, Sync, Clone);

fn processing(priority: JobPriority) -> Call {
    Call::Schedule {
        priority,
        processes_actor: true,
    }
}

#[test]
fn test_escalated_enqueue_schedules_stealer() -> Result<()> {
    init_tracing();
    let (runtime, scheduler) = init_local_runtime(None)?;
    let actor = runtime.new_actor();
    let log = RunLog::default();

    actor.enqueue(log.job(JobPriority::Utility, "j1"));
    assert_eq!(actor.actor_ref().ref_count(), 1);

    actor.enqueue(log.job(JobPriority::UserInitiated, "j2"));

    // The stealer carries one extra reference until it loses the race.
    assert_eq!(actor.actor_ref().ref_count(), 2);
    assert_eq!(
        scheduler.tracker.get_calls(&Method::Schedule),
        vec![
            processing(JobPriority::Utility),
            processing(JobPriority::UserInitiated),
        ]
    );

    assert_eq!(runtime.run_until_idle(), 2);

    assert_eq!(log.entries(), vec!["j2", "j1"]);
    assert_eq!(actor.actor_ref().ref_count(), 1);
    assert_eq!(actor.actor_ref().status(), ActorStatus::Idle);
    Ok(())
}

#[rstest]
#[case::same_priority(JobPriority::Default, JobPriority::Default, 1)]
#[case::lower_priority(JobPriority::Default, JobPriority::Background, 1)]
#[case::higher_priority(JobPriority::Default, JobPriority::UserInteractive, 2)]
fn test_only_raised_priority_schedules_again(
    #[case] first: JobPriority,
    #[case] second: JobPriority,
    #[case] expected: usize,
) -> Result<()> {
    let (runtime, scheduler) = init_local_runtime(None)?;
    let actor = runtime.new_actor();

    actor.enqueue(Job::new(first, || {}));
    actor.enqueue(Job::new(second, || {}));

    assert_eq!(scheduler.tracker.num_calls(&Method::Schedule), expected);
    runtime.run_until_idle();
    assert_eq!(actor.actor_ref().ref_count(), 1);
    Ok(())
}

#[test]
fn test_enqueue_on_running_actor_escalates_drainer() -> Result<()> {
    let escalation = RecordingEscalation::new();
    let builder = Builder::new_local().escalation(escalation.clone());
    let (runtime, scheduler) = init_local_runtime(Some(builder))?;

    let actor = runtime.new_actor();
    let log = RunLog::default();

    actor.enqueue(Job::new(JobPriority::Utility, {
        let actor = actor.clone();
        let log = log.clone();
        move || {
            log.push("j1");
            actor.enqueue(log.job(JobPriority::UserInitiated, "j2"));
        }
    }));

    runtime.run_until_idle();

    assert_eq!(log.entries(), vec!["j1", "j2"]);
    assert_eq!(scheduler.tracker.num_calls(&Method::Schedule), 1);
    assert_eq!(
        escalation.tracker.get_calls(&Method::EscalateThread),
        vec![Call::EscalateThread {
            thread: ThreadId::current(),
            priority: JobPriority::UserInitiated,
        }]
    );
    assert_eq!(
        escalation.tracker.get_calls(&Method::EndEscalation),
        vec![Call::EndEscalation {
            priority: JobPriority::UserInitiated,
        }]
    );
    Ok(())
}

#[test]
fn test_enqueue_stealer_on_idle_actor_is_noop() -> Result<()> {
    let (runtime, scheduler) = init_local_runtime(None)?;
    let actor = runtime.new_actor();

    actor.actor_ref().enqueue_stealer(JobPriority::UserInteractive);

    assert_eq!(scheduler.tracker.num_calls(&Method::Schedule), 0);
    assert_eq!(actor.actor_ref().ref_count(), 1);
    assert_eq!(actor.actor_ref().status(), ActorStatus::Idle);
    Ok(())
}

#[test]
fn test_escalating_task_handle_represents_priority() -> Result<()> {
    let (runtime, scheduler) = init_local_runtime(None)?;
    let actor = runtime.new_actor();

    let handle = runtime
        .spawn_builder()
        .with_priority(JobPriority::Utility)
        .spawn(actor.executor(), async { 42 });

    handle.escalate(JobPriority::UserInitiated);

    assert_eq!(
        scheduler.tracker.get_calls(&Method::Schedule),
        vec![
            processing(JobPriority::Utility),
            processing(JobPriority::UserInitiated),
        ]
    );

    runtime.run_until_idle();
    assert_eq!(handle.join()?, 42);
    assert_eq!(actor.actor_ref().ref_count(), 1);
    Ok(())
}

#[test]
fn test_drain_budget_reschedules_actor() -> Result<()> {
    let builder = Builder::new_local().drain_budget(2);
    let (runtime, scheduler) = init_local_runtime(Some(builder))?;
    let actor = runtime.new_actor();
    let log = RunLog::default();

    for name in ["a", "b", "c", "d", "e"] {
        actor.enqueue(log.job(JobPriority::Default, name));
    }

    assert_eq!(runtime.run_until_idle(), 3);
    assert_eq!(log.entries(), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(
        scheduler.tracker.get_calls(&Method::Schedule),
        vec![processing(JobPriority::Default); 3]
    );
    assert_eq!(actor.actor_ref().ref_count(), 1);
    Ok(())
}

#[test]
fn test_dropping_idle_actor_finalizes() -> Result<()> {
    let (runtime, _) = init_local_runtime(None)?;
    let finalizer = CountingFinalizer::default();

    let actor = runtime.new_actor().with_finalizer(finalizer.finalizer());
    let other = actor.clone();
    let actor_ref = actor.actor_ref().clone();

    drop(actor);
    assert_eq!(finalizer.count(), 0);

    drop(other);
    assert_eq!(finalizer.count(), 1);
    assert!(actor_ref.is_finalized());

    // Late jobs are dropped, not run.
    let log = RunLog::default();
    actor_ref.enqueue(log.job(JobPriority::Default, "late"));
    runtime.run_until_idle();

    assert_eq!(log.len(), 0);
    assert_eq!(finalizer.count(), 1);
    Ok(())
}

#[test]
fn test_dropping_scheduled_actor_defers_finalize() -> Result<()> {
    let (runtime, _) = init_local_runtime(None)?;
    let finalizer = CountingFinalizer::default();
    let log = RunLog::default();

    let actor = runtime.new_actor().with_finalizer(finalizer.finalizer());
    actor.enqueue(log.job(JobPriority::Default, "queued"));
    drop(actor);

    // Still scheduled: finalized once it is seen idle.
    assert_eq!(finalizer.count(), 0);

    runtime.run_until_idle();
    assert_eq!(log.entries(), vec!["queued"]);
    assert_eq!(finalizer.count(), 1);
    Ok(())
}

#[test]
fn test_dropping_running_actor_leaves_zombie() -> Result<()> {
    let builder = Builder::new_local().drain_budget(1);
    let (runtime, _) = init_local_runtime(Some(builder))?;
    let finalizer = CountingFinalizer::default();
    let log = RunLog::default();

    let actor = runtime.new_actor().with_finalizer(finalizer.finalizer());
    let actor_ref = actor.actor_ref().clone();
    let slot = Arc::new(Mutex::new(None::<Actor>));
    let seen = Arc::new(Mutex::new(None));

    actor.enqueue(Job::new(JobPriority::Default, {
        let slot = Arc::clone(&slot);
        let seen = Arc::clone(&seen);
        let actor_ref = actor_ref.clone();
        let finalizer = finalizer.clone();
        move || {
            drop(slot.lock().take());
            *seen.lock() = Some((
                matches!(actor_ref.status(), ActorStatus::Zombie { .. }),
                finalizer.count(),
            ));
        }
    }));
    actor.enqueue(log.job(JobPriority::Default, "never"));
    *slot.lock() = Some(actor);

    runtime.run_until_idle();

    // The drainer finalized the actor when the budget made it unlock, and
    // dropped what was left.
    assert_eq!(*seen.lock(), Some((true, 0)));
    assert_eq!(log.len(), 0);
    assert_eq!(finalizer.count(), 1);
    assert!(actor_ref.is_finalized());
    Ok(())
}

#[test]
fn test_precondition_isolated() -> Result<()> {
    let (runtime, _) = init_local_runtime(None)?;
    let actor = runtime.new_actor();
    let isolated = Arc::new(AtomicBool::new(false));

    actor.enqueue(Job::new(JobPriority::Default, {
        let actor = actor.clone();
        let isolated = Arc::clone(&isolated);
        move || {
            actor.precondition_isolated();
            isolated.store(actor.is_isolated(), Ordering::Release);
        }
    }));

    runtime.run_until_idle();
    assert!(isolated.load(Ordering::Acquire));

    assert!(!actor.is_isolated());
    let res = catch_unwind(AssertUnwindSafe(|| actor.precondition_isolated()));
    assert!(res.is_err());
    Ok(())
}

#[test]
fn test_stealing_drains_serially_without_losing_jobs() -> Result<()> {
    const SUBMITTERS: usize = 4;
    const JOBS_PER_SUBMITTER: usize = 250;

    init_tracing();
    let (runtime, _) = init_stealing_runtime(4, None)?;
    let actor = runtime.new_actor();

    let in_critical = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let ran = Arc::new(AtomicUsize::new(0));
    let isolated = Arc::new(AtomicUsize::new(0));

    std::thread::scope(|s| {
        for i in 0..SUBMITTERS {
            let actor = actor.clone();
            let (in_critical, overlaps, ran, isolated) = (
                Arc::clone(&in_critical),
                Arc::clone(&overlaps),
                Arc::clone(&ran),
                Arc::clone(&isolated),
            );

            s.spawn(move || {
                let priorities = [
                    JobPriority::Background,
                    JobPriority::Default,
                    JobPriority::UserInteractive,
                ];

                for j in 0..JOBS_PER_SUBMITTER {
                    let priority = priorities[(i + j) % priorities.len()];
                    let executor = actor.executor();
                    let (in_critical, overlaps, ran, isolated) = (
                        Arc::clone(&in_critical),
                        Arc::clone(&overlaps),
                        Arc::clone(&ran),
                        Arc::clone(&isolated),
                    );

                    actor.enqueue(Job::new(priority, move || {
                        if in_critical.swap(true, Ordering::AcqRel) {
                            overlaps.fetch_add(1, Ordering::Relaxed);
                        }
                        if tracking::current_executor() == executor {
                            isolated.fetch_add(1, Ordering::Relaxed);
                        }
                        ran.fetch_add(1, Ordering::Relaxed);
                        in_critical.store(false, Ordering::Release);
                    }));
                }
            });
        }
    });

    let total = SUBMITTERS * JOBS_PER_SUBMITTER;
    wait_until(|| ran.load(Ordering::Acquire) == total);
    wait_until(|| actor.actor_ref().status() == ActorStatus::Idle);

    assert_eq!(overlaps.load(Ordering::Relaxed), 0);
    assert_eq!(isolated.load(Ordering::Relaxed), total);

    // Losing stealers hand their reference back.
    wait_until(|| actor.actor_ref().ref_count() == 1);

    runtime.shutdown();
    Ok(())
}

#[rstest]
#[case::as_drainer(true)]
#[case::assume(false)]
fn test_lock_excludes_other_threads(#[case] as_drainer: bool) -> Result<()> {
    let (runtime, scheduler) = init_local_runtime(None)?;
    let actor = runtime.new_actor();
    let actor_ref = actor.actor_ref();

    let lock = actor_ref
        .try_lock_assume()
        .ok_or_else(|| anyhow!("idle actor refused the lock"))?;
    assert_eq!(actor_ref.status().drainer(), Some(ThreadId::current()));

    let locked_elsewhere = std::thread::scope(|s| {
        s.spawn(|| {
            if as_drainer {
                // A stealer holds a reference, handed back when it loses.
                actor_ref.retain();
                actor_ref.try_lock_as_drainer().is_some()
            } else {
                actor_ref.try_lock_assume().is_some()
            }
        })
        .join()
    });

    assert_eq!(locked_elsewhere.ok(), Some(false));
    assert_eq!(actor_ref.ref_count(), 1);
    assert_eq!(actor_ref.status().drainer(), Some(ThreadId::current()));

    assert!(matches!(lock.unlock(false), Ok(Unlocked::Idle)));
    assert_eq!(actor_ref.status(), ActorStatus::Idle);
    assert_eq!(scheduler.tracker.num_calls(&Method::Schedule), 0);
    Ok(())
}

#[rstest]
#[case::keeps_lock(false)]
#[case::forced(true)]
fn test_unlock_with_incoming_jobs(#[case] force: bool) -> Result<()> {
    let (runtime, scheduler) = init_local_runtime(None)?;
    let actor = runtime.new_actor();
    let log = RunLog::default();

    let lock = actor
        .actor_ref()
        .try_lock_assume()
        .ok_or_else(|| anyhow!("idle actor refused the lock"))?;

    // Only on the incoming list, never moved to the queue.
    actor.enqueue(log.job(JobPriority::Default, "late"));
    assert_eq!(scheduler.tracker.num_calls(&Method::Schedule), 0);

    match lock.unlock(force) {
        Ok(unlocked) => {
            assert!(force);
            assert_eq!(unlocked, Unlocked::Rescheduled);
            assert!(matches!(actor.actor_ref().status(), ActorStatus::Scheduled(_)));

            // The lock was swapped for a single processing job.
            assert_eq!(actor.actor_ref().ref_count(), 1);
            assert_eq!(
                scheduler.tracker.get_calls(&Method::Schedule),
                vec![processing(JobPriority::Default)]
            );
            assert_eq!(runtime.run_until_idle(), 1);
        }
        Err(mut lock) => {
            assert!(!force);
            lock.process_incoming_queue();
            let job = lock
                .drain_one()
                .ok_or_else(|| anyhow!("incoming job lost"))?;
            job.run_in_established_context();
            assert!(matches!(lock.unlock(false), Ok(Unlocked::Idle)));
        }
    }

    assert_eq!(log.entries(), vec!["late"]);
    assert_eq!(actor.actor_ref().status(), ActorStatus::Idle);
    assert_eq!(actor.actor_ref().ref_count(), 1);
    Ok(())
}

#[test]
fn test_enqueue_stealer_on_running_actor_escalates_drainer() -> Result<()> {
    let escalation = RecordingEscalation::new();
    let builder = Builder::new_local().escalation(escalation.clone());
    let (runtime, scheduler) = init_local_runtime(Some(builder))?;
    let actor = runtime.new_actor();

    let lock = actor
        .actor_ref()
        .try_lock_assume()
        .ok_or_else(|| anyhow!("idle actor refused the lock"))?;

    actor.actor_ref().enqueue_stealer(JobPriority::UserInteractive);

    assert_eq!(scheduler.tracker.num_calls(&Method::Schedule), 0);
    assert_eq!(actor.actor_ref().ref_count(), 1);
    assert_eq!(
        escalation.tracker.get_calls(&Method::EscalateThread),
        vec![Call::EscalateThread {
            thread: ThreadId::current(),
            priority: JobPriority::UserInteractive,
        }]
    );

    assert!(matches!(lock.unlock(false), Ok(Unlocked::Idle)));
    assert_eq!(
        escalation.tracker.get_calls(&Method::EndEscalation),
        vec![Call::EndEscalation {
            priority: JobPriority::UserInteractive,
        }]
    );
    Ok(())
}

#[rstest]
#[case::owning_job(false)]
#[case::with_stealer(true)]
fn test_shutdown_resolves_dropped_processing_jobs(#[case] escalate: bool) -> Result<()> {
    let (runtime, scheduler) = init_local_runtime(None)?;
    let finalizer = CountingFinalizer::default();
    let log = RunLog::default();

    let actor = runtime.new_actor().with_finalizer(finalizer.finalizer());
    let actor_ref = actor.actor_ref().clone();

    actor.enqueue(log.job(JobPriority::Utility, "queued"));
    if escalate {
        actor.enqueue(log.job(JobPriority::UserInitiated, "escalated"));
        assert_eq!(actor_ref.ref_count(), 2);
    }
    assert_eq!(scheduler.num_queued(), if escalate { 2 } else { 1 });

    runtime.shutdown();

    // Nothing ran, but the actor is idle again and the stealer handed its
    // reference back.
    assert_eq!(log.len(), 0);
    assert_eq!(actor_ref.status(), ActorStatus::Idle);
    assert_eq!(actor_ref.ref_count(), 1);

    // Jobs enqueued after shutdown are dropped the same way.
    actor.enqueue(log.job(JobPriority::Default, "late"));
    assert_eq!(log.len(), 0);
    assert_eq!(actor_ref.status(), ActorStatus::Idle);
    assert_eq!(finalizer.count(), 0);

    drop(actor);
    assert_eq!(finalizer.count(), 1);
    assert!(actor_ref.is_finalized());
    Ok(())
}

#[test]
fn test_enqueue_racing_last_release_never_runs_after_finalize() -> Result<()> {
    const ROUNDS: usize = 200;

    let (runtime, _) = init_local_runtime(None)?;

    for _ in 0..ROUNDS {
        let finalizer = CountingFinalizer::default();
        let actor = runtime.new_actor().with_finalizer(finalizer.finalizer());
        let actor_ref = actor.actor_ref().clone();
        let ran_after_finalize = Arc::new(AtomicBool::new(false));

        let job = Job::new(JobPriority::Default, {
            let finalizer = finalizer.clone();
            let ran_after_finalize = Arc::clone(&ran_after_finalize);
            move || ran_after_finalize.store(finalizer.count() > 0, Ordering::Release)
        });

        let enqueuer = actor_ref.clone();
        std::thread::scope(|s| {
            s.spawn(move || drop(actor));
            s.spawn(move || enqueuer.enqueue(job));
        });

        runtime.run_until_idle();

        // Either the job ran before the actor went away, or it was dropped.
        assert!(!ran_after_finalize.load(Ordering::Acquire));
        assert_eq!(finalizer.count(), 1);
        assert!(actor_ref.is_finalized());
    }

    Ok(())
}
