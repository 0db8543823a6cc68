use quicklook::error::JobError;
use quicklook::scheduler::{
    Completion, JobContext, JobOutcome, JobOutput, JobState, TaskScheduler,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Drive the scheduler like the host loop until `count` completions arrive
fn collect(scheduler: &mut TaskScheduler, count: usize) -> Vec<Completion> {
    let deadline = Instant::now() + Duration::from_secs(30);
    let mut completions = Vec::new();
    while completions.len() < count {
        scheduler.tick();
        if let Some(completion) = scheduler.poll_completion() {
            completions.push(completion);
        }
        assert!(Instant::now() < deadline, "timed out waiting for completions");
        std::thread::sleep(Duration::from_millis(2));
    }
    completions
}

#[test]
fn ten_jobs_never_overlap_and_finish_in_order() {
    let mut scheduler = TaskScheduler::new();
    let running = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let mut ids = Vec::new();
    for i in 0..10u64 {
        let running = Arc::clone(&running);
        let max_seen = Arc::clone(&max_seen);
        ids.push(scheduler.submit(format!("job-{}", i), move |_| {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(10 + (i * 7) % 13));
            running.fetch_sub(1, Ordering::SeqCst);
            Ok(JobOutput::Message(i.to_string()))
        }));
    }

    let completions = collect(&mut scheduler, 10);
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    let finished: Vec<u64> = completions.iter().map(|c| c.job_id).collect();
    assert_eq!(finished, ids);
    assert!(completions.iter().all(|c| c.state() == JobState::Done));
    assert_eq!(scheduler.stats().completed, 10);
    assert!(scheduler.is_idle());
}

#[test]
fn cancel_all_then_tick_stays_idle() {
    let mut scheduler = TaskScheduler::new();
    let executed = Arc::new(AtomicUsize::new(0));
    for _ in 0..3 {
        let executed = Arc::clone(&executed);
        scheduler.submit("queued", move |_| {
            executed.fetch_add(1, Ordering::SeqCst);
            Ok(JobOutput::Nothing)
        });
    }

    let report = scheduler.cancel_all();
    assert_eq!(report.discarded.len(), 3);
    assert_eq!(report.interrupted, None);

    assert_eq!(scheduler.tick(), None);
    assert!(scheduler.is_idle());
    std::thread::sleep(Duration::from_millis(50));
    assert!(scheduler.poll_completion().is_none());
    assert_eq!(executed.load(Ordering::SeqCst), 0);
    assert_eq!(scheduler.pending(), 0);
}

#[test]
fn failed_job_does_not_block_the_next_one() {
    let mut scheduler = TaskScheduler::new();
    let a = scheduler.submit("a", |_| {
        Err(JobError::ReductionFailed("missing flat".to_string()))
    });
    let b = scheduler.submit("b", |_| Ok(JobOutput::Message("ok".to_string())));

    let completions = collect(&mut scheduler, 2);
    assert_eq!(completions[0].job_id, a);
    assert_eq!(
        completions[0].outcome,
        JobOutcome::Failed(JobError::ReductionFailed("missing flat".to_string()))
    );
    assert_eq!(completions[1].job_id, b);
    assert_eq!(
        completions[1].outcome,
        JobOutcome::Done(JobOutput::Message("ok".to_string()))
    );
    let stats = scheduler.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.completed, 1);
}

#[test]
fn work_submitted_after_cancel_runs_normally() {
    let mut scheduler = TaskScheduler::new();
    scheduler.submit("long", |ctx| {
        while !ctx.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(JobError::Interrupted)
    });
    scheduler.tick();
    scheduler.cancel_all();
    let cancelled = scheduler.poll_completion().unwrap();
    assert_eq!(cancelled.outcome, JobOutcome::Cancelled);

    let next = scheduler.submit("next", |_| Ok(JobOutput::Nothing));
    let completions = collect(&mut scheduler, 1);
    assert_eq!(completions[0].job_id, next);
    assert_eq!(completions[0].state(), JobState::Done);
}

/// Counts concurrently running callables; never looks at the cancel flag
fn tracked(
    running: &Arc<AtomicUsize>,
    max_seen: &Arc<AtomicUsize>,
    sleep_ms: u64,
) -> impl FnOnce(&JobContext) -> Result<JobOutput, JobError> + Send + 'static {
    let running = Arc::clone(running);
    let max_seen = Arc::clone(max_seen);
    move |_: &JobContext| {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        max_seen.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(sleep_ms));
        running.fetch_sub(1, Ordering::SeqCst);
        Ok(JobOutput::Nothing)
    }
}

#[test]
fn cancelled_job_ignoring_the_flag_still_blocks_the_next_one() {
    let mut scheduler = TaskScheduler::new();
    let running = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));

    let stubborn = scheduler.submit("stubborn", tracked(&running, &max_seen, 300));
    assert_eq!(scheduler.tick(), Some(stubborn));
    std::thread::sleep(Duration::from_millis(20));
    let report = scheduler.cancel_all();
    assert_eq!(report.interrupted, Some(stubborn));
    assert_eq!(
        scheduler.poll_completion().unwrap().outcome,
        JobOutcome::Cancelled
    );

    let next = scheduler.submit("next", tracked(&running, &max_seen, 10));
    let completions = collect(&mut scheduler, 1);
    assert_eq!(completions[0].job_id, next);
    assert_eq!(completions[0].state(), JobState::Done);
    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
}
