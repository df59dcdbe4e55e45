use std::{
    collections::{HashMap, HashSet},
    num::NonZeroU32,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use minyami::{
    queue::{ConcurrentRetryQueue, QueueState, RetryPolicy},
    task::SegmentTask,
    MinyamiError, MinyamiResult, Segment,
};
use tokio::time::Instant;

use crate::AssertWrapper;

fn segments(count: usize) -> Vec<Segment> {
    (0..count)
        .map(|i| Segment {
            url: format!("https://example.com/{i}.ts"),
            filename: format!("{i}.ts"),
        })
        .collect()
}

#[derive(Default)]
struct FlakyTask {
    delays: HashMap<String, Duration>,
    failures: Mutex<HashMap<String, u32>>,
    hang_once: Mutex<HashSet<String>>,

    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    attempts: Mutex<HashMap<String, u32>>,
    finished: Mutex<Vec<String>>,
}

impl FlakyTask {
    fn delay(mut self, filename: &str, delay: Duration) -> Self {
        self.delays.insert(filename.to_string(), delay);
        self
    }

    fn fail_times(self, filename: &str, times: u32) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(filename.to_string(), times);
        self
    }

    fn hang_once(self, filename: &str) -> Self {
        self.hang_once.lock().unwrap().insert(filename.to_string());
        self
    }

    fn attempts(&self, filename: &str) -> u32 {
        self.attempts
            .lock()
            .unwrap()
            .get(filename)
            .copied()
            .unwrap_or_default()
    }

    fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }
}

impl SegmentTask for FlakyTask {
    async fn run(&self, segment: &Segment) -> MinyamiResult<()> {
        let filename = segment.filename.clone();
        *self
            .attempts
            .lock()
            .unwrap()
            .entry(filename.clone())
            .or_default() += 1;

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let hang = self.hang_once.lock().unwrap().remove(&filename);
        let delay = if hang {
            Duration::from_secs(3600)
        } else {
            self.delays
                .get(&filename)
                .copied()
                .unwrap_or(Duration::from_millis(10))
        };
        tokio::time::sleep(delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let should_fail = match self.failures.lock().unwrap().get_mut(&filename) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        };
        if should_fail {
            return Err(MinyamiError::HttpError(
                reqwest::StatusCode::SERVICE_UNAVAILABLE,
            ));
        }

        self.finished.lock().unwrap().push(filename);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_budget_is_never_exceeded() {
    for budget in 1..=4u32 {
        let mut task = FlakyTask::default();
        for i in 0..7u64 {
            // later segments finish first
            task = task.delay(&format!("{i}.ts"), Duration::from_millis(100 - i * 10));
        }
        let task = task.fail_times("3.ts", 2);

        let mut queue = ConcurrentRetryQueue::new(segments(7), NonZeroU32::new(budget).unwrap());
        let mut max_reported = 0;
        queue
            .drive(&task, |_, state| {
                max_reported = max_reported.max(state.in_flight);
            })
            .await
            .assert_success();

        assert!(task.max_in_flight.load(Ordering::SeqCst) <= budget as usize);
        assert!(max_reported < budget as usize);
        assert_eq!(queue.state().finished_segments, 7);
        assert_eq!(queue.state().in_flight, 0);
        assert_eq!(queue.queue_state(), QueueState::Complete);
    }
}

#[tokio::test(start_paused = true)]
async fn test_budget_is_used() {
    let task = FlakyTask::default();
    let mut queue = ConcurrentRetryQueue::new(segments(8), NonZeroU32::new(3).unwrap());
    queue.drive(&task, |_, _| {}).await.assert_success();
    assert_eq!(task.max_in_flight.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn test_completion_order_is_unconstrained() {
    let task = FlakyTask::default()
        .delay("0.ts", Duration::from_millis(300))
        .delay("1.ts", Duration::from_millis(200))
        .delay("2.ts", Duration::from_millis(100));

    let mut reported = Vec::new();
    let mut queue = ConcurrentRetryQueue::new(segments(3), NonZeroU32::new(3).unwrap());
    queue
        .drive(&task, |segment, _| reported.push(segment.filename.clone()))
        .await
        .assert_success();

    assert_eq!(reported, vec!["2.ts", "1.ts", "0.ts"]);
    assert_eq!(task.finished(), reported);
}

#[tokio::test(start_paused = true)]
async fn test_failed_segment_is_retried_until_success() {
    let task = FlakyTask::default().fail_times("1.ts", 5);

    let mut finished = Vec::new();
    let mut queue = ConcurrentRetryQueue::new(segments(4), NonZeroU32::new(2).unwrap());
    queue
        .drive(&task, |segment, _| finished.push(segment.filename.clone()))
        .await
        .assert_success();

    assert_eq!(task.attempts("1.ts"), 6);
    assert_eq!(task.attempts("0.ts"), 1);
    assert_eq!(finished.iter().filter(|f| *f == "1.ts").count(), 1);
    assert_eq!(finished.len(), 4);
    // requeued at the tail
    assert_eq!(finished.last().map(String::as_str), Some("1.ts"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_ceiling() {
    let task = FlakyTask::default().fail_times("2.ts", u32::MAX);

    let mut queue = ConcurrentRetryQueue::new(segments(3), NonZeroU32::new(2).unwrap())
        .with_retry(RetryPolicy::unbounded().with_max_retries(2));
    let result = queue.drive(&task, |_, _| {}).await;

    match result {
        Err(MinyamiError::RetriesExhausted { filename, attempts }) => {
            assert_eq!(filename, "2.ts");
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(task.attempts("2.ts"), 3);
    assert_eq!(queue.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_retry_backoff() {
    let task = FlakyTask::default()
        .delay("0.ts", Duration::ZERO)
        .fail_times("0.ts", 2);

    let started_at = Instant::now();
    let mut queue = ConcurrentRetryQueue::new(segments(1), NonZeroU32::new(1).unwrap())
        .with_retry(RetryPolicy::unbounded().with_backoff(Duration::from_millis(100)));
    queue.drive(&task, |_, _| {}).await.assert_success();

    // 100ms before the first retry, 200ms before the second one
    assert!(started_at.elapsed() >= Duration::from_millis(300));
    assert_eq!(task.attempts("0.ts"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_hung_task_times_out() {
    let task = FlakyTask::default().hang_once("1.ts");

    let started_at = Instant::now();
    let mut queue = ConcurrentRetryQueue::new(segments(2), NonZeroU32::new(2).unwrap())
        .with_task_timeout(Some(Duration::from_secs(5)));
    queue.drive(&task, |_, _| {}).await.assert_success();

    assert_eq!(task.attempts("1.ts"), 2);
    assert!(started_at.elapsed() < Duration::from_secs(3600));
    assert_eq!(queue.state().finished_segments, 2);
}

#[tokio::test]
async fn test_empty_queue_completes() {
    let task = FlakyTask::default();
    let mut calls = 0;
    let mut queue = ConcurrentRetryQueue::new(Vec::new(), NonZeroU32::new(5).unwrap());
    assert_eq!(queue.queue_state(), QueueState::Idle);

    queue.drive(&task, |_, _| calls += 1).await.assert_success();
    assert_eq!(calls, 0);
    assert_eq!(queue.queue_state(), QueueState::Complete);
}
