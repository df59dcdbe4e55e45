use std::{collections::VecDeque, num::NonZeroU32, time::Duration};

use futures::{stream::FuturesUnordered, StreamExt};
use tokio::time::Instant;

use crate::{
    error::{MinyamiError, MinyamiResult},
    segment::Segment,
    task::SegmentTask,
};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// How failed segments are retried.
///
/// The default retries forever without waiting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the first failed attempt of a segment.
    pub max_retries: Option<u32>,
    /// Base delay before a retry, doubled for every further failure.
    pub backoff: Option<Duration>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = Some(backoff);
        self
    }

    fn exhausted(&self, failures: u32) -> bool {
        self.max_retries.is_some_and(|max| failures > max)
    }

    /// Delay before the next attempt of a segment which failed `failures` times.
    pub fn delay(&self, failures: u32) -> Option<Duration> {
        let backoff = self.backoff?;
        if failures == 0 {
            return None;
        }
        let factor = 2u32.saturating_pow(failures - 1);
        Some(backoff.saturating_mul(factor).min(MAX_BACKOFF))
    }
}

/// Counters of one archive run.
#[derive(Debug, Clone, Copy)]
pub struct RunState {
    pub started_at: Instant,
    pub total_segments: usize,
    pub finished_segments: usize,
    pub in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Draining,
    Complete,
}

struct QueueEntry {
    segment: Segment,
    failures: u32,
}

/// Drains segments through a [SegmentTask] with at most `concurrency`
/// tasks in flight, putting failed segments back at the tail of the queue.
///
/// All tasks are polled by the future returned from [Self::drive], so the
/// queue and its counters only have a single writer.
pub struct ConcurrentRetryQueue {
    pending: VecDeque<QueueEntry>,
    concurrency: NonZeroU32,
    retry: RetryPolicy,
    task_timeout: Option<Duration>,

    state: RunState,
    queue_state: QueueState,
}

impl ConcurrentRetryQueue {
    pub fn new(segments: Vec<Segment>, concurrency: NonZeroU32) -> Self {
        let total_segments = segments.len();
        Self {
            pending: segments
                .into_iter()
                .map(|segment| QueueEntry {
                    segment,
                    failures: 0,
                })
                .collect(),
            concurrency,
            retry: RetryPolicy::default(),
            task_timeout: None,

            state: RunState {
                started_at: Instant::now(),
                total_segments,
                finished_segments: 0,
                in_flight: 0,
            },
            queue_state: QueueState::Idle,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_task_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.task_timeout = timeout;
        self
    }

    pub fn with_started_at(mut self, started_at: Instant) -> Self {
        self.state.started_at = started_at;
        self
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn queue_state(&self) -> QueueState {
        self.queue_state
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Run until every segment succeeded.
    ///
    /// `on_finished` is called once per segment, right after its successful attempt.
    /// Fails only when a [RetryPolicy] ceiling is exceeded.
    pub async fn drive<T, P>(&mut self, task: &T, mut on_finished: P) -> MinyamiResult<()>
    where
        T: SegmentTask,
        P: FnMut(&Segment, &RunState),
    {
        if self.queue_state == QueueState::Complete {
            return Ok(());
        }
        self.queue_state = QueueState::Draining;

        let retry = self.retry;
        let task_timeout = self.task_timeout;
        let dispatch = move |entry: QueueEntry| async move {
            if let Some(delay) = retry.delay(entry.failures) {
                tokio::time::sleep(delay).await;
            }
            let result = match task_timeout {
                Some(timeout) => tokio::time::timeout(timeout, task.run(&entry.segment))
                    .await
                    .unwrap_or_else(|_| {
                        Err(MinyamiError::Timeout {
                            filename: entry.segment.filename.clone(),
                        })
                    }),
                None => task.run(&entry.segment).await,
            };
            (entry, result)
        };

        let concurrency = self.concurrency.get() as usize;
        let mut in_flight = FuturesUnordered::new();
        loop {
            while self.state.in_flight < concurrency {
                let Some(entry) = self.pending.pop_front() else {
                    break;
                };
                self.state.in_flight += 1;
                in_flight.push(dispatch(entry));
            }

            if self.pending.is_empty() && self.state.in_flight == 0 {
                self.queue_state = QueueState::Complete;
                return Ok(());
            }

            let Some((mut entry, result)) = in_flight.next().await else {
                continue;
            };
            self.state.in_flight -= 1;

            match result {
                Ok(()) => {
                    self.state.finished_segments += 1;
                    on_finished(&entry.segment, &self.state);
                }
                Err(e) => {
                    entry.failures += 1;
                    let filename = &entry.segment.filename;
                    if self.retry.exhausted(entry.failures) {
                        tracing::error!("Processing {filename} failed, max retries exceed. {e}");
                        return Err(MinyamiError::RetriesExhausted {
                            filename: filename.clone(),
                            attempts: entry.failures,
                        });
                    }

                    tracing::warn!("Processing {filename} failed, retry later. {e}");
                    self.pending.push_back(entry);
                }
            }
        }
    }
}
