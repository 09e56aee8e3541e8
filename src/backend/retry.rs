//! Bounded retry with shrinking batches.
//!
//! A request for `k` samples is issued as one batch. When a batch fails the
//! next batch is halved (rounding up) and one attempt is consumed; when it
//! succeeds the obtained samples are subtracted from the outstanding count.
//! A batch that returns fewer samples than asked for also costs an attempt.
//! Once the attempts run out the remaining samples are abandoned, which
//! degrades the branching factor instead of failing the caller.

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::RequestConfig;
use crate::error::BackendResult;

/// Retry limits shared by per-call backoff and batch shrinking.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries of a single call before it is given up.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub base_delay: Duration,
    /// Time budget for retrying a single call.
    pub max_elapsed: Duration,
    /// Failed batches tolerated per `generate` request.
    pub batch_attempts: u32,
}

impl RetryPolicy {
    /// Exponential delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = 2_u32.saturating_pow(retry - 1);
        self.base_delay.saturating_mul(factor)
    }
}

impl From<&RequestConfig> for RetryPolicy {
    fn from(config: &RequestConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: Duration::from_millis(config.retry_delay_ms),
            max_elapsed: Duration::from_millis(config.max_retry_elapsed_ms),
            batch_attempts: config.batch_attempts,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RequestConfig::default())
    }
}

/// State of a shrinking-batch request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRetry {
    remaining: usize,
    next_batch: usize,
    attempts_left: u32,
    failures: u32,
}

impl BatchRetry {
    /// Start a request for `count` samples with `attempts` failed batches allowed.
    pub fn new(count: usize, attempts: u32) -> Self {
        Self {
            remaining: count,
            next_batch: count,
            attempts_left: attempts,
            failures: 0,
        }
    }

    /// Size of the next batch, or `None` once finished or out of attempts.
    pub fn next_request(&self) -> Option<usize> {
        if self.remaining == 0 || self.attempts_left == 0 {
            return None;
        }
        Some(self.next_batch.min(self.remaining).max(1))
    }

    /// Record that a batch of `requested` samples returned `obtained` texts.
    pub fn record_success(&mut self, requested: usize, obtained: usize) {
        let obtained = obtained.min(requested).min(self.remaining);
        self.remaining -= obtained;
        if obtained < requested {
            self.shrink();
        }
        self.next_batch = self.next_batch.min(self.remaining);
    }

    /// Record that a batch failed outright.
    pub fn record_failure(&mut self) {
        self.shrink();
    }

    fn shrink(&mut self) {
        self.next_batch = self.next_batch.div_ceil(2);
        self.attempts_left = self.attempts_left.saturating_sub(1);
        self.failures += 1;
    }

    /// Samples still outstanding.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn attempts_left(&self) -> u32 {
        self.attempts_left
    }

    /// Batches that failed or came back short.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn is_finished(&self) -> bool {
        self.next_request().is_none()
    }
}

/// Drive `request` through the shrinking-batch state machine.
///
/// `request(n)` asks for `n` samples. Returned texts keep request order
/// across batches. Never fails: exhausted samples are simply missing from
/// the result.
pub async fn collect_samples<F, Fut>(count: usize, policy: &RetryPolicy, mut request: F) -> Vec<String>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = BackendResult<Vec<String>>>,
{
    let mut state = BatchRetry::new(count, policy.batch_attempts);
    let mut samples = Vec::with_capacity(count);

    while let Some(batch) = state.next_request() {
        match request(batch).await {
            Ok(mut texts) => {
                texts.truncate(batch);
                let obtained = texts.len();
                samples.extend(texts);
                state.record_success(batch, obtained);
                debug!(
                    batch,
                    obtained,
                    remaining = state.remaining(),
                    "Batch completed"
                );
            }
            Err(e) => {
                state.record_failure();
                warn!(
                    error = %e,
                    batch,
                    remaining = state.remaining(),
                    attempts_left = state.attempts_left(),
                    "Batch request failed, retrying with fewer samples"
                );
            }
        }

        if !state.is_finished() && state.failures() > 0 {
            tokio::time::sleep(policy.delay_for(state.failures())).await;
        }
    }

    if samples.len() < count {
        warn!(
            requested = count,
            obtained = samples.len(),
            "Backend returned fewer completions than requested"
        );
    }

    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn fast_policy(batch_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_elapsed: Duration::ZERO,
            batch_attempts,
        }
    }

    fn transient() -> BackendError {
        BackendError::Api {
            status: 503,
            message: "overloaded".to_string(),
        }
    }

    #[test]
    fn test_batch_retry_full_success() {
        let mut state = BatchRetry::new(4, 3);
        assert_eq!(state.next_request(), Some(4));
        state.record_success(4, 4);
        assert_eq!(state.remaining(), 0);
        assert!(state.is_finished());
        assert_eq!(state.attempts_left(), 3);
    }

    #[test]
    fn test_batch_retry_halves_on_failure() {
        let mut state = BatchRetry::new(5, 4);
        state.record_failure();
        assert_eq!(state.next_request(), Some(3));
        state.record_failure();
        assert_eq!(state.next_request(), Some(2));
        state.record_failure();
        assert_eq!(state.next_request(), Some(1));
        state.record_failure();
        assert_eq!(state.next_request(), None);
        assert_eq!(state.remaining(), 5);
        assert_eq!(state.failures(), 4);
    }

    #[test]
    fn test_batch_retry_resumes_after_failure() {
        let mut state = BatchRetry::new(5, 3);
        state.record_failure();
        assert_eq!(state.next_request(), Some(3));
        state.record_success(3, 3);
        assert_eq!(state.remaining(), 2);
        assert_eq!(state.next_request(), Some(2));
        state.record_success(2, 2);
        assert!(state.is_finished());
        assert_eq!(state.attempts_left(), 2);
    }

    #[test]
    fn test_batch_retry_short_batch_costs_an_attempt() {
        let mut state = BatchRetry::new(5, 3);
        state.record_success(5, 2);
        assert_eq!(state.remaining(), 3);
        assert_eq!(state.attempts_left(), 2);
        assert_eq!(state.next_request(), Some(3));
    }

    #[test]
    fn test_batch_retry_zero_count_is_finished() {
        let state = BatchRetry::new(0, 3);
        assert!(state.is_finished());
    }

    #[test]
    fn test_delay_is_exponential() {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(100),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::ZERO);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
    }

    #[tokio::test]
    async fn test_collect_samples_retries_with_smaller_batches() {
        let requests = Mutex::new(Vec::new());
        let samples = collect_samples(4, &fast_policy(5), |n| {
            requests.lock().unwrap().push(n);
            let first = requests.lock().unwrap().len() == 1;
            async move {
                if first {
                    Err(transient())
                } else {
                    Ok((0..n).map(|i| format!("s{}", i)).collect())
                }
            }
        })
        .await;

        assert_eq!(*requests.lock().unwrap(), vec![4, 2, 2]);
        assert_eq!(samples.len(), 4);
    }

    #[tokio::test]
    async fn test_collect_samples_degrades_when_attempts_run_out() {
        let calls = AtomicUsize::new(0);
        let samples = collect_samples(5, &fast_policy(3), |_n| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(transient()) }
        })
        .await;

        assert!(samples.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_collect_samples_keeps_partial_results() {
        // Two of five samples succeed, every later batch fails.
        let calls = AtomicUsize::new(0);
        let samples = collect_samples(5, &fast_policy(3), |_n| {
            let call = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if call == 0 {
                    Ok(vec!["a".to_string(), "b".to_string()])
                } else {
                    Err(transient())
                }
            }
        })
        .await;

        assert_eq!(samples, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_collect_samples_ignores_surplus_texts() {
        let samples = collect_samples(2, &fast_policy(1), |_n| async {
            Ok(vec!["x".to_string(), "y".to_string(), "z".to_string()])
        })
        .await;
        assert_eq!(samples.len(), 2);
    }
}
