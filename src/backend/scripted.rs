//! In-process backend with scripted responses.
//!
//! Useful for tests, dry runs, and offline development of prompters and
//! parsers. Every call is recorded so callers can assert on the prompts
//! the engine produced.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{Backend, UsageCounter, UsageSnapshot};

type Responder = Box<dyn Fn(&str, usize) -> Vec<String> + Send + Sync>;

/// A recorded backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub prompt: String,
    pub count: usize,
}

/// Backend whose completions come from a caller-supplied function.
pub struct ScriptedBackend {
    responder: Responder,
    usage: UsageCounter,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    /// Answer every call with `responder(prompt, count)`.
    ///
    /// Results longer than `count` are truncated.
    pub fn new(responder: impl Fn(&str, usize) -> Vec<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            usage: UsageCounter::default(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every call with the first `count` of `texts`.
    pub fn fixed<S: Into<String>>(texts: impl IntoIterator<Item = S>) -> Self {
        let texts: Vec<String> = texts.into_iter().map(Into::into).collect();
        Self::new(move |_, count| texts.iter().take(count).cloned().collect())
    }

    /// Answer successive calls with successive entries; empty once exhausted.
    pub fn queued<S: Into<String>>(
        responses: impl IntoIterator<Item = impl IntoIterator<Item = S>>,
    ) -> Self {
        let queue: VecDeque<Vec<String>> = responses
            .into_iter()
            .map(|r| r.into_iter().map(Into::into).collect())
            .collect();
        let queue = Mutex::new(queue);
        Self::new(move |_, _| {
            queue
                .lock()
                .map(|mut q| q.pop_front().unwrap_or_default())
                .unwrap_or_default()
        })
    }

    /// Calls received so far, in arrival order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn generate(&self, prompt: &str, count: usize) -> Vec<String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                count,
            });
        }

        let mut texts = (self.responder)(prompt, count);
        texts.truncate(count);
        if texts.is_empty() && count > 0 {
            self.usage.record_failure();
        } else {
            self.usage.record_success(texts.len() as u64, 0, 0);
        }
        texts
    }

    fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_truncates_to_count() {
        let backend = ScriptedBackend::fixed(["a", "b", "c"]);
        assert_eq!(backend.generate("p", 2).await, vec!["a", "b"]);
        assert_eq!(backend.usage().completions, 2);
    }

    #[tokio::test]
    async fn test_queued_pops_in_order() {
        let backend = ScriptedBackend::queued([vec!["first"], vec!["second"]]);
        assert_eq!(backend.generate("p", 1).await, vec!["first"]);
        assert_eq!(backend.generate("p", 1).await, vec!["second"]);
        assert!(backend.generate("p", 1).await.is_empty());
        assert_eq!(backend.usage().failed_calls, 1);
    }

    #[tokio::test]
    async fn test_calls_are_recorded() {
        let backend = ScriptedBackend::new(|prompt, _| vec![prompt.to_uppercase()]);
        assert_eq!(backend.generate("hello", 3).await, vec!["HELLO"]);

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].prompt, "hello");
        assert_eq!(calls[0].count, 3);
    }
}
