//! Text-generation backend contract.
//!
//! A [`Backend`] produces up to `count` independent completions for a
//! prompt. Transient failures are retried inside the adapter (see
//! [`retry`]); the engine only ever observes a shortfall in the number of
//! returned texts, never an error.

pub mod retry;
mod scripted;

pub use retry::{collect_samples, BatchRetry, RetryPolicy};
pub use scripted::ScriptedBackend;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::PricingConfig;

/// A text-completion provider.
///
/// Implementations own their retry policy and usage counters. One
/// instance is constructed per run and handed to the controller.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Produce between 0 and `count` completions for `prompt`.
    ///
    /// Fewer than `count` texts signals partial failure.
    async fn generate(&self, prompt: &str, count: usize) -> Vec<String>;

    /// Cumulative usage since the backend was created.
    fn usage(&self) -> UsageSnapshot;
}

/// Point-in-time copy of a backend's usage counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct UsageSnapshot {
    /// Successful backend calls.
    pub calls: u64,
    /// Failed call attempts, including retried ones.
    pub failed_calls: u64,
    /// Completions returned to callers.
    pub completions: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    /// Accumulated cost derived from token prices.
    pub cost: f64,
}

/// Monotonic usage counters, safe to update from concurrent fan-out.
#[derive(Debug, Default)]
pub struct UsageCounter {
    calls: AtomicU64,
    failed_calls: AtomicU64,
    completions: AtomicU64,
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
    pricing: PricingConfig,
}

impl UsageCounter {
    /// Create counters priced with `pricing`.
    pub fn new(pricing: PricingConfig) -> Self {
        Self {
            pricing,
            ..Default::default()
        }
    }

    /// Record one successful call.
    pub fn record_success(&self, completions: u64, prompt_tokens: u64, completion_tokens: u64) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.completions.fetch_add(completions, Ordering::Relaxed);
        self.prompt_tokens.fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion_tokens
            .fetch_add(completion_tokens, Ordering::Relaxed);
    }

    /// Record one failed call attempt.
    pub fn record_failure(&self) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        let prompt_tokens = self.prompt_tokens.load(Ordering::Relaxed);
        let completion_tokens = self.completion_tokens.load(Ordering::Relaxed);
        let cost = self.pricing.prompt_token_cost * (prompt_tokens as f64 / 1000.0)
            + self.pricing.completion_token_cost * (completion_tokens as f64 / 1000.0);

        UsageSnapshot {
            calls: self.calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            prompt_tokens,
            completion_tokens,
            cost,
        }
    }
}
