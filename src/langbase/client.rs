use async_trait::async_trait;
use futures::future::join_all;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use super::types::{CreatePipeRequest, CreatePipeResponse, Message, PipeRequest, PipeResponse};
use crate::backend::{collect_samples, Backend, RetryPolicy, UsageCounter, UsageSnapshot};
use crate::config::{LangbaseConfig, PricingConfig, RequestConfig};
use crate::error::{BackendError, BackendResult};
use crate::prompts::PIPE_SYSTEM_PROMPT;

/// Client for interacting with Langbase Pipes API
#[derive(Clone)]
pub struct LangbaseClient {
    client: Client,
    base_url: String,
    api_key: String,
    pipe: String,
    timeout_ms: u64,
    retry: RetryPolicy,
    usage: Arc<UsageCounter>,
}

impl LangbaseClient {
    /// Create a new Langbase client
    pub fn new(
        config: &LangbaseConfig,
        request_config: RequestConfig,
        pricing: PricingConfig,
    ) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(request_config.timeout_ms))
            .build()
            .map_err(BackendError::Http)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            pipe: config.pipe.clone(),
            timeout_ms: request_config.timeout_ms,
            retry: RetryPolicy::from(&request_config),
            usage: Arc::new(UsageCounter::new(pricing)),
        })
    }

    /// Call the pipe once, retrying transient failures with exponential backoff.
    pub async fn call_pipe(&self, request: &PipeRequest) -> BackendResult<PipeResponse> {
        let url = format!("{}/v1/pipes/run", self.base_url);
        let started = Instant::now();

        let mut last_error = None;
        let mut retries = 0;

        while retries <= self.retry.max_retries {
            if retries > 0 {
                let delay = self.retry.delay_for(retries);
                if started.elapsed() + delay > self.retry.max_elapsed {
                    warn!(
                        pipe = %request.name,
                        retry = retries,
                        elapsed_ms = started.elapsed().as_millis(),
                        "Retry budget exhausted"
                    );
                    break;
                }
                warn!(
                    pipe = %request.name,
                    retry = retries,
                    delay_ms = delay.as_millis(),
                    "Retrying Langbase request"
                );
                tokio::time::sleep(delay).await;
            }

            let start = Instant::now();

            match self.execute_request(&url, request).await {
                Ok(response) => {
                    let (prompt_tokens, completion_tokens) = response.token_counts();
                    self.usage
                        .record_success(1, prompt_tokens, completion_tokens);
                    debug!(
                        pipe = %request.name,
                        latency_ms = start.elapsed().as_millis(),
                        prompt_tokens,
                        completion_tokens,
                        "Langbase pipe call succeeded"
                    );
                    return Ok(response);
                }
                Err(e) => {
                    self.usage.record_failure();
                    error!(
                        pipe = %request.name,
                        error = %e,
                        latency_ms = start.elapsed().as_millis(),
                        retry = retries,
                        "Langbase pipe call failed"
                    );
                    let transient = e.is_transient();
                    last_error = Some(e);
                    retries += 1;
                    if !transient {
                        break;
                    }
                }
            }
        }

        Err(BackendError::Unavailable {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "Unknown error".to_string()),
            retries,
        })
    }

    /// Issue `batch` concurrent calls for `prompt`.
    ///
    /// Succeeds with the completions that came back, in call order, as long
    /// as at least one call succeeded.
    async fn request_batch(&self, prompt: &str, batch: usize) -> BackendResult<Vec<String>> {
        let request = PipeRequest::new(&self.pipe, vec![Message::user(prompt)]);
        let results = join_all((0..batch).map(|_| self.call_pipe(&request))).await;

        let mut completions = Vec::with_capacity(batch);
        let mut last_error = None;
        for result in results {
            match result {
                Ok(response) => completions.push(response.completion),
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) if completions.is_empty() => Err(e),
            _ => Ok(completions),
        }
    }

    async fn execute_request(
        &self,
        url: &str,
        request: &PipeRequest,
    ) -> BackendResult<PipeResponse> {
        let response = self.post(url, request).await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                BackendError::Http(e)
            }
        })?;

        let pipe_response: PipeResponse = Self::read_json(response, "pipe run").await?;
        if !pipe_response.success {
            return Err(BackendError::InvalidResponse {
                message: "Pipe reported an unsuccessful run".to_string(),
            });
        }

        Ok(pipe_response)
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<Response, reqwest::Error> {
        self.client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
    }

    /// Map non-2xx statuses to `Api` errors and decode the body otherwise.
    async fn read_json<T: DeserializeOwned>(response: Response, what: &str) -> BackendResult<T> {
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse {
                message: format!("Failed to parse {} response: {}", what, e),
            })
    }

    /// Get the base URL (for testing)
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Name of the pipe serving completions.
    pub fn pipe(&self) -> &str {
        &self.pipe
    }

    /// Create a new pipe
    pub async fn create_pipe(
        &self,
        request: CreatePipeRequest,
    ) -> BackendResult<CreatePipeResponse> {
        let url = format!("{}/v1/pipes", self.base_url);

        info!(pipe = %request.name, "Creating Langbase pipe");

        let response = self
            .post(&url, &request)
            .await
            .map_err(BackendError::Http)?;
        let pipe_response: CreatePipeResponse = Self::read_json(response, "create pipe").await?;

        info!(
            pipe = %pipe_response.name,
            url = %pipe_response.url,
            "Pipe created successfully"
        );

        Ok(pipe_response)
    }

    /// Ensure the configured pipe exists, creating it if needed
    pub async fn ensure_pipe(&self) -> BackendResult<()> {
        let request = CreatePipeRequest::new(&self.pipe)
            .with_description("Graph-of-Thoughts completions")
            .with_model("openai:gpt-4o-mini")
            .with_upsert(true)
            .with_temperature(1.0)
            .with_max_tokens(4096)
            .with_messages(vec![Message::system(PIPE_SYSTEM_PROMPT)]);

        match self.create_pipe(request).await {
            Ok(_) => {
                info!(pipe = %self.pipe, "Reasoning pipe ready");
                Ok(())
            }
            Err(BackendError::Api { status: 409, .. }) => {
                info!(pipe = %self.pipe, "Pipe already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Backend for LangbaseClient {
    async fn generate(&self, prompt: &str, count: usize) -> Vec<String> {
        collect_samples(count, &self.retry, |batch| self.request_batch(prompt, batch)).await
    }

    fn usage(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> LangbaseConfig {
        LangbaseConfig {
            api_key: "test_key".to_string(),
            base_url: "https://api.langbase.com/".to_string(),
            pipe: "got-test".to_string(),
        }
    }

    #[test]
    fn test_client_creation() {
        let client = LangbaseClient::new(
            &test_config(),
            RequestConfig::default(),
            PricingConfig::default(),
        );
        assert!(client.is_ok());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = LangbaseClient::new(
            &test_config(),
            RequestConfig::default(),
            PricingConfig::default(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "https://api.langbase.com");
        assert_eq!(client.pipe(), "got-test");
    }

    #[test]
    fn test_usage_starts_at_zero() {
        let client = LangbaseClient::new(
            &test_config(),
            RequestConfig::default(),
            PricingConfig::default(),
        )
        .unwrap();
        assert_eq!(client.usage(), UsageSnapshot::default());
    }
}
