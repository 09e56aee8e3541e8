use std::env;
use std::str::FromStr;

use crate::error::AppError;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub langbase: LangbaseConfig,
    pub logging: LoggingConfig,
    pub request: RequestConfig,
    pub pricing: PricingConfig,
    pub graph: GraphDefaults,
}

/// Langbase API configuration
#[derive(Debug, Clone)]
pub struct LangbaseConfig {
    pub api_key: String,
    pub base_url: String,
    /// Pipe that serves every completion request of a run.
    pub pipe: String,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// HTTP request and retry configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Timeout of a single HTTP call.
    pub timeout_ms: u64,
    /// Retries of a single sample before it is given up.
    pub max_retries: u32,
    /// Base delay of the exponential backoff.
    pub retry_delay_ms: u64,
    /// Upper bound on time spent retrying a single sample.
    pub max_retry_elapsed_ms: u64,
    /// Failed batches tolerated before the remaining samples are abandoned.
    pub batch_attempts: u32,
}

/// Token prices used for the running cost counter (per 1000 tokens).
#[derive(Debug, Clone, Default)]
pub struct PricingConfig {
    pub prompt_token_cost: f64,
    pub completion_token_cost: f64,
}

/// Default parameters for graphs assembled by the CLI.
#[derive(Debug, Clone)]
pub struct GraphDefaults {
    pub branches: usize,
    pub keep_best: usize,
    pub score_samples: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let langbase = LangbaseConfig {
            api_key: env::var("LANGBASE_API_KEY").map_err(|_| AppError::Config {
                message: "LANGBASE_API_KEY is required".to_string(),
            })?,
            base_url: env::var("LANGBASE_BASE_URL")
                .unwrap_or_else(|_| "https://api.langbase.com".to_string()),
            pipe: env::var("LANGBASE_PIPE").unwrap_or_else(|_| "got-reasoning-v1".to_string()),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: env_or("REQUEST_TIMEOUT_MS", defaults.timeout_ms),
            max_retries: env_or("MAX_RETRIES", defaults.max_retries),
            retry_delay_ms: env_or("RETRY_DELAY_MS", defaults.retry_delay_ms),
            max_retry_elapsed_ms: env_or("MAX_RETRY_ELAPSED_MS", defaults.max_retry_elapsed_ms),
            batch_attempts: env_or("BATCH_ATTEMPTS", defaults.batch_attempts),
        };

        let pricing = PricingConfig {
            prompt_token_cost: env_or("PROMPT_TOKEN_COST", 0.0),
            completion_token_cost: env_or("COMPLETION_TOKEN_COST", 0.0),
        };

        let graph_defaults = GraphDefaults::default();
        let graph = GraphDefaults {
            branches: env_or("GOT_BRANCHES", graph_defaults.branches),
            keep_best: env_or("GOT_KEEP_BEST", graph_defaults.keep_best),
            score_samples: env_or("GOT_SCORE_SAMPLES", graph_defaults.score_samples),
        };

        Ok(Config {
            langbase,
            logging,
            request,
            pricing,
            graph,
        })
    }
}

/// Parse an environment variable, falling back to `default` when it is
/// absent or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30000,
            max_retries: 3,
            retry_delay_ms: 1000,
            max_retry_elapsed_ms: 10000,
            batch_attempts: 6,
        }
    }
}

impl Default for GraphDefaults {
    fn default() -> Self {
        Self {
            branches: 3,
            keep_best: 1,
            score_samples: 1,
        }
    }
}
