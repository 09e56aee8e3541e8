//! Prompt construction and response parsing strategies.
//!
//! Every operation kind that talks to the backend has its own prompter and
//! parser capability. A graph only needs the capabilities of the kinds it
//! actually wires; they are registered on a [`Strategies`] set handed to
//! the controller, and kinds without a registration are rejected before
//! a run starts.
//!
//! Prompters are total: they always render a prompt. Parsers never fail:
//! malformed text yields `None` or an empty vector and the operation
//! decides what that means.

mod json;

pub use json::JsonStrategy;

use std::sync::Arc;

use crate::operations::OperationKind;
use crate::thought::Payload;

/// Renders the branching prompt for one input payload.
pub trait GeneratePrompter: Send + Sync {
    fn generate_prompt(&self, payload: &Payload, branches: usize) -> String;
}

/// Extracts new fields from one branching completion.
pub trait GenerateParser: Send + Sync {
    fn parse_generate(&self, payload: &Payload, text: &str) -> Option<Payload>;
}

/// Renders an evaluation prompt for one payload, or for several at once in
/// combined scoring.
pub trait ScorePrompter: Send + Sync {
    fn score_prompt(&self, payloads: &[&Payload]) -> String;
}

/// Extracts scores from one evaluation completion, one per payload, in order.
pub trait ScoreParser: Send + Sync {
    fn parse_scores(&self, payloads: &[&Payload], text: &str) -> Vec<f64>;
}

pub trait AggregatePrompter: Send + Sync {
    fn aggregate_prompt(&self, payloads: &[&Payload]) -> String;
}

pub trait AggregateParser: Send + Sync {
    fn parse_aggregate(&self, payloads: &[&Payload], text: &str) -> Option<Payload>;
}

pub trait ImprovePrompter: Send + Sync {
    fn improve_prompt(&self, payload: &Payload) -> String;
}

pub trait ImproveParser: Send + Sync {
    fn parse_improve(&self, payload: &Payload, text: &str) -> Option<Payload>;
}

pub trait ValidatePrompter: Send + Sync {
    fn validate_prompt(&self, payload: &Payload) -> String;
}

pub trait ValidateParser: Send + Sync {
    fn parse_validation(&self, payload: &Payload, text: &str) -> Option<bool>;
}

/// Prompter/parser pair for one operation kind.
pub struct Pair<P: ?Sized, R: ?Sized> {
    pub prompter: Arc<P>,
    pub parser: Arc<R>,
}

impl<P: ?Sized, R: ?Sized> Clone for Pair<P, R> {
    fn clone(&self) -> Self {
        Self {
            prompter: Arc::clone(&self.prompter),
            parser: Arc::clone(&self.parser),
        }
    }
}

pub type GenerateStrategy = Pair<dyn GeneratePrompter, dyn GenerateParser>;
pub type ScoreStrategy = Pair<dyn ScorePrompter, dyn ScoreParser>;
pub type AggregateStrategy = Pair<dyn AggregatePrompter, dyn AggregateParser>;
pub type ImproveStrategy = Pair<dyn ImprovePrompter, dyn ImproveParser>;
pub type ValidateStrategy = Pair<dyn ValidatePrompter, dyn ValidateParser>;

/// The strategies available to a controller, keyed by operation kind.
#[derive(Clone, Default)]
pub struct Strategies {
    generate: Option<GenerateStrategy>,
    score: Option<ScoreStrategy>,
    aggregate: Option<AggregateStrategy>,
    improve: Option<ImproveStrategy>,
    validate: Option<ValidateStrategy>,
}

impl Strategies {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one strategy object for every kind it can serve.
    pub fn uniform<S>(strategy: Arc<S>) -> Self
    where
        S: GeneratePrompter
            + GenerateParser
            + ScorePrompter
            + ScoreParser
            + AggregatePrompter
            + AggregateParser
            + ImprovePrompter
            + ImproveParser
            + ValidatePrompter
            + ValidateParser
            + 'static,
    {
        Self::new()
            .with_generate(strategy.clone(), strategy.clone())
            .with_score(strategy.clone(), strategy.clone())
            .with_aggregate(strategy.clone(), strategy.clone())
            .with_improve(strategy.clone(), strategy.clone())
            .with_validate(strategy.clone(), strategy)
    }

    pub fn with_generate(
        mut self,
        prompter: Arc<dyn GeneratePrompter>,
        parser: Arc<dyn GenerateParser>,
    ) -> Self {
        self.generate = Some(Pair { prompter, parser });
        self
    }

    pub fn with_score(
        mut self,
        prompter: Arc<dyn ScorePrompter>,
        parser: Arc<dyn ScoreParser>,
    ) -> Self {
        self.score = Some(Pair { prompter, parser });
        self
    }

    pub fn with_aggregate(
        mut self,
        prompter: Arc<dyn AggregatePrompter>,
        parser: Arc<dyn AggregateParser>,
    ) -> Self {
        self.aggregate = Some(Pair { prompter, parser });
        self
    }

    pub fn with_improve(
        mut self,
        prompter: Arc<dyn ImprovePrompter>,
        parser: Arc<dyn ImproveParser>,
    ) -> Self {
        self.improve = Some(Pair { prompter, parser });
        self
    }

    pub fn with_validate(
        mut self,
        prompter: Arc<dyn ValidatePrompter>,
        parser: Arc<dyn ValidateParser>,
    ) -> Self {
        self.validate = Some(Pair { prompter, parser });
        self
    }

    /// Whether an operation of `kind` can run with these strategies.
    pub fn supports(&self, kind: OperationKind) -> bool {
        match kind {
            OperationKind::Generate => self.generate.is_some(),
            OperationKind::Score => self.score.is_some(),
            OperationKind::Aggregate => self.aggregate.is_some(),
            OperationKind::Improve => self.improve.is_some(),
            OperationKind::Validate => self.validate.is_some(),
            OperationKind::KeepBestN | OperationKind::KeepValid => true,
        }
    }

    pub fn generate(&self) -> Option<&GenerateStrategy> {
        self.generate.as_ref()
    }

    pub fn score(&self) -> Option<&ScoreStrategy> {
        self.score.as_ref()
    }

    pub fn aggregate(&self) -> Option<&AggregateStrategy> {
        self.aggregate.as_ref()
    }

    pub fn improve(&self) -> Option<&ImproveStrategy> {
        self.improve.as_ref()
    }

    pub fn validate(&self) -> Option<&ValidateStrategy> {
        self.validate.as_ref()
    }
}

// ============================================================================
// Shared parsing helpers
// ============================================================================

/// Extract JSON from a completion string, handling markdown code blocks.
///
/// Attempts extraction in this order:
/// 1. Raw JSON (fast path)
/// 2. ```json ... ``` code blocks
/// 3. ``` ... ``` code blocks
/// 4. The outermost `{...}` or `[...]` span embedded in prose
pub fn extract_json(completion: &str) -> Result<&str, String> {
    // Fast path: raw JSON
    let trimmed = completion.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }

    // Try ```json ... ``` blocks
    if completion.contains("```json") {
        return completion
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ```json block but content was empty or malformed".to_string());
    }

    // Try ``` ... ``` blocks
    if completion.contains("```") {
        return completion
            .split("```")
            .nth(1)
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Found ``` block but content was empty or malformed".to_string());
    }

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (completion.find(open), completion.rfind(close)) {
            if start < end {
                return Ok(&completion[start..=end]);
            }
        }
    }

    Err(format!(
        "No JSON found in response. First 100 chars: '{}'",
        completion.chars().take(100).collect::<String>()
    ))
}

/// Text between `<tag>` and `</tag>`, trimmed; `None` if either tag is missing.
pub fn extract_tagged<'a>(text: &'a str, tag: &str) -> Option<&'a str> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = text.find(&open)? + open.len();
    let end = start + text[start..].find(&close)?;
    Some(text[start..end].trim())
}

/// First number in `text`, tolerating surrounding prose such as "7/10",
/// ranges such as "8-9" and suffixes such as "7-ish".
pub fn parse_number(text: &str) -> Option<f64> {
    text.split(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
        .flat_map(split_signed)
        .find_map(|token| token.parse::<f64>().ok())
        .filter(|n| n.is_finite())
}

/// Split `token` at every `-` except a leading sign.
fn split_signed(token: &str) -> Vec<&str> {
    let body = usize::from(token.starts_with('-'));
    let mut pieces = Vec::new();
    let mut start = 0;
    for (i, c) in token.char_indices().skip(body) {
        if c == '-' {
            pieces.push(&token[start..i]);
            start = i + 1;
        }
    }
    pieces.push(&token[start..]);
    pieces.retain(|p| !p.is_empty());
    pieces
}
