use futures::future::join_all;
use tracing::{debug, warn};

use super::{check_required, ExecutionContext};
use crate::error::ContractViolation;
use crate::strategy::ScoreStrategy;
use crate::thought::{Payload, Thought, SENTINEL_MIN_SCORE};

/// How a [`Score`] operation queries the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreMode {
    /// One evaluation per thought, averaged over `samples` completions.
    Independent { samples: usize },
    /// A single evaluation of all thoughts side by side.
    Combined,
}

impl ScoreMode {
    pub(super) fn describe(&self) -> Vec<String> {
        match self {
            ScoreMode::Independent { samples } => {
                vec!["mode=independent".to_string(), format!("samples={}", samples)]
            }
            ScoreMode::Combined => vec!["mode=combined".to_string()],
        }
    }
}

/// Evaluation: a scored copy of every input thought, in input order.
///
/// Missing or unparseable scores become [`SENTINEL_MIN_SCORE`].
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub mode: ScoreMode,
    required_fields: Vec<String>,
}

impl Score {
    pub fn independent() -> Self {
        Self {
            mode: ScoreMode::Independent { samples: 1 },
            required_fields: Vec::new(),
        }
    }

    pub fn combined() -> Self {
        Self {
            mode: ScoreMode::Combined,
            required_fields: Vec::new(),
        }
    }

    /// Average over `samples` completions per thought. Only meaningful in
    /// independent mode; combined scoring ignores it.
    pub fn with_samples(mut self, samples: usize) -> Self {
        if let ScoreMode::Independent { .. } = self.mode {
            self.mode = ScoreMode::Independent { samples };
        }
        self
    }

    pub fn requires(mut self, field: impl Into<String>) -> Self {
        self.required_fields.push(field.into());
        self
    }

    pub fn required_fields(&self) -> &[String] {
        &self.required_fields
    }

    pub(super) async fn execute(
        &self,
        ctx: &ExecutionContext<'_>,
        inputs: &[Thought],
    ) -> Result<Vec<Thought>, ContractViolation> {
        check_required(inputs, &self.required_fields)?;
        let strategy = ctx
            .strategies
            .score()
            .ok_or(ContractViolation::MissingStrategy)?;
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let scores = match self.mode {
            ScoreMode::Independent { samples } => {
                score_independent(ctx, strategy, inputs, samples).await
            }
            ScoreMode::Combined => score_combined(ctx, strategy, inputs).await?,
        };

        Ok(inputs
            .iter()
            .zip(scores)
            .map(|(thought, score)| thought.scored(ctx.ids.next_id(), ctx.operation, score))
            .collect())
    }
}

async fn score_independent(
    ctx: &ExecutionContext<'_>,
    strategy: &ScoreStrategy,
    inputs: &[Thought],
    samples: usize,
) -> Vec<f64> {
    let calls = inputs.iter().map(|thought| async move {
        let payloads = [thought.payload()];
        let prompt = strategy.prompter.score_prompt(&payloads);
        let texts = ctx.backend.generate(&prompt, samples).await;

        let parsed: Vec<f64> = texts
            .iter()
            .filter_map(|text| strategy.parser.parse_scores(&payloads, text).first().copied())
            .filter(|score| !score.is_nan())
            .collect();

        if parsed.is_empty() {
            debug!(
                operation = %ctx.operation,
                thought = %thought.id(),
                completions = texts.len(),
                "No parseable score; using sentinel"
            );
            SENTINEL_MIN_SCORE
        } else {
            parsed.iter().sum::<f64>() / parsed.len() as f64
        }
    });

    join_all(calls).await
}

async fn score_combined(
    ctx: &ExecutionContext<'_>,
    strategy: &ScoreStrategy,
    inputs: &[Thought],
) -> Result<Vec<f64>, ContractViolation> {
    let payloads: Vec<&Payload> = inputs.iter().map(Thought::payload).collect();
    let prompt = strategy.prompter.score_prompt(&payloads);
    let texts = ctx.backend.generate(&prompt, 1).await;

    let Some(text) = texts.first() else {
        warn!(operation = %ctx.operation, "Combined score call returned nothing; using sentinel");
        return Ok(vec![SENTINEL_MIN_SCORE; inputs.len()]);
    };

    let scores = strategy.parser.parse_scores(&payloads, text);
    if scores.is_empty() {
        warn!(operation = %ctx.operation, "Combined score unparseable; using sentinel");
        return Ok(vec![SENTINEL_MIN_SCORE; inputs.len()]);
    }
    if scores.len() != inputs.len() {
        return Err(ContractViolation::ScoreCountMismatch {
            expected: inputs.len(),
            actual: scores.len(),
        });
    }

    Ok(scores
        .into_iter()
        .map(|s| if s.is_nan() { SENTINEL_MIN_SCORE } else { s })
        .collect())
}
