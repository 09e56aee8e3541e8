use tracing::{debug, warn};

use super::{check_required, ExecutionContext};
use crate::error::ContractViolation;
use crate::thought::{Payload, Thought};

/// Merge: one synthesized thought from all inputs.
///
/// The new payload starts from the union of the input payloads (later
/// inputs win on collisions) and takes the parsed fields on top. A missing
/// or unparseable completion yields no thought.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregate {
    required_fields: Vec<String>,
}

impl Aggregate {
    pub fn new() -> Self {
        Self::default()
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
            .aggregate()
            .ok_or(ContractViolation::MissingStrategy)?;
        if inputs.is_empty() {
            debug!(operation = %ctx.operation, "Nothing to aggregate");
            return Ok(Vec::new());
        }

        let payloads: Vec<&Payload> = inputs.iter().map(Thought::payload).collect();
        let prompt = strategy.prompter.aggregate_prompt(&payloads);
        let texts = ctx.backend.generate(&prompt, 1).await;

        let parsed = texts
            .first()
            .and_then(|text| strategy.parser.parse_aggregate(&payloads, text))
            .filter(|p| !p.without_reserved().is_empty());
        let Some(parsed) = parsed else {
            warn!(
                operation = %ctx.operation,
                inputs = inputs.len(),
                completions = texts.len(),
                "Aggregation produced no payload"
            );
            return Ok(Vec::new());
        };

        let base = payloads
            .iter()
            .fold(Payload::new(), |acc, payload| acc.merged(payload));
        let merged = Thought::merge(ctx.ids.next_id(), ctx.operation, inputs, base.merged(&parsed));

        Ok(vec![merged])
    }
}
