use futures::future::join_all;
use tracing::debug;

use super::{check_required, ExecutionContext};
use crate::error::ContractViolation;
use crate::thought::Thought;

/// Refinement: one self-critique call per thought.
///
/// Inputs whose completion cannot be parsed pass through as unchanged copies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Improve {
    required_fields: Vec<String>,
}

impl Improve {
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
            .improve()
            .ok_or(ContractViolation::MissingStrategy)?;

        let prompts: Vec<String> = inputs
            .iter()
            .map(|t| strategy.prompter.improve_prompt(t.payload()))
            .collect();
        let responses = join_all(prompts.iter().map(|p| ctx.backend.generate(p, 1))).await;

        let improved = inputs
            .iter()
            .zip(responses)
            .map(|(thought, texts)| {
                let parsed = texts
                    .first()
                    .and_then(|text| strategy.parser.parse_improve(thought.payload(), text))
                    .filter(|p| !p.without_reserved().is_empty());
                match parsed {
                    Some(parsed) => Thought::derive(
                        ctx.ids.next_id(),
                        ctx.operation,
                        thought,
                        thought.payload().merged(&parsed),
                    ),
                    None => {
                        debug!(
                            operation = %ctx.operation,
                            thought = %thought.id(),
                            "No improvement parsed; passing thought through"
                        );
                        thought.copy(ctx.ids.next_id(), ctx.operation)
                    }
                }
            })
            .collect();

        Ok(improved)
    }
}
