use futures::future::join_all;

use super::{check_required, ExecutionContext};
use crate::error::ContractViolation;
use crate::thought::Thought;

/// Verification: a copy of every input with its validity flag set.
///
/// Unparseable or missing verdicts mark the thought invalid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Validate {
    required_fields: Vec<String>,
}

impl Validate {
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
            .validate()
            .ok_or(ContractViolation::MissingStrategy)?;

        let prompts: Vec<String> = inputs
            .iter()
            .map(|t| strategy.prompter.validate_prompt(t.payload()))
            .collect();
        let responses = join_all(prompts.iter().map(|p| ctx.backend.generate(p, 1))).await;

        Ok(inputs
            .iter()
            .zip(responses)
            .map(|(thought, texts)| {
                let valid = texts
                    .first()
                    .and_then(|text| strategy.parser.parse_validation(thought.payload(), text))
                    .unwrap_or(false);
                thought.validated(ctx.ids.next_id(), ctx.operation, valid)
            })
            .collect())
    }
}
