use futures::future::join_all;
use tracing::debug;

use super::{check_required, ExecutionContext};
use crate::error::ContractViolation;
use crate::thought::Thought;

/// Branching: `k` candidate continuations per input thought.
#[derive(Debug, Clone, PartialEq)]
pub struct Generate {
    /// Completions requested per input thought.
    pub k: usize,
    required_fields: Vec<String>,
}

impl Generate {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            required_fields: Vec::new(),
        }
    }

    /// Require `field` on every input payload.
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
            .generate()
            .ok_or(ContractViolation::MissingStrategy)?;

        let prompts: Vec<String> = inputs
            .iter()
            .map(|t| strategy.prompter.generate_prompt(t.payload(), self.k))
            .collect();
        let responses = join_all(
            prompts
                .iter()
                .map(|prompt| ctx.backend.generate(prompt, self.k)),
        )
        .await;

        let mut produced = Vec::new();
        for (parent, texts) in inputs.iter().zip(responses) {
            let obtained = texts.len();
            let mut parsed_count = 0;
            for text in texts {
                match strategy.parser.parse_generate(parent.payload(), &text) {
                    Some(parsed) if !parsed.without_reserved().is_empty() => {
                        let payload = parent.payload().merged(&parsed);
                        produced.push(Thought::derive(
                            ctx.ids.next_id(),
                            ctx.operation,
                            parent,
                            payload,
                        ));
                        parsed_count += 1;
                    }
                    _ => {}
                }
            }
            debug!(
                operation = %ctx.operation,
                parent = %parent.id(),
                requested = self.k,
                obtained,
                parsed = parsed_count,
                "Generated branches"
            );
        }

        Ok(produced)
    }
}
