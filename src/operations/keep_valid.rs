use super::ExecutionContext;
use crate::thought::Thought;

/// Filter: copies of the inputs whose validity flag is set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeepValid;

impl KeepValid {
    pub fn new() -> Self {
        Self
    }

    pub(super) fn execute(&self, ctx: &ExecutionContext<'_>, inputs: &[Thought]) -> Vec<Thought> {
        inputs
            .iter()
            .filter(|t| t.is_valid())
            .map(|t| t.copy(ctx.ids.next_id(), ctx.operation))
            .collect()
    }
}
