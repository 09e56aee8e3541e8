use super::ExecutionContext;
use crate::thought::Thought;

/// Pruning: the `n` highest-scored inputs, best first.
///
/// Equal scores keep their input order. Unscored thoughts rank last.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepBestN {
    pub n: usize,
}

impl KeepBestN {
    pub fn new(n: usize) -> Self {
        Self { n }
    }

    pub(super) fn execute(&self, ctx: &ExecutionContext<'_>, inputs: &[Thought]) -> Vec<Thought> {
        let mut ranked: Vec<&Thought> = inputs.iter().collect();
        // sort_by is stable
        ranked.sort_by(|a, b| b.rank_score().total_cmp(&a.rank_score()));

        ranked
            .into_iter()
            .take(self.n)
            .map(|t| t.copy(ctx.ids.next_id(), ctx.operation))
            .collect()
    }
}
