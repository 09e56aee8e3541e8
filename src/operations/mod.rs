//! Operation kinds and their dispatch.
//!
//! Every node of a [`GraphOfOperations`](crate::graph::GraphOfOperations)
//! carries one [`Operation`]. The set of kinds is closed: adding a kind
//! means adding a variant here and an arm to [`Operation::execute`].
//!
//! Operations never edit their inputs. They read predecessor thoughts and
//! return freshly built ones; a contract violation aborts the run.

mod aggregate;
mod generate;
mod keep_best_n;
mod keep_valid;
mod improve;
mod score;
mod validate;

pub use aggregate::Aggregate;
pub use generate::Generate;
pub use improve::Improve;
pub use keep_best_n::KeepBestN;
pub use keep_valid::KeepValid;
pub use score::{Score, ScoreMode};
pub use validate::Validate;

use serde::Serialize;
use std::fmt;

use crate::backend::Backend;
use crate::error::ContractViolation;
use crate::graph::OperationId;
use crate::strategy::Strategies;
use crate::thought::{Thought, ThoughtIds};


/// The kind of an operation node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Generate,
    Score,
    KeepBestN,
    Aggregate,
    Improve,
    Validate,
    KeepValid,
}

impl OperationKind {
    pub const ALL: [OperationKind; 7] = [
        OperationKind::Generate,
        OperationKind::Score,
        OperationKind::KeepBestN,
        OperationKind::Aggregate,
        OperationKind::Improve,
        OperationKind::Validate,
        OperationKind::KeepValid,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Generate => "generate",
            OperationKind::Score => "score",
            OperationKind::KeepBestN => "keep_best_n",
            OperationKind::Aggregate => "aggregate",
            OperationKind::Improve => "improve",
            OperationKind::Validate => "validate",
            OperationKind::KeepValid => "keep_valid",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A graph node's operation with its static parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Generate(Generate),
    Score(Score),
    KeepBestN(KeepBestN),
    Aggregate(Aggregate),
    Improve(Improve),
    Validate(Validate),
    KeepValid(KeepValid),
}

/// Everything an operation needs besides its inputs.
pub struct ExecutionContext<'a> {
    /// The node being executed; stamped on every produced thought.
    pub operation: OperationId,
    pub ids: &'a ThoughtIds,
    pub backend: &'a dyn Backend,
    pub strategies: &'a Strategies,
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Generate(_) => OperationKind::Generate,
            Operation::Score(_) => OperationKind::Score,
            Operation::KeepBestN(_) => OperationKind::KeepBestN,
            Operation::Aggregate(_) => OperationKind::Aggregate,
            Operation::Improve(_) => OperationKind::Improve,
            Operation::Validate(_) => OperationKind::Validate,
            Operation::KeepValid(_) => OperationKind::KeepValid,
        }
    }

    /// Static parameters rendered as `key=value` pairs.
    pub fn parameters(&self) -> String {
        let (mut params, required) = match self {
            Operation::Generate(op) => (vec![format!("k={}", op.k)], op.required_fields()),
            Operation::Score(op) => (op.mode.describe(), op.required_fields()),
            Operation::KeepBestN(op) => (vec![format!("n={}", op.n)], &[] as &[String]),
            Operation::Aggregate(op) => (Vec::new(), op.required_fields()),
            Operation::Improve(op) => (Vec::new(), op.required_fields()),
            Operation::Validate(op) => (Vec::new(), op.required_fields()),
            Operation::KeepValid(_) => (Vec::new(), &[] as &[String]),
        };
        if !required.is_empty() {
            params.push(format!("requires={}", required.join(",")));
        }
        params.join(" ")
    }

    /// Reject parameter values no execution could satisfy.
    pub fn validate_parameters(&self) -> Result<(), ContractViolation> {
        match self {
            Operation::Generate(op) => at_least_one("k", op.k),
            Operation::Score(Score {
                mode: ScoreMode::Independent { samples },
                ..
            }) => at_least_one("samples", *samples),
            Operation::KeepBestN(op) => at_least_one("n", op.n),
            _ => Ok(()),
        }
    }

    /// Run the operation over `inputs`, the concatenated predecessor outputs.
    pub async fn execute(
        &self,
        ctx: &ExecutionContext<'_>,
        inputs: &[Thought],
    ) -> Result<Vec<Thought>, ContractViolation> {
        self.validate_parameters()?;
        match self {
            Operation::Generate(op) => op.execute(ctx, inputs).await,
            Operation::Score(op) => op.execute(ctx, inputs).await,
            Operation::KeepBestN(op) => Ok(op.execute(ctx, inputs)),
            Operation::Aggregate(op) => op.execute(ctx, inputs).await,
            Operation::Improve(op) => op.execute(ctx, inputs).await,
            Operation::Validate(op) => op.execute(ctx, inputs).await,
            Operation::KeepValid(op) => Ok(op.execute(ctx, inputs)),
        }
    }
}

fn at_least_one(name: &'static str, value: usize) -> Result<(), ContractViolation> {
    if value == 0 {
        Err(ContractViolation::InvalidParameter {
            name,
            reason: "must be at least 1".to_string(),
        })
    } else {
        Ok(())
    }
}

/// Fail on the first input that lacks one of `fields`.
fn check_required(inputs: &[Thought], fields: &[String]) -> Result<(), ContractViolation> {
    for thought in inputs {
        if let Some(field) = fields.iter().find(|f| !thought.payload().contains(f)) {
            return Err(ContractViolation::MissingField {
                thought_id: thought.id(),
                field: field.clone(),
            });
        }
    }
    Ok(())
}

macro_rules! impl_from_operation {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Operation {
                fn from(op: $variant) -> Self {
                    Operation::$variant(op)
                }
            }
        )*
    };
}

impl_from_operation!(Generate, Score, KeepBestN, Aggregate, Improve, Validate, KeepValid);
