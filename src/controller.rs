//! Drives a graph of operations to completion.
//!
//! A run seeds every root with the bootstrap thought, executes nodes in
//! topological order and returns the thoughts of the leaf nodes. The
//! controller only wires outputs to inputs; it never looks inside payloads.

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::backend::{Backend, UsageSnapshot};
use crate::error::{AppError, AppResult, ContractViolation, OperationError};
use crate::graph::{GraphOfOperations, NodeStatus, OperationId};
use crate::operations::{ExecutionContext, Operation, OperationKind};
use crate::strategy::Strategies;
use crate::thought::{Payload, Thought, ThoughtIds};

/// Executes graphs against one backend with one set of strategies.
pub struct Controller {
    backend: Arc<dyn Backend>,
    strategies: Strategies,
}

impl Controller {
    pub fn new(backend: Arc<dyn Backend>, strategies: Strategies) -> Self {
        Self {
            backend,
            strategies,
        }
    }

    /// Cumulative backend usage across every run of this controller.
    pub fn usage(&self) -> UsageSnapshot {
        self.backend.usage()
    }

    /// Check that `graph` can run before any backend call is made.
    ///
    /// Returns the execution order. Fails on structural problems, invalid
    /// parameters, kinds without a registered strategy, and merge nodes
    /// with nothing to merge.
    pub fn check(&self, graph: &GraphOfOperations) -> AppResult<Vec<OperationId>> {
        let order = graph.validate()?;

        for &id in &order {
            let Some(operation) = graph.operation(id) else {
                continue;
            };
            let violation = match operation.validate_parameters() {
                Err(violation) => Some(violation),
                Ok(()) if !self.strategies.supports(operation.kind()) => {
                    Some(ContractViolation::MissingStrategy)
                }
                Ok(()) if operation.kind() == OperationKind::Aggregate
                    && graph.predecessors(id).is_empty() =>
                {
                    Some(ContractViolation::NoPredecessors)
                }
                Ok(()) => None,
            };

            if let Some(violation) = violation {
                return Err(operation_error(id, operation, 0, violation).into());
            }
        }

        Ok(order)
    }

    /// Run `graph` from `payload` and return the leaf thoughts.
    ///
    /// Any state from a previous run is discarded first. An empty result is
    /// a normal outcome when every branch starved.
    pub async fn run(
        &self,
        graph: &mut GraphOfOperations,
        payload: Payload,
    ) -> AppResult<Vec<Thought>> {
        let order = self.check(graph)?;

        graph.reset();
        let run_id = Uuid::new_v4();
        graph.begin_run(run_id);

        let span = info_span!("got_run", %run_id);
        info!(
            parent: &span,
            operations = order.len(),
            fields = payload.len(),
            "Run started"
        );

        let start = Instant::now();
        let outcome = self
            .execute(graph, &order, payload)
            .instrument(span.clone())
            .await;
        graph.finish_run(self.backend.usage());

        match outcome {
            Ok(()) => {
                let results = graph.final_thoughts();
                info!(
                    parent: &span,
                    results = results.len(),
                    elapsed_ms = start.elapsed().as_millis(),
                    "Run completed"
                );
                Ok(results)
            }
            Err(e) => {
                error!(parent: &span, error = %e, "Run halted");
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        graph: &mut GraphOfOperations,
        order: &[OperationId],
        payload: Payload,
    ) -> AppResult<()> {
        let ids = ThoughtIds::new();
        let bootstrap = Thought::bootstrap(ids.next_id(), payload.without_reserved());

        for &id in order {
            graph.set_status(id, NodeStatus::Ready);
            let inputs = gather_inputs(graph, id, &bootstrap);
            graph.set_status(id, NodeStatus::Running);

            let operation = graph
                .operation(id)
                .ok_or_else(|| AppError::Internal {
                    message: format!("operation {} vanished during run", id),
                })?
                .clone();
            let ctx = ExecutionContext {
                operation: id,
                ids: &ids,
                backend: self.backend.as_ref(),
                strategies: &self.strategies,
            };

            let start = Instant::now();
            let produced = operation
                .execute(&ctx, &inputs)
                .instrument(info_span!("operation", operation = %id, kind = %operation.kind()))
                .await
                .map_err(|violation| operation_error(id, &operation, inputs.len(), violation))?;

            info!(
                operation = %id,
                kind = %operation.kind(),
                inputs = inputs.len(),
                outputs = produced.len(),
                elapsed_ms = start.elapsed().as_millis(),
                "Operation done"
            );
            if produced.is_empty() && !inputs.is_empty() {
                debug!(operation = %id, "Operation produced no thoughts");
            }

            graph.complete(id, produced);
        }

        Ok(())
    }
}

/// Concatenated predecessor outputs, or the bootstrap thought for a root.
fn gather_inputs(graph: &GraphOfOperations, id: OperationId, bootstrap: &Thought) -> Vec<Thought> {
    let predecessors = graph.predecessors(id);
    if predecessors.is_empty() {
        return vec![bootstrap.clone()];
    }
    predecessors
        .iter()
        .flat_map(|p| graph.thoughts(*p).iter().cloned())
        .collect()
}

fn operation_error(
    id: OperationId,
    operation: &Operation,
    input_thoughts: usize,
    violation: ContractViolation,
) -> OperationError {
    OperationError {
        operation: id,
        kind: operation.kind(),
        parameters: operation.parameters(),
        input_thoughts,
        violation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use crate::operations::{Aggregate, Generate, KeepBestN, Score};
    use crate::strategy::JsonStrategy;
    use pretty_assertions::assert_eq;

    fn controller(backend: ScriptedBackend) -> (Controller, Arc<ScriptedBackend>) {
        let backend = Arc::new(backend);
        let strategies = Strategies::uniform(Arc::new(JsonStrategy::new("task")));
        (Controller::new(backend.clone(), strategies), backend)
    }

    #[tokio::test]
    async fn test_check_rejects_root_aggregate_before_any_call() {
        let (controller, backend) = controller(ScriptedBackend::fixed(["{}"]));
        let mut graph = GraphOfOperations::new();
        let merge = graph.add_operation(Aggregate::new());
        graph.add_successor(merge, Score::independent()).unwrap();

        let err = controller
            .run(&mut graph, Payload::new().with("x", "a"))
            .await
            .unwrap_err();

        match err {
            AppError::Operation(e) => {
                assert_eq!(e.operation, merge);
                assert_eq!(e.kind, OperationKind::Aggregate);
                assert_eq!(e.violation, ContractViolation::NoPredecessors);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_check_rejects_missing_strategy() {
        let controller = Controller::new(
            Arc::new(ScriptedBackend::fixed(["{}"])),
            Strategies::new(),
        );
        let mut graph = GraphOfOperations::new();
        graph.add_operation(Generate::new(1));

        let err = controller.check(&graph).unwrap_err();
        assert!(err.to_string().contains("no strategy registered"));
    }

    #[tokio::test]
    async fn test_check_rejects_invalid_parameters() {
        let (controller, _) = controller(ScriptedBackend::fixed(["{}"]));
        let mut graph = GraphOfOperations::new();
        let generate = graph.add_operation(Generate::new(2));
        graph.add_successor(generate, KeepBestN::new(0)).unwrap();

        let err = controller.check(&graph).unwrap_err();
        assert!(err.to_string().contains("keep_best_n operation op-1 [n=0]"));
    }

    #[tokio::test]
    async fn test_rerun_resets_state_and_ids() {
        let (controller, _) = controller(ScriptedBackend::fixed([r#"{"y": "b"}"#]));
        let mut graph = GraphOfOperations::new();
        graph.add_operation(Generate::new(1));

        let first = controller
            .run(&mut graph, Payload::new().with("x", "a"))
            .await
            .unwrap();
        let second = controller
            .run(&mut graph, Payload::new().with("x", "a"))
            .await
            .unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].id(), second[0].id());
        assert_eq!(graph.thoughts(OperationId::new(0)).len(), 1);
        assert_eq!(graph.status(OperationId::new(0)), Some(NodeStatus::Done));
    }

    #[tokio::test]
    async fn test_reserved_fields_are_stripped_from_seed_payload() {
        let (controller, _) = controller(ScriptedBackend::fixed([r#"{"y": "b"}"#]));
        let mut graph = GraphOfOperations::new();
        graph.add_operation(Generate::new(1));

        let results = controller
            .run(&mut graph, Payload::new().with("x", "a").with("score", 3.0))
            .await
            .unwrap();

        assert!(!results[0].payload().contains("score"));
        assert_eq!(results[0].score(), None);
    }
}
