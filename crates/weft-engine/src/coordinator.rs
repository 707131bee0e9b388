use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use weft_core::error::{Result, WeftError};
use weft_core::event::EventBus;
use weft_core::traits::{RunStore, WorkflowStore};
use weft_core::types::*;

use crate::context::ExecutionContext;
use crate::executor::NodeExecutor;
use crate::planner;

/// Default page size for run history.
pub const DEFAULT_RUN_LIMIT: usize = 10;

/// Orchestrates full and partial runs: plan, execute layer by layer, persist.
pub struct RunCoordinator {
    workflows: Arc<dyn WorkflowStore>,
    runs: Arc<dyn RunStore>,
    executor: NodeExecutor,
    event_bus: Arc<EventBus>,
}

/// How a run's layer loop ended.
enum LoopOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

impl RunCoordinator {
    pub fn new(
        workflows: Arc<dyn WorkflowStore>,
        runs: Arc<dyn RunStore>,
        executor: NodeExecutor,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            workflows,
            runs,
            executor,
            event_bus,
        }
    }

    /// Run every node of the workflow.
    pub async fn execute_full(
        &self,
        workflow_id: &WorkflowId,
        ctx: &ExecutionContext,
    ) -> Result<Run> {
        self.execute(workflow_id, None, ctx).await
    }

    /// Run only `start_node_id` and the nodes it depends on.
    pub async fn execute_from(
        &self,
        workflow_id: &WorkflowId,
        start_node_id: &str,
        ctx: &ExecutionContext,
    ) -> Result<Run> {
        self.execute(workflow_id, Some(start_node_id), ctx).await
    }

    /// Run history for a workflow the caller owns, newest first.
    pub async fn list_runs(
        &self,
        workflow_id: &WorkflowId,
        user_id: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Run>> {
        self.workflows.get_workflow_owned_by(workflow_id, user_id).await?;
        self.runs
            .list_runs(workflow_id, user_id, limit.unwrap_or(DEFAULT_RUN_LIMIT))
            .await
    }

    async fn execute(
        &self,
        workflow_id: &WorkflowId,
        start_node_id: Option<&str>,
        ctx: &ExecutionContext,
    ) -> Result<Run> {
        let workflow = self
            .workflows
            .get_workflow_owned_by(workflow_id, &ctx.user_id)
            .await?;
        planner::validate(&workflow)?;
        if let Some(start) = start_node_id {
            if workflow.node(start).is_none() {
                return Err(WeftError::NotFound(format!("node {}", start)));
            }
        }

        let mode = match start_node_id {
            Some(_) => ExecutionMode::Partial,
            None => ExecutionMode::Full,
        };
        let run_id = self
            .runs
            .create_run(workflow_id, &ctx.user_id, mode, start_node_id)
            .await?;
        let started = Instant::now();

        info!(
            run_id = %run_id,
            workflow_id = %workflow_id,
            mode = mode.as_str(),
            nodes = workflow.nodes.len(),
            "Run started"
        );
        self.event_bus.publish(EngineEvent::RunStarted {
            run_id: run_id.clone(),
            workflow_id: workflow_id.clone(),
            mode,
        });

        let layers = match planner::build_layers(&workflow.nodes, &workflow.edges) {
            Ok(layers) => layers,
            Err(e) => {
                self.finish_failed(&run_id, &e.to_string()).await;
                return Err(e);
            }
        };
        let layers = match start_node_id {
            Some(start) => {
                let allowed = planner::ancestors_of(start, &workflow.edges);
                planner::restrict_layers(layers, &allowed)
            }
            None => layers,
        };
        debug!(run_id = %run_id, layers = layers.len(), "Execution plan built");

        match self.run_layers(&run_id, &workflow, &layers, ctx).await {
            Ok(LoopOutcome::Completed) => {
                self.runs.set_run_status(&run_id, RunStatus::Completed).await?;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(run_id = %run_id, elapsed_ms, "Run completed");
                self.event_bus.publish(EngineEvent::RunCompleted {
                    run_id: run_id.clone(),
                    elapsed_ms,
                });
            }
            Ok(LoopOutcome::Failed(reason)) => {
                self.finish_failed(&run_id, &reason).await;
            }
            Ok(LoopOutcome::Cancelled) => {
                self.runs.set_run_status(&run_id, RunStatus::Cancelled).await?;
                info!(run_id = %run_id, "Run cancelled");
                self.event_bus.publish(EngineEvent::RunCancelled {
                    run_id: run_id.clone(),
                });
            }
            Err(e) => {
                self.finish_failed(&run_id, &e.to_string()).await;
                return Err(e);
            }
        }

        self.runs
            .get_run(&run_id)
            .await?
            .ok_or_else(|| WeftError::NotFound(format!("run {}", run_id)))
    }

    /// Execute layers in order, stopping after the first layer with a failure.
    async fn run_layers(
        &self,
        run_id: &RunId,
        workflow: &Workflow,
        layers: &planner::Layers,
        ctx: &ExecutionContext,
    ) -> Result<LoopOutcome> {
        // Completed outputs so far, used for input resolution
        let mut results: HashMap<NodeId, NodeResult> = HashMap::new();

        for (index, layer) in layers.iter().enumerate() {
            if ctx.is_cancelled() {
                return Ok(LoopOutcome::Cancelled);
            }

            info!(run_id = %run_id, layer = index, nodes = layer.len(), "Layer started");
            self.event_bus.publish(EngineEvent::LayerStarted {
                run_id: run_id.clone(),
                index,
                node_ids: layer.clone(),
            });

            for node_id in layer {
                self.runs
                    .upsert_node_result(run_id, node_id, &NodeResult::running())
                    .await?;
                self.event_bus.publish(EngineEvent::NodeStarted {
                    run_id: run_id.clone(),
                    node_id: node_id.clone(),
                });
            }

            let mut join_set = self.spawn_layer(workflow, layer, &results, ctx);
            let finished = collect_layer_results(&mut join_set, layer).await;

            let mut failures = Vec::new();
            for (node_id, result) in finished {
                self.runs.upsert_node_result(run_id, &node_id, &result).await?;
                let elapsed = result.generation_time_ms.unwrap_or(0);
                match &result.error {
                    Some(err) if result.status == NodeStatus::Failed => {
                        failures.push(format!("{}: {}", node_id, err));
                        self.event_bus.publish(EngineEvent::NodeFailed {
                            run_id: run_id.clone(),
                            node_id: node_id.clone(),
                            error: err.clone(),
                        });
                    }
                    _ => {
                        self.event_bus.publish(EngineEvent::NodeCompleted {
                            run_id: run_id.clone(),
                            node_id: node_id.clone(),
                            generation_time_ms: elapsed,
                        });
                    }
                }
                results.insert(node_id, result);
            }

            if !failures.is_empty() {
                failures.sort();
                warn!(run_id = %run_id, layer = index, failed = failures.len(), "Layer failed, stopping run");
                return Ok(LoopOutcome::Failed(failures.join("; ")));
            }
        }

        Ok(LoopOutcome::Completed)
    }

    /// Spawn every node of a layer onto a JoinSet with its resolved inputs.
    fn spawn_layer(
        &self,
        workflow: &Workflow,
        layer: &[NodeId],
        results: &HashMap<NodeId, NodeResult>,
        ctx: &ExecutionContext,
    ) -> JoinSet<(NodeId, NodeResult)> {
        let mut join_set = JoinSet::new();

        for node_id in layer {
            let Some(node) = workflow.node(node_id).cloned() else {
                continue;
            };
            let inputs = resolve_inputs(workflow, node_id, results);
            let executor = self.executor.clone();
            let ctx = ctx.clone();

            join_set.spawn(async move {
                let result = executor.execute(&node, &inputs, &ctx).await;
                (node.id, result)
            });
        }

        join_set
    }

    async fn finish_failed(&self, run_id: &RunId, reason: &str) {
        if let Err(e) = self.runs.set_run_status(run_id, RunStatus::Failed).await {
            error!(run_id = %run_id, error = %e, "Failed to mark run failed");
        }
        warn!(run_id = %run_id, error = %reason, "Run failed");
        self.event_bus.publish(EngineEvent::RunFailed {
            run_id: run_id.clone(),
            error: reason.to_string(),
        });
    }
}

/// Wait for every task of a layer. Nodes whose task died get a failed result.
async fn collect_layer_results(
    join_set: &mut JoinSet<(NodeId, NodeResult)>,
    layer: &[NodeId],
) -> Vec<(NodeId, NodeResult)> {
    let mut finished = Vec::with_capacity(layer.len());
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(pair) => finished.push(pair),
            Err(join_err) => error!(error = %join_err, "Node task aborted"),
        }
    }

    for node_id in layer {
        if !finished.iter().any(|(id, _)| id == node_id) {
            finished.push((
                node_id.clone(),
                NodeResult::failed("Node execution aborted unexpectedly"),
            ));
        }
    }
    finished
}

/// Inputs for `node_id` from completed predecessors, in edge order.
///
/// A predecessor contributes its text when present (even empty), otherwise its
/// image. Edges from predecessors without a completed result are skipped.
pub fn resolve_inputs(
    workflow: &Workflow,
    node_id: &str,
    results: &HashMap<NodeId, NodeResult>,
) -> Vec<NodeInput> {
    workflow
        .incoming(node_id)
        .filter_map(|edge| {
            let result = results.get(&edge.source).filter(|r| r.is_completed())?;
            Some(NodeInput {
                source: edge.source.clone(),
                slot: edge.target_handle,
                value: result.output()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_inputs_by_slot_and_text_precedence() {
        let wf = Workflow::new(
            UserId::from_string("u"),
            "fan-in",
            vec![
                Node::image_upload("p", "data:image/png;base64,P"),
                Node::text_input("t", ""),
                Node::image_upload("s", "data:image/png;base64,S"),
                Node::image_gen("x", "m", "merge"),
            ],
            vec![
                Edge::new("p", "x", InputSlot::Input0),
                Edge::new("t", "x", InputSlot::Input2),
                Edge::new("s", "x", InputSlot::Input1),
            ],
        );

        let mut results = HashMap::new();
        results.insert("p".to_string(), NodeResult::completed_image("data:image/png;base64,P", None));
        results.insert("t".to_string(), NodeResult::completed_text(""));
        results.insert("s".to_string(), NodeResult::failed("nope"));

        let inputs = resolve_inputs(&wf, "x", &results);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].slot, Some(InputSlot::Input0));
        assert_eq!(inputs[0].value, NodeValue::Image("data:image/png;base64,P".into()));
        assert_eq!(inputs[1].slot, Some(InputSlot::Input2));
        assert_eq!(inputs[1].value, NodeValue::Text(String::new()));
    }

    #[tokio::test]
    async fn test_collect_fills_in_missing_nodes() {
        let mut join_set: JoinSet<(NodeId, NodeResult)> = JoinSet::new();
        join_set.spawn(async { ("a".to_string(), NodeResult::completed_text("ok")) });
        join_set.spawn(async {
            let missing: Option<(NodeId, NodeResult)> = None;
            missing.expect("task dies")
        });

        let layer = vec!["a".to_string(), "b".to_string()];
        let finished = collect_layer_results(&mut join_set, &layer).await;
        assert_eq!(finished.len(), 2);
        let b = finished.iter().find(|(id, _)| id == "b").unwrap();
        assert_eq!(b.1.status, NodeStatus::Failed);
    }
}
