use std::sync::Arc;

use tracing::info;

use weft_core::error::{Result, WeftError};
use weft_core::traits::WorkflowStore;
use weft_core::types::{NodeInput, NodeKind, NodeResult, WorkflowId};

use crate::context::ExecutionContext;
use crate::executor::NodeExecutor;

/// Re-executes one node from the cached outputs of its direct predecessors.
///
/// No graph traversal and no run record: the result goes straight back to
/// the caller.
pub struct SingleNodeRunner {
    workflows: Arc<dyn WorkflowStore>,
    executor: NodeExecutor,
}

impl SingleNodeRunner {
    pub fn new(workflows: Arc<dyn WorkflowStore>, executor: NodeExecutor) -> Self {
        Self {
            workflows,
            executor,
        }
    }

    pub async fn execute_single(
        &self,
        workflow_id: &WorkflowId,
        node_id: &str,
        ctx: &ExecutionContext,
    ) -> Result<NodeResult> {
        let workflow = self
            .workflows
            .get_workflow_owned_by(workflow_id, &ctx.user_id)
            .await?;
        let node = workflow
            .node(node_id)
            .ok_or_else(|| WeftError::NotFound(format!("node {}", node_id)))?;

        let mut inputs = Vec::new();
        for edge in workflow.incoming(node_id) {
            let source = workflow.node(&edge.source).ok_or_else(|| {
                WeftError::Validation(format!(
                    "Edge '{}' references unknown node '{}'",
                    edge.id, edge.source
                ))
            })?;

            let value = source
                .cached_output()
                .ok_or_else(|| WeftError::Validation(missing_input_message(&source.id, source.kind)))?;

            inputs.push(NodeInput {
                source: source.id.clone(),
                slot: edge.target_handle,
                value,
            });
        }

        info!(
            workflow_id = %workflow_id,
            node_id = %node_id,
            inputs = inputs.len(),
            "Executing single node"
        );
        Ok(self.executor.execute(node, &inputs, ctx).await)
    }
}

fn missing_input_message(source_id: &str, kind: NodeKind) -> String {
    if kind.produces_image() {
        format!(
            "Input node '{}' has no image. Please run it first or upload an image.",
            source_id
        )
    } else {
        format!(
            "Input node '{}' has no output. Please run it first.",
            source_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_messages() {
        assert!(missing_input_message("g1", NodeKind::ImageGen).contains("has no image"));
        assert!(missing_input_message("u", NodeKind::ImageUpload).contains("upload an image"));
        assert!(missing_input_message("a", NodeKind::AiAgent).contains("Please run it first"));
    }
}
