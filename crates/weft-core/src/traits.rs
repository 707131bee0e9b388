use futures::future::BoxFuture;

use crate::error::{Result, WeftError};
use crate::types::*;

/// Workflow definitions: the node/edge set plus each node's cached outputs.
pub trait WorkflowStore: Send + Sync + 'static {
    /// Fetch a workflow by id regardless of owner.
    fn get_workflow(&self, id: &WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>>;

    /// Insert or replace a workflow.
    fn save_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>>;

    /// Workflows owned by `user_id` plus shared templates, newest first.
    fn list_workflows(&self, user_id: &UserId) -> BoxFuture<'_, Result<Vec<Workflow>>>;

    /// Fetch a workflow for execution: absent is NotFound, another owner is Unauthorized.
    ///
    /// Templates are readable by anyone but only executable by their owner.
    fn get_workflow_owned_by<'a>(
        &'a self,
        id: &'a WorkflowId,
        user_id: &'a UserId,
    ) -> BoxFuture<'a, Result<Workflow>> {
        Box::pin(async move {
            let workflow = self
                .get_workflow(id)
                .await?
                .ok_or_else(|| WeftError::NotFound(format!("workflow {}", id)))?;
            if workflow.user_id != *user_id {
                return Err(WeftError::Unauthorized(id.to_string()));
            }
            Ok(workflow)
        })
    }
}

/// Run history: one record per full or partial execution.
pub trait RunStore: Send + Sync + 'static {
    /// Create a run with status `running` and return its id.
    fn create_run(
        &self,
        workflow_id: &WorkflowId,
        user_id: &UserId,
        mode: ExecutionMode,
        start_node_id: Option<&str>,
    ) -> BoxFuture<'_, Result<RunId>>;

    /// Move a run to `status`. Ignored once the run has a `completed_at`.
    fn set_run_status(&self, run_id: &RunId, status: RunStatus) -> BoxFuture<'_, Result<()>>;

    /// Create the node's entry on first write, merge present fields afterwards.
    fn upsert_node_result(
        &self,
        run_id: &RunId,
        node_id: &str,
        result: &NodeResult,
    ) -> BoxFuture<'_, Result<()>>;

    fn get_run(&self, run_id: &RunId) -> BoxFuture<'_, Result<Option<Run>>>;

    /// Runs of a workflow started by `user_id`, newest first.
    fn list_runs(
        &self,
        workflow_id: &WorkflowId,
        user_id: &UserId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Run>>>;
}

/// Permanent generated-image records. Saving always creates a new record.
pub trait GeneratedImageStore: Send + Sync + 'static {
    fn save_image(&self, image: NewGeneratedImage) -> BoxFuture<'_, Result<ImageId>>;

    fn get_image(&self, id: &ImageId) -> BoxFuture<'_, Result<Option<GeneratedImageRecord>>>;
}

/// External image-generation provider.
pub trait ImageGenerationProvider: Send + Sync + 'static {
    fn generate(&self, request: ImageRequest) -> BoxFuture<'_, Result<ImageResponse>>;

    /// How many input images `model` accepts.
    fn max_input_images(&self, model: &str) -> usize {
        let _ = model;
        3
    }
}

/// External chat-completion provider (non-streaming).
pub trait ChatCompletionProvider: Send + Sync + 'static {
    fn complete(&self, request: ChatRequest) -> BoxFuture<'_, Result<ChatResponse>>;
}
