pub mod context;
pub mod coordinator;
pub mod executor;
pub mod planner;
pub mod run_log;
pub mod single;

pub use context::ExecutionContext;
pub use coordinator::RunCoordinator;
pub use executor::NodeExecutor;
pub use run_log::RunLogger;
pub use single::SingleNodeRunner;

use std::sync::Arc;

use weft_core::error::Result;
use weft_core::event::EventBus;
use weft_core::traits::{
    ChatCompletionProvider, GeneratedImageStore, ImageGenerationProvider, RunStore, WorkflowStore,
};
use weft_core::types::{NodeResult, Run, UserId, WorkflowId};

/// The four entry points over one store and one pair of providers.
pub struct Engine {
    coordinator: RunCoordinator,
    single: SingleNodeRunner,
    event_bus: Arc<EventBus>,
}

impl Engine {
    pub fn new<S>(
        store: Arc<S>,
        image_provider: Arc<dyn ImageGenerationProvider>,
        chat_provider: Arc<dyn ChatCompletionProvider>,
        event_bus: Arc<EventBus>,
    ) -> Self
    where
        S: WorkflowStore + RunStore + GeneratedImageStore,
    {
        let workflows: Arc<dyn WorkflowStore> = store.clone();
        let runs: Arc<dyn RunStore> = store.clone();
        let images: Arc<dyn GeneratedImageStore> = store;

        let executor = NodeExecutor::new(image_provider, chat_provider, images);
        Self {
            coordinator: RunCoordinator::new(
                workflows.clone(),
                runs,
                executor.clone(),
                event_bus.clone(),
            ),
            single: SingleNodeRunner::new(workflows, executor),
            event_bus,
        }
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub async fn execute_full(&self, workflow_id: &WorkflowId, ctx: &ExecutionContext) -> Result<Run> {
        self.coordinator.execute_full(workflow_id, ctx).await
    }

    pub async fn execute_from(
        &self,
        workflow_id: &WorkflowId,
        start_node_id: &str,
        ctx: &ExecutionContext,
    ) -> Result<Run> {
        self.coordinator.execute_from(workflow_id, start_node_id, ctx).await
    }

    pub async fn execute_single(
        &self,
        workflow_id: &WorkflowId,
        node_id: &str,
        ctx: &ExecutionContext,
    ) -> Result<NodeResult> {
        self.single.execute_single(workflow_id, node_id, ctx).await
    }

    pub async fn list_runs(
        &self,
        workflow_id: &WorkflowId,
        user_id: &UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Run>> {
        self.coordinator.list_runs(workflow_id, user_id, limit).await
    }
}
