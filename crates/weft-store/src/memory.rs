use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use futures::future::BoxFuture;

use weft_core::error::{Result, WeftError};
use weft_core::traits::{GeneratedImageStore, RunStore, WorkflowStore};
use weft_core::types::*;

#[derive(Default)]
struct State {
    workflows: HashMap<WorkflowId, Workflow>,
    // Insertion order breaks started_at ties in list_runs
    runs: Vec<Run>,
    images: HashMap<ImageId, GeneratedImageRecord>,
}

/// In-process store with the same semantics as [`crate::SqliteStore`].
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|e| WeftError::Database(e.to_string()))
    }

    pub fn image_count(&self) -> Result<usize> {
        Ok(self.lock()?.images.len())
    }

    pub fn run_count(&self) -> Result<usize> {
        Ok(self.lock()?.runs.len())
    }
}

impl State {
    fn run_mut(&mut self, run_id: &RunId) -> Result<&mut Run> {
        self.runs
            .iter_mut()
            .find(|r| &r.id == run_id)
            .ok_or_else(|| WeftError::NotFound(format!("run {}", run_id)))
    }
}

impl WorkflowStore for MemoryStore {
    fn get_workflow(&self, id: &WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.lock()?.workflows.get(&id).cloned()) })
    }

    fn save_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>> {
        let workflow = workflow.clone();
        Box::pin(async move {
            let mut state = self.lock()?;
            let created_at = state
                .workflows
                .get(&workflow.id)
                .map(|w| w.created_at)
                .unwrap_or(workflow.created_at);
            state
                .workflows
                .insert(workflow.id.clone(), Workflow { created_at, ..workflow });
            Ok(())
        })
    }

    fn list_workflows(&self, user_id: &UserId) -> BoxFuture<'_, Result<Vec<Workflow>>> {
        let user_id = user_id.clone();
        Box::pin(async move {
            let state = self.lock()?;
            let mut workflows: Vec<Workflow> = state
                .workflows
                .values()
                .filter(|w| w.user_id == user_id || w.is_template)
                .cloned()
                .collect();
            workflows.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(workflows)
        })
    }
}

impl RunStore for MemoryStore {
    fn create_run(
        &self,
        workflow_id: &WorkflowId,
        user_id: &UserId,
        mode: ExecutionMode,
        start_node_id: Option<&str>,
    ) -> BoxFuture<'_, Result<RunId>> {
        let run = Run {
            id: RunId::new(),
            workflow_id: workflow_id.clone(),
            user_id: user_id.clone(),
            status: RunStatus::Running,
            execution_mode: mode,
            start_node_id: start_node_id.map(str::to_string),
            node_results: HashMap::new(),
            started_at: Utc::now(),
            completed_at: None,
        };

        Box::pin(async move {
            let id = run.id.clone();
            self.lock()?.runs.push(run);
            Ok(id)
        })
    }

    fn set_run_status(&self, run_id: &RunId, status: RunStatus) -> BoxFuture<'_, Result<()>> {
        let run_id = run_id.clone();
        Box::pin(async move {
            let mut state = self.lock()?;
            let run = state.run_mut(&run_id)?;
            if run.completed_at.is_some() {
                return Ok(());
            }
            run.status = status;
            if status.is_terminal() {
                run.completed_at = Some(Utc::now());
            }
            Ok(())
        })
    }

    fn upsert_node_result(
        &self,
        run_id: &RunId,
        node_id: &str,
        result: &NodeResult,
    ) -> BoxFuture<'_, Result<()>> {
        let run_id = run_id.clone();
        let node_id = node_id.to_string();
        let result = result.clone();

        Box::pin(async move {
            let mut state = self.lock()?;
            let run = state.run_mut(&run_id)?;
            if run.completed_at.is_some() {
                return Ok(());
            }
            match run.node_results.get_mut(&node_id) {
                Some(existing) => existing.merge(&result),
                None => {
                    run.node_results.insert(node_id, result);
                }
            }
            Ok(())
        })
    }

    fn get_run(&self, run_id: &RunId) -> BoxFuture<'_, Result<Option<Run>>> {
        let run_id = run_id.clone();
        Box::pin(async move {
            let state = self.lock()?;
            Ok(state.runs.iter().find(|r| r.id == run_id).cloned())
        })
    }

    fn list_runs(
        &self,
        workflow_id: &WorkflowId,
        user_id: &UserId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Run>>> {
        let workflow_id = workflow_id.clone();
        let user_id = user_id.clone();

        Box::pin(async move {
            let state = self.lock()?;
            let mut runs: Vec<Run> = state
                .runs
                .iter()
                .rev()
                .filter(|r| r.workflow_id == workflow_id && r.user_id == user_id)
                .cloned()
                .collect();
            // Stable sort keeps newer insertions first on equal timestamps
            runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
            runs.truncate(limit);
            Ok(runs)
        })
    }
}

impl GeneratedImageStore for MemoryStore {
    fn save_image(&self, image: NewGeneratedImage) -> BoxFuture<'_, Result<ImageId>> {
        Box::pin(async move {
            let id = ImageId::new();
            let record = GeneratedImageRecord {
                id: id.clone(),
                image,
                is_favorite: false,
                created_at: Utc::now(),
            };
            self.lock()?.images.insert(id.clone(), record);
            Ok(id)
        })
    }

    fn get_image(&self, id: &ImageId) -> BoxFuture<'_, Result<Option<GeneratedImageRecord>>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.lock()?.images.get(&id).cloned()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_creates_then_merges() {
        let store = MemoryStore::new();
        let run_id = store
            .create_run(&WorkflowId::new(), &UserId::from_string("u"), ExecutionMode::Full, None)
            .await
            .unwrap();

        store
            .upsert_node_result(&run_id, "g", &NodeResult::completed_image("data:image/png;base64,A", None))
            .await
            .unwrap();
        store.upsert_node_result(&run_id, "g", &NodeResult::running()).await.unwrap();

        let run = store.get_run(&run_id).await.unwrap().unwrap();
        let result = run.result("g").unwrap();
        assert_eq!(result.status, NodeStatus::Running);
        assert_eq!(result.image_data.as_deref(), Some("data:image/png;base64,A"));
    }

    #[tokio::test]
    async fn test_finished_run_is_immutable() {
        let store = MemoryStore::new();
        let run_id = store
            .create_run(&WorkflowId::new(), &UserId::from_string("u"), ExecutionMode::Full, None)
            .await
            .unwrap();
        store.set_run_status(&run_id, RunStatus::Cancelled).await.unwrap();
        store.set_run_status(&run_id, RunStatus::Running).await.unwrap();
        store.upsert_node_result(&run_id, "a", &NodeResult::running()).await.unwrap();

        let run = store.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Cancelled);
        assert!(run.node_results.is_empty());
    }

    #[tokio::test]
    async fn test_list_runs_scoped_and_limited() {
        let store = MemoryStore::new();
        let wf = WorkflowId::new();
        let me = UserId::from_string("me");
        let first = store.create_run(&wf, &me, ExecutionMode::Full, None).await.unwrap();
        let second = store.create_run(&wf, &me, ExecutionMode::Full, None).await.unwrap();
        store
            .create_run(&WorkflowId::new(), &me, ExecutionMode::Full, None)
            .await
            .unwrap();

        let runs = store.list_runs(&wf, &me, 10).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, second);
        assert_eq!(runs[1].id, first);
        assert_eq!(store.list_runs(&wf, &me, 1).await.unwrap().len(), 1);
    }
}
