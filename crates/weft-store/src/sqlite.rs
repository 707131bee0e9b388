use chrono::{DateTime, SecondsFormat, Utc};
use futures::future::BoxFuture;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

use weft_core::error::{Result, WeftError};
use weft_core::traits::{GeneratedImageStore, RunStore, WorkflowStore};
use weft_core::types::*;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS workflows (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    is_template INTEGER NOT NULL DEFAULT 0,
    nodes TEXT NOT NULL,
    edges TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_workflows_user ON workflows(user_id, updated_at);

CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    workflow_id TEXT NOT NULL,
    user_id TEXT NOT NULL,
    status TEXT NOT NULL,
    execution_mode TEXT NOT NULL,
    start_node_id TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_runs_workflow ON runs(workflow_id, user_id, started_at);

CREATE TABLE IF NOT EXISTS node_results (
    run_id TEXT NOT NULL REFERENCES runs(id),
    node_id TEXT NOT NULL,
    status TEXT NOT NULL,
    image_data TEXT,
    image_id TEXT,
    text TEXT,
    error TEXT,
    generation_time_ms INTEGER,
    completed_at TEXT,
    PRIMARY KEY (run_id, node_id)
);

CREATE TABLE IF NOT EXISTS generated_images (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    prompt TEXT NOT NULL,
    model_id TEXT NOT NULL,
    image_data TEXT NOT NULL,
    negative_prompt TEXT NOT NULL DEFAULT '',
    settings TEXT NOT NULL,
    metadata TEXT NOT NULL,
    is_favorite INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_generated_images_user ON generated_images(user_id, created_at);
";

/// SQLite-backed store for workflows, runs, and generated images.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        // Create parent directories
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                WeftError::Database(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(db_err)?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;

        debug!(path = %path.display(), "SQLite store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        conn.execute_batch(SCHEMA).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored generated images.
    pub fn image_count(&self) -> Result<usize> {
        let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM generated_images", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }
}

fn db_err(e: rusqlite::Error) -> WeftError {
    WeftError::Database(e.to_string())
}

fn ts(dt: &DateTime<Utc>) -> String {
    // Fixed width so lexical order matches time order
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| WeftError::Database(format!("bad timestamp {:?}: {}", s, e)))
}

fn parse_opt_ts(s: Option<String>) -> Result<Option<DateTime<Utc>>> {
    s.as_deref().map(parse_ts).transpose()
}

struct WorkflowRow {
    id: String,
    user_id: String,
    name: String,
    description: String,
    is_template: bool,
    nodes: String,
    edges: String,
    created_at: String,
    updated_at: String,
}

impl WorkflowRow {
    const COLUMNS: &'static str =
        "id, user_id, name, description, is_template, nodes, edges, created_at, updated_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            name: row.get(2)?,
            description: row.get(3)?,
            is_template: row.get(4)?,
            nodes: row.get(5)?,
            edges: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_workflow(self) -> Result<Workflow> {
        Ok(Workflow {
            id: WorkflowId(self.id),
            user_id: UserId(self.user_id),
            name: self.name,
            description: self.description,
            nodes: serde_json::from_str(&self.nodes)?,
            edges: serde_json::from_str(&self.edges)?,
            is_template: self.is_template,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

struct RunRow {
    id: String,
    workflow_id: String,
    user_id: String,
    status: String,
    execution_mode: String,
    start_node_id: Option<String>,
    started_at: String,
    completed_at: Option<String>,
}

impl RunRow {
    const COLUMNS: &'static str =
        "id, workflow_id, user_id, status, execution_mode, start_node_id, started_at, completed_at";

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            workflow_id: row.get(1)?,
            user_id: row.get(2)?,
            status: row.get(3)?,
            execution_mode: row.get(4)?,
            start_node_id: row.get(5)?,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
        })
    }
}

/// Assemble a full Run from its row plus its node_results rows.
fn load_run(conn: &Connection, row: RunRow) -> Result<Run> {
    let mut stmt = conn
        .prepare(
            "SELECT node_id, status, image_data, image_id, text, error, generation_time_ms, completed_at
             FROM node_results WHERE run_id = ?1",
        )
        .map_err(db_err)?;

    let rows = stmt
        .query_map(params![row.id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<String>>(2)?,
                r.get::<_, Option<String>>(3)?,
                r.get::<_, Option<String>>(4)?,
                r.get::<_, Option<String>>(5)?,
                r.get::<_, Option<i64>>(6)?,
                r.get::<_, Option<String>>(7)?,
            ))
        })
        .map_err(db_err)?;

    let mut node_results = std::collections::HashMap::new();
    for r in rows {
        let (node_id, status, image_data, image_id, text, error, ms, completed_at) =
            r.map_err(db_err)?;
        node_results.insert(
            node_id,
            NodeResult {
                status: status.parse()?,
                image_data,
                image_id: image_id.map(ImageId),
                text,
                error,
                generation_time_ms: ms.map(|v| v as u64),
                completed_at: parse_opt_ts(completed_at)?,
            },
        );
    }

    Ok(Run {
        id: RunId(row.id),
        workflow_id: WorkflowId(row.workflow_id),
        user_id: UserId(row.user_id),
        status: row.status.parse()?,
        execution_mode: row.execution_mode.parse()?,
        start_node_id: row.start_node_id,
        node_results,
        started_at: parse_ts(&row.started_at)?,
        completed_at: parse_opt_ts(row.completed_at)?,
    })
}

/// `None` when the run does not exist, `Some(true)` once it is frozen.
fn run_frozen(conn: &Connection, run_id: &str) -> Result<Option<bool>> {
    conn.query_row(
        "SELECT completed_at IS NOT NULL FROM runs WHERE id = ?1",
        params![run_id],
        |row| row.get::<_, bool>(0),
    )
    .optional()
    .map_err(db_err)
}

impl WorkflowStore for SqliteStore {
    fn get_workflow(&self, id: &WorkflowId) -> BoxFuture<'_, Result<Option<Workflow>>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            let row = conn
                .query_row(
                    &format!("SELECT {} FROM workflows WHERE id = ?1", WorkflowRow::COLUMNS),
                    params![id],
                    WorkflowRow::from_row,
                )
                .optional()
                .map_err(db_err)?;

            row.map(WorkflowRow::into_workflow).transpose()
        })
    }

    fn save_workflow(&self, workflow: &Workflow) -> BoxFuture<'_, Result<()>> {
        let encoded = serde_json::to_string(&workflow.nodes)
            .and_then(|nodes| serde_json::to_string(&workflow.edges).map(|edges| (nodes, edges)));
        let workflow = workflow.clone();

        Box::pin(async move {
            let (nodes, edges) = encoded?;
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            conn.execute(
                "INSERT INTO workflows
                    (id, user_id, name, description, is_template, nodes, edges, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    description = excluded.description,
                    is_template = excluded.is_template,
                    nodes = excluded.nodes,
                    edges = excluded.edges,
                    updated_at = excluded.updated_at",
                params![
                    workflow.id.0,
                    workflow.user_id.0,
                    workflow.name,
                    workflow.description,
                    workflow.is_template,
                    nodes,
                    edges,
                    ts(&workflow.created_at),
                    ts(&workflow.updated_at),
                ],
            )
            .map_err(db_err)?;

            debug!(workflow_id = %workflow.id, nodes = workflow.nodes.len(), "Workflow saved");
            Ok(())
        })
    }

    fn list_workflows(&self, user_id: &UserId) -> BoxFuture<'_, Result<Vec<Workflow>>> {
        let user_id = user_id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM workflows
                     WHERE user_id = ?1 OR is_template = 1
                     ORDER BY updated_at DESC",
                    WorkflowRow::COLUMNS
                ))
                .map_err(db_err)?;

            let rows = stmt
                .query_map(params![user_id], WorkflowRow::from_row)
                .map_err(db_err)?;

            let mut workflows = Vec::new();
            for row in rows {
                workflows.push(row.map_err(db_err)?.into_workflow()?);
            }
            Ok(workflows)
        })
    }
}

impl RunStore for SqliteStore {
    fn create_run(
        &self,
        workflow_id: &WorkflowId,
        user_id: &UserId,
        mode: ExecutionMode,
        start_node_id: Option<&str>,
    ) -> BoxFuture<'_, Result<RunId>> {
        let workflow_id = workflow_id.0.clone();
        let user_id = user_id.0.clone();
        let start_node_id = start_node_id.map(str::to_string);

        Box::pin(async move {
            let run_id = RunId::new();
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            conn.execute(
                "INSERT INTO runs (id, workflow_id, user_id, status, execution_mode, start_node_id, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    run_id.0,
                    workflow_id,
                    user_id,
                    RunStatus::Running.as_str(),
                    mode.as_str(),
                    start_node_id,
                    ts(&Utc::now()),
                ],
            )
            .map_err(db_err)?;

            Ok(run_id)
        })
    }

    fn set_run_status(&self, run_id: &RunId, status: RunStatus) -> BoxFuture<'_, Result<()>> {
        let run_id = run_id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            match run_frozen(&conn, &run_id)? {
                None => return Err(WeftError::NotFound(format!("run {}", run_id))),
                Some(true) => {
                    debug!(run_id = %run_id, status = status.as_str(), "Run already finished, status change ignored");
                    return Ok(());
                }
                Some(false) => {}
            }

            let completed_at = status.is_terminal().then(|| ts(&Utc::now()));
            conn.execute(
                "UPDATE runs SET status = ?2, completed_at = ?3 WHERE id = ?1",
                params![run_id, status.as_str(), completed_at],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn upsert_node_result(
        &self,
        run_id: &RunId,
        node_id: &str,
        result: &NodeResult,
    ) -> BoxFuture<'_, Result<()>> {
        let run_id = run_id.0.clone();
        let node_id = node_id.to_string();
        let result = result.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            match run_frozen(&conn, &run_id)? {
                None => return Err(WeftError::NotFound(format!("run {}", run_id))),
                Some(true) => {
                    debug!(run_id = %run_id, node_id = %node_id, "Run already finished, node update ignored");
                    return Ok(());
                }
                Some(false) => {}
            }

            // Absent fields keep their stored value
            conn.execute(
                "INSERT INTO node_results
                    (run_id, node_id, status, image_data, image_id, text, error, generation_time_ms, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(run_id, node_id) DO UPDATE SET
                    status = excluded.status,
                    image_data = COALESCE(excluded.image_data, node_results.image_data),
                    image_id = COALESCE(excluded.image_id, node_results.image_id),
                    text = COALESCE(excluded.text, node_results.text),
                    error = COALESCE(excluded.error, node_results.error),
                    generation_time_ms = COALESCE(excluded.generation_time_ms, node_results.generation_time_ms),
                    completed_at = COALESCE(excluded.completed_at, node_results.completed_at)",
                params![
                    run_id,
                    node_id,
                    result.status.as_str(),
                    result.image_data,
                    result.image_id.map(|id| id.0),
                    result.text,
                    result.error,
                    result.generation_time_ms.map(|v| v as i64),
                    result.completed_at.as_ref().map(ts),
                ],
            )
            .map_err(db_err)?;
            Ok(())
        })
    }

    fn get_run(&self, run_id: &RunId) -> BoxFuture<'_, Result<Option<Run>>> {
        let run_id = run_id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            let row = conn
                .query_row(
                    &format!("SELECT {} FROM runs WHERE id = ?1", RunRow::COLUMNS),
                    params![run_id],
                    RunRow::from_row,
                )
                .optional()
                .map_err(db_err)?;

            row.map(|r| load_run(&conn, r)).transpose()
        })
    }

    fn list_runs(
        &self,
        workflow_id: &WorkflowId,
        user_id: &UserId,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<Run>>> {
        let workflow_id = workflow_id.0.clone();
        let user_id = user_id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM runs
                     WHERE workflow_id = ?1 AND user_id = ?2
                     ORDER BY started_at DESC, rowid DESC
                     LIMIT ?3",
                    RunRow::COLUMNS
                ))
                .map_err(db_err)?;

            let rows: Vec<RunRow> = stmt
                .query_map(params![workflow_id, user_id, limit as i64], RunRow::from_row)
                .map_err(db_err)?
                .collect::<rusqlite::Result<_>>()
                .map_err(db_err)?;

            rows.into_iter().map(|r| load_run(&conn, r)).collect()
        })
    }
}

impl GeneratedImageStore for SqliteStore {
    fn save_image(&self, image: NewGeneratedImage) -> BoxFuture<'_, Result<ImageId>> {
        Box::pin(async move {
            let id = ImageId::new();
            let settings = serde_json::to_string(&image.settings)?;
            let metadata = serde_json::to_string(&image.metadata)?;
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            conn.execute(
                "INSERT INTO generated_images
                    (id, user_id, prompt, model_id, image_data, negative_prompt, settings, metadata, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.0,
                    image.user_id.0,
                    image.prompt,
                    image.model_id,
                    image.image_data,
                    image.negative_prompt,
                    settings,
                    metadata,
                    ts(&Utc::now()),
                ],
            )
            .map_err(db_err)?;

            debug!(image_id = %id, model = %image.model_id, "Generated image stored");
            Ok(id)
        })
    }

    fn get_image(&self, id: &ImageId) -> BoxFuture<'_, Result<Option<GeneratedImageRecord>>> {
        let id = id.0.clone();

        Box::pin(async move {
            let conn = self.conn.lock().map_err(|e| WeftError::Database(e.to_string()))?;

            let row = conn
                .query_row(
                    "SELECT user_id, prompt, model_id, image_data, negative_prompt, settings, metadata, is_favorite, created_at
                     FROM generated_images WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, String>(3)?,
                            r.get::<_, String>(4)?,
                            r.get::<_, String>(5)?,
                            r.get::<_, String>(6)?,
                            r.get::<_, bool>(7)?,
                            r.get::<_, String>(8)?,
                        ))
                    },
                )
                .optional()
                .map_err(db_err)?;

            let Some((user_id, prompt, model_id, image_data, negative_prompt, settings, metadata, is_favorite, created_at)) = row
            else {
                return Ok(None);
            };

            Ok(Some(GeneratedImageRecord {
                id: ImageId(id),
                image: NewGeneratedImage {
                    user_id: UserId(user_id),
                    prompt,
                    model_id,
                    image_data,
                    negative_prompt,
                    settings: serde_json::from_str(&settings)?,
                    metadata: serde_json::from_str(&metadata)?,
                },
                is_favorite,
                created_at: parse_ts(&created_at)?,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_workflow(owner: &str) -> Workflow {
        Workflow::new(
            UserId::from_string(owner),
            "chain",
            vec![
                Node::image_upload("u", "data:image/png;base64,AAA"),
                Node::image_gen("g", "google/gemini-2.5-flash-image", "watercolor"),
            ],
            vec![Edge::new("u", "g", InputSlot::Input0)],
        )
    }

    #[tokio::test]
    async fn test_workflow_roundtrip_and_listing() {
        let store = SqliteStore::in_memory().unwrap();
        let wf = sample_workflow("alice");
        store.save_workflow(&wf).await.unwrap();

        let loaded = store.get_workflow(&wf.id).await.unwrap().unwrap();
        assert_eq!(loaded.nodes.len(), 2);
        assert_eq!(loaded.edges[0].target_handle, Some(InputSlot::Input0));

        let mut template = sample_workflow("bob");
        template.is_template = true;
        store.save_workflow(&template).await.unwrap();
        store.save_workflow(&sample_workflow("carol")).await.unwrap();

        let visible = store.list_workflows(&UserId::from_string("alice")).await.unwrap();
        assert_eq!(visible.len(), 2);
    }

    #[tokio::test]
    async fn test_ownership_check() {
        let store = SqliteStore::in_memory().unwrap();
        let mut wf = sample_workflow("alice");
        wf.is_template = true;
        store.save_workflow(&wf).await.unwrap();

        let alice = UserId::from_string("alice");
        let bob = UserId::from_string("bob");
        assert!(store.get_workflow_owned_by(&wf.id, &alice).await.is_ok());
        assert!(matches!(
            store.get_workflow_owned_by(&wf.id, &bob).await,
            Err(WeftError::Unauthorized(_))
        ));
        assert!(matches!(
            store.get_workflow_owned_by(&WorkflowId::new(), &alice).await,
            Err(WeftError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_node_result_upsert_merges() {
        let store = SqliteStore::in_memory().unwrap();
        let wf = sample_workflow("alice");
        let run_id = store
            .create_run(&wf.id, &wf.user_id, ExecutionMode::Full, None)
            .await
            .unwrap();

        store.upsert_node_result(&run_id, "t", &NodeResult::running()).await.unwrap();
        store
            .upsert_node_result(&run_id, "t", &NodeResult::completed_text("").with_generation_time(3))
            .await
            .unwrap();

        let run = store.get_run(&run_id).await.unwrap().unwrap();
        let result = run.result("t").unwrap();
        assert_eq!(result.status, NodeStatus::Completed);
        assert_eq!(result.text.as_deref(), Some(""));
        assert_eq!(result.generation_time_ms, Some(3));
        assert!(result.image_data.is_none());
    }

    #[tokio::test]
    async fn test_terminal_status_freezes_run() {
        let store = SqliteStore::in_memory().unwrap();
        let wf = sample_workflow("alice");
        let run_id = store
            .create_run(&wf.id, &wf.user_id, ExecutionMode::Partial, Some("g"))
            .await
            .unwrap();

        store.set_run_status(&run_id, RunStatus::Failed).await.unwrap();
        store.set_run_status(&run_id, RunStatus::Completed).await.unwrap();
        store.upsert_node_result(&run_id, "g", &NodeResult::running()).await.unwrap();

        let run = store.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.execution_mode, ExecutionMode::Partial);
        assert_eq!(run.start_node_id.as_deref(), Some("g"));
        assert!(run.completed_at.is_some());
        assert!(run.node_results.is_empty());

        assert!(matches!(
            store.set_run_status(&RunId::new(), RunStatus::Failed).await,
            Err(WeftError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_runs_newest_first() {
        let store = SqliteStore::in_memory().unwrap();
        let wf = sample_workflow("alice");
        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                store
                    .create_run(&wf.id, &wf.user_id, ExecutionMode::Full, None)
                    .await
                    .unwrap(),
            );
        }
        store
            .create_run(&wf.id, &UserId::from_string("bob"), ExecutionMode::Full, None)
            .await
            .unwrap();

        let runs = store.list_runs(&wf.id, &wf.user_id, 2).await.unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, ids[2]);
        assert_eq!(runs[1].id, ids[1]);
    }

    #[tokio::test]
    async fn test_generated_images_always_insert() {
        let store = SqliteStore::in_memory().unwrap();
        let image = NewGeneratedImage {
            user_id: UserId::from_string("alice"),
            prompt: "watercolor".into(),
            model_id: "m".into(),
            image_data: "data:image/png;base64,AAA".into(),
            negative_prompt: String::new(),
            settings: ImageSettings {
                input_images_count: 1,
                has_input_images: true,
            },
            metadata: serde_json::json!({"workflow_execution": true}),
        };

        let a = store.save_image(image.clone()).await.unwrap();
        let b = store.save_image(image).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.image_count().unwrap(), 2);

        let record = store.get_image(&a).await.unwrap().unwrap();
        assert_eq!(record.image.settings.input_images_count, 1);
        assert_eq!(record.image.metadata["workflow_execution"], true);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("weft.db");
        let wf = sample_workflow("alice");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.save_workflow(&wf).await.unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert!(reopened.get_workflow(&wf.id).await.unwrap().is_some());
    }
}
