use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::{error::RecvError, Receiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use weft_core::event::EventBus;
use weft_core::types::{EngineEvent, RunId};

/// JSONL run logger.
///
/// Follows one run on the EventBus and appends one JSON object per line to
/// `{log_dir}/{run_id}/{timestamp}.jsonl`. Lines already written survive a
/// crash mid-run.
pub struct RunLogger {
    log_dir: PathBuf,
    level: u8,
}

/// A single log entry written to the JSONL file.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    run_id: String,
    event_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<serde_json::Value>,
}

impl RunLogger {
    /// `level` controls verbosity: 1=run summary, 2=per layer, 3=per node.
    pub fn new(log_dir: PathBuf, level: u8) -> Self {
        Self { log_dir, level }
    }

    /// Subscribe now and log the next run to start in the background.
    ///
    /// Subscribing before the run begins guarantees `RunStarted` is seen.
    pub fn spawn(self, event_bus: &Arc<EventBus>, cancel: CancellationToken) -> JoinHandle<()> {
        let rx = event_bus.subscribe();
        tokio::spawn(self.run(rx, cancel))
    }

    async fn run(self, mut rx: Receiver<EngineEvent>, cancel: CancellationToken) {
        // Wait for the run this logger follows
        let started = loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                result = rx.recv() => match result {
                    Ok(event @ EngineEvent::RunStarted { .. }) => break event,
                    Ok(_) | Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => return,
                },
            }
        };
        let run_id = started.run_id().clone();

        let run_dir = self.log_dir.join(&run_id.0);
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            error!(error = %e, "Failed to create log directory");
            return;
        }

        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_path = run_dir.join(format!("{}.jsonl", timestamp));

        let file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .await
        {
            Ok(f) => f,
            Err(e) => {
                error!(error = %e, path = %log_path.display(), "Failed to open log file");
                return;
            }
        };

        info!(path = %log_path.display(), "RunLogger started");
        let mut writer = tokio::io::BufWriter::new(file);

        let mut pending = Some(started);
        loop {
            let event = match pending.take() {
                Some(e) => e,
                None => tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("RunLogger cancelled");
                        break;
                    }
                    result = rx.recv() => match result {
                        Ok(event) => event,
                        Err(RecvError::Lagged(n)) => {
                            debug!(skipped = n, "RunLogger lagged, skipped events");
                            continue;
                        }
                        Err(RecvError::Closed) => {
                            debug!("EventBus closed, RunLogger stopping");
                            break;
                        }
                    },
                },
            };

            if event.run_id() != &run_id {
                continue;
            }

            if let Some(entry) = self.event_to_entry(&run_id, &event) {
                if let Ok(json) = serde_json::to_string(&entry) {
                    let line = format!("{}\n", json);
                    if let Err(e) = writer.write_all(line.as_bytes()).await {
                        error!(error = %e, "Failed to write log entry");
                        break;
                    }
                    // Flush per entry so a crash loses nothing already logged
                    if let Err(e) = writer.flush().await {
                        error!(error = %e, "Failed to flush log");
                    }
                }
            }

            if event.is_terminal() {
                break;
            }
        }

        writer.flush().await.ok();
        debug!(path = %log_path.display(), "RunLogger finished");
    }

    /// Convert an event to a log entry (None if filtered by level).
    fn event_to_entry(&self, run_id: &RunId, event: &EngineEvent) -> Option<LogEntry> {
        let entry = |event_type, node_id: Option<&String>, detail| LogEntry {
            timestamp: Utc::now().to_rfc3339(),
            run_id: run_id.0.clone(),
            event_type,
            node_id: node_id.cloned(),
            detail,
        };

        match event {
            // L1: run summary
            EngineEvent::RunStarted { .. } => Some(entry("run_started", None, None)),
            EngineEvent::RunCompleted { elapsed_ms, .. } => Some(entry(
                "run_completed",
                None,
                Some(serde_json::json!({ "elapsed_ms": elapsed_ms })),
            )),
            EngineEvent::RunFailed { error, .. } => Some(entry(
                "run_failed",
                None,
                Some(serde_json::json!({ "error": error })),
            )),
            EngineEvent::RunCancelled { .. } => Some(entry("run_cancelled", None, None)),

            // L2: per layer
            EngineEvent::LayerStarted { index, node_ids, .. } if self.level >= 2 => Some(entry(
                "layer_started",
                None,
                Some(serde_json::json!({ "index": index, "node_ids": node_ids })),
            )),
            // Failures are worth seeing at L2
            EngineEvent::NodeFailed { node_id, error, .. } if self.level >= 2 => Some(entry(
                "node_failed",
                Some(node_id),
                Some(serde_json::json!({ "error": truncate_str(error, 500) })),
            )),

            // L3: per node
            EngineEvent::NodeStarted { node_id, .. } if self.level >= 3 => {
                Some(entry("node_started", Some(node_id), None))
            }
            EngineEvent::NodeCompleted {
                node_id,
                generation_time_ms,
                ..
            } if self.level >= 3 => Some(entry(
                "node_completed",
                Some(node_id),
                Some(serde_json::json!({ "generation_time_ms": generation_time_ms })),
            )),

            _ => None,
        }
    }
}

/// Truncate a string for logging on a char boundary.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid() -> RunId {
        RunId::from_string("run-1")
    }

    #[test]
    fn test_jsonl_entry_omits_empty_fields() {
        let logger = RunLogger::new(PathBuf::from("/tmp"), 1);
        let entry = logger
            .event_to_entry(&rid(), &EngineEvent::RunCancelled { run_id: rid() })
            .unwrap();
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("run_cancelled"));
        assert!(json.contains("run-1"));
        assert!(!json.contains("node_id"));
        assert!(!json.contains("detail"));
    }

    #[test]
    fn test_event_level_filtering() {
        let layer = EngineEvent::LayerStarted {
            run_id: rid(),
            index: 0,
            node_ids: vec!["a".into()],
        };
        let node = EngineEvent::NodeCompleted {
            run_id: rid(),
            node_id: "a".into(),
            generation_time_ms: 3,
        };
        let done = EngineEvent::RunCompleted {
            run_id: rid(),
            elapsed_ms: 9,
        };

        let l1 = RunLogger::new(PathBuf::from("/tmp"), 1);
        assert!(l1.event_to_entry(&rid(), &done).is_some());
        assert!(l1.event_to_entry(&rid(), &layer).is_none());
        assert!(l1.event_to_entry(&rid(), &node).is_none());

        let l2 = RunLogger::new(PathBuf::from("/tmp"), 2);
        assert!(l2.event_to_entry(&rid(), &layer).is_some());
        assert!(l2.event_to_entry(&rid(), &node).is_none());

        let l3 = RunLogger::new(PathBuf::from("/tmp"), 3);
        let entry = l3.event_to_entry(&rid(), &node).unwrap();
        assert_eq!(entry.node_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        assert_eq!(truncate_str("héllo", 2), "h");
        assert_eq!(truncate_str("abc", 10), "abc");
    }

    #[tokio::test]
    async fn test_logger_writes_one_run() {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::default());
        let handle = RunLogger::new(dir.path().to_path_buf(), 3).spawn(&bus, CancellationToken::new());

        bus.publish(EngineEvent::RunStarted {
            run_id: rid(),
            workflow_id: weft_core::types::WorkflowId::from_string("wf"),
            mode: weft_core::types::ExecutionMode::Full,
        });
        bus.publish(EngineEvent::NodeStarted {
            run_id: RunId::from_string("other-run"),
            node_id: "x".into(),
        });
        bus.publish(EngineEvent::NodeStarted {
            run_id: rid(),
            node_id: "a".into(),
        });
        bus.publish(EngineEvent::RunCompleted {
            run_id: rid(),
            elapsed_ms: 1,
        });
        handle.await.unwrap();

        let run_dir = dir.path().join("run-1");
        let file = std::fs::read_dir(&run_dir).unwrap().next().unwrap().unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("run_started"));
        assert!(lines[1].contains("node_started"));
        assert!(lines[2].contains("run_completed"));
    }
}
