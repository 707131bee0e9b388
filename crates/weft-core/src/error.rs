use thiserror::Error;

#[derive(Debug, Error)]
pub enum WeftError {
    // Entry-point errors
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized access to workflow {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Workflow contains cycles and cannot be executed ({placed} of {total} nodes placed)")]
    Cycle { placed: usize, total: usize },

    // Node errors
    #[error("Node {node_id} failed: {message}")]
    NodeExecution { node_id: String, message: String },

    // Provider errors
    #[error("Provider request failed: {0}")]
    Provider(String),

    #[error("Run cancelled")]
    Cancelled,

    // Config errors
    #[error("Config error: {0}")]
    Config(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(String),

    // Storage errors
    #[error("Database error: {0}")]
    Database(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WeftError {
    /// Errors that abort an entry point before or instead of node execution.
    pub fn is_entry_point(&self) -> bool {
        matches!(
            self,
            WeftError::NotFound(_)
                | WeftError::Unauthorized(_)
                | WeftError::Validation(_)
                | WeftError::Cycle { .. }
        )
    }

    pub fn node(node_id: impl Into<String>, message: impl Into<String>) -> Self {
        WeftError::NodeExecution {
            node_id: node_id.into(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, WeftError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_point_classification() {
        assert!(WeftError::NotFound("wf".into()).is_entry_point());
        assert!(WeftError::Unauthorized("wf".into()).is_entry_point());
        assert!(WeftError::Validation("no nodes".into()).is_entry_point());
        assert!(WeftError::Cycle { placed: 1, total: 3 }.is_entry_point());
        assert!(!WeftError::node("n1", "boom").is_entry_point());
        assert!(!WeftError::Provider("HTTP 500".into()).is_entry_point());
    }

    #[test]
    fn test_node_error_display() {
        let e = WeftError::node("gen-1", "provider said no");
        assert_eq!(e.to_string(), "Node gen-1 failed: provider said no");
    }
}
