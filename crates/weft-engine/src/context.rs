use tokio_util::sync::CancellationToken;

use weft_core::types::{Preferences, UserId};

/// Per-call context threaded through every entry point.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    /// The invoking user; ownership is checked against this once per call.
    pub user_id: UserId,
    /// Personalization folded into aiAgent system prompts.
    pub preferences: Option<Preferences>,
    /// Checked before each layer of a full or partial run.
    pub cancel: Option<CancellationToken>,
}

impl ExecutionContext {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            preferences: None,
            cancel: None,
        }
    }

    pub fn with_preferences(mut self, preferences: Preferences) -> Self {
        self.preferences = Some(preferences);
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }
}
