use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, WeftError};
use crate::types::Preferences;

/// Top-level Weft configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub log: Option<LogConfig>,
    #[serde(default)]
    pub preferences: Option<Preferences>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// SQLite database path. Default: <workspace>/weft.db
    #[serde(default)]
    pub database: Option<String>,
    /// The invoking user for CLI commands.
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workspace: default_workspace(),
            database: None,
            user_id: default_user_id(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_workspace() -> String { "~/.weft".to_string() }
fn default_user_id() -> String { "local".to_string() }
fn default_event_capacity() -> usize { 256 }

/// Chat-completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_chat_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            api_key: None,
            timeout_secs: default_chat_timeout(),
            extra_headers: HashMap::new(),
        }
    }
}

/// Image-generation provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub extra_headers: HashMap<String, String>,
    /// Model id -> maximum number of input images.
    #[serde(default)]
    pub input_limits: HashMap<String, usize>,
    #[serde(default = "default_input_limit")]
    pub default_input_limit: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            base_url: None,
            api_key: None,
            timeout_secs: default_image_timeout(),
            extra_headers: HashMap::new(),
            input_limits: HashMap::new(),
            default_input_limit: default_input_limit(),
        }
    }
}

impl ImageConfig {
    pub fn input_limit(&self, model: &str) -> usize {
        self.input_limits
            .get(model)
            .copied()
            .unwrap_or(self.default_input_limit)
    }
}

fn default_provider() -> String { "openrouter".to_string() }
fn default_chat_timeout() -> u64 { 120 }
fn default_image_timeout() -> u64 { 300 }
fn default_input_limit() -> usize { 3 }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Enable run logging (default: true when section is present).
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// Directory for log files. Default: <workspace>/logs
    #[serde(default)]
    pub log_dir: Option<String>,
    /// 1 = run summary only, 2 = per layer, 3 = per node (default: 2).
    #[serde(default = "default_log_level")]
    pub level: u8,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_dir: None,
            level: 2,
        }
    }
}

fn default_log_enabled() -> bool { true }
fn default_log_level() -> u8 { 2 }

impl AppConfig {
    /// Load config from a TOML file, with env var expansion.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| WeftError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| WeftError::Config(e.to_string()))
    }

    /// Resolve the workspace directory (expand ~).
    pub fn workspace_dir(&self) -> PathBuf {
        expand_home(&self.engine.workspace)
    }

    /// Resolve the SQLite database path.
    pub fn database_path(&self) -> PathBuf {
        match &self.engine.database {
            Some(db) => expand_home(db),
            None => self.workspace_dir().join("weft.db"),
        }
    }

    /// Resolve the run-log directory.
    pub fn log_dir(&self) -> PathBuf {
        match self.log.as_ref().and_then(|l| l.log_dir.as_deref()) {
            Some(dir) => expand_home(dir),
            None => self.workspace_dir().join("logs"),
        }
    }
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_home() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                // Unset variables stay verbatim
                Err(_) => result.push_str(&format!("${{{}}}", var_name)),
            }
        } else {
            result.push(c);
        }
    }
    result
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_env_vars() {
        std::env::set_var("TEST_WEFT_VAR", "hello");
        let result = expand_env_vars("key = \"${TEST_WEFT_VAR}\"");
        assert_eq!(result, "key = \"hello\"");
        std::env::remove_var("TEST_WEFT_VAR");
    }

    #[test]
    fn test_expand_env_vars_missing() {
        let result = expand_env_vars("key = \"${NONEXISTENT_WEFT_VAR}\"");
        assert_eq!(result, "key = \"${NONEXISTENT_WEFT_VAR}\"");
    }

    #[test]
    fn test_defaults_from_empty_toml() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.workspace, "~/.weft");
        assert_eq!(config.engine.user_id, "local");
        assert_eq!(config.chat.provider, "openrouter");
        assert_eq!(config.image.default_input_limit, 3);
        assert!(config.log.is_none());
        assert!(config.preferences.is_none());
    }

    #[test]
    fn test_image_input_limits() {
        let toml_str = r#"
[image]
api_key = "sk-or-test"
default_input_limit = 2

[image.input_limits]
"google/gemini-2.5-flash-image" = 3
"black-forest-labs/flux" = 1
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.image.input_limit("black-forest-labs/flux"), 1);
        assert_eq!(config.image.input_limit("google/gemini-2.5-flash-image"), 3);
        assert_eq!(config.image.input_limit("unknown/model"), 2);
    }

    #[test]
    fn test_database_and_log_paths() {
        let toml_str = r#"
[engine]
workspace = "/srv/weft"

[log]
level = 3
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database_path(), PathBuf::from("/srv/weft/weft.db"));
        assert_eq!(config.log_dir(), PathBuf::from("/srv/weft/logs"));
        let log = config.log.unwrap();
        assert!(log.enabled);
        assert_eq!(log.level, 3);
    }

    #[test]
    fn test_preferences_section() {
        let toml_str = r#"
[preferences]
enabled = true
custom_instructions = "Keep answers short."

[preferences.user_info]
name = "Ada"
expertise_level = "expert"

[preferences.behavior]
tone = "casual"
"#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        let prefs = config.preferences.unwrap();
        assert!(prefs.enabled);
        assert_eq!(prefs.user_info.expertise_level.as_deref(), Some("expert"));
        assert_eq!(prefs.behavior.tone.as_deref(), Some("casual"));
    }
}
