use std::io::Write;

use weft_core::config::AppConfig;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
workspace = "/tmp/weft-test"
user_id = "alice"
event_capacity = 64

[chat]
provider = "openrouter"
api_key = "sk-chat"
timeout_secs = 30

[image]
provider = "openai"
base_url = "http://localhost:9000/v1"
api_key = "sk-image"
default_input_limit = 2

[image.input_limits]
"google/gemini-2.5-flash-image" = 3

[image.extra_headers]
X-Team = "render"

[log]
level = 3

[preferences]
enabled = true
custom_instructions = "Keep it short"

[preferences.behavior]
tone = "friendly"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.user_id, "alice");
    assert_eq!(config.engine.event_capacity, 64);
    assert_eq!(config.database_path().to_str(), Some("/tmp/weft-test/weft.db"));
    assert_eq!(config.log_dir().to_str(), Some("/tmp/weft-test/logs"));

    assert_eq!(config.chat.provider, "openrouter");
    assert_eq!(config.chat.api_key.as_deref(), Some("sk-chat"));
    assert_eq!(config.chat.timeout_secs, 30);

    assert_eq!(config.image.base_url.as_deref(), Some("http://localhost:9000/v1"));
    assert_eq!(config.image.input_limit("google/gemini-2.5-flash-image"), 3);
    assert_eq!(config.image.input_limit("other"), 2);
    assert_eq!(config.image.extra_headers.get("X-Team").map(String::as_str), Some("render"));

    let log = config.log.expect("log present");
    assert!(log.enabled);
    assert_eq!(log.level, 3);

    let prefs = config.preferences.expect("preferences present");
    let block = prefs.prompt_block().expect("non-empty block");
    assert!(block.contains("- Tone: friendly"));
    assert!(block.contains("- Custom instructions: Keep it short"));
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("WEFT_TEST_IMAGE_KEY", "expanded-key-value");

    let toml_content = r#"
[image]
api_key = "${WEFT_TEST_IMAGE_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.image.api_key.as_deref(), Some("expanded-key-value"));

    std::env::remove_var("WEFT_TEST_IMAGE_KEY");
}

#[test]
fn test_empty_config_uses_defaults() {
    let tmp = tempfile::NamedTempFile::new().expect("create temp file");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.engine.user_id, "local");
    assert_eq!(config.chat.provider, "openrouter");
    assert_eq!(config.chat.timeout_secs, 120);
    assert_eq!(config.image.timeout_secs, 300);
    assert_eq!(config.image.input_limit("anything"), 3);
    assert!(config.log.is_none());
    assert!(config.preferences.is_none());
}

#[test]
fn test_missing_config_file_is_reported() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/weft.toml")).unwrap_err();
    assert!(matches!(err, weft_core::error::WeftError::ConfigNotFound(_)));
}

#[test]
fn test_malformed_config_is_rejected() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"[engine\nuser_id = ").expect("write toml");

    let err = AppConfig::load(tmp.path()).unwrap_err();
    assert!(matches!(err, weft_core::error::WeftError::Config(_)));
}
