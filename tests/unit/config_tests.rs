//! Unit tests for configuration loading and environment overrides.
//!
//! Tests that touch process environment variables are `#[serial]` so they do
//! not race each other.

use std::io::Write as _;
use std::time::Duration;

use serial_test::serial;

use cody_agent::config::{
    AgentConfig, DEFAULT_SERVER_ENDPOINT, DEFAULT_SERVER_NAME, ENV_ACCESS_TOKEN, ENV_ENDPOINT,
    ENV_REQUEST_TIMEOUT,
};
use cody_agent::AppError;

fn clear_env() {
    std::env::remove_var(ENV_ACCESS_TOKEN);
    std::env::remove_var(ENV_ENDPOINT);
    std::env::remove_var(ENV_REQUEST_TIMEOUT);
}

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

// ── Parsing ──────────────────────────────────────────────────────────────────

#[test]
fn empty_toml_yields_defaults() {
    let config = AgentConfig::from_toml_str("").expect("parses");
    assert_eq!(config.server_endpoint, DEFAULT_SERVER_ENDPOINT);
    assert_eq!(config.server_name, DEFAULT_SERVER_NAME);
    assert_eq!(config.request_timeout(), None);
    assert!(config.custom_headers.is_empty());
}

#[test]
fn full_toml_is_parsed() {
    let config = AgentConfig::from_toml_str(
        r#"
access_token = "sgp_file"
server_endpoint = "https://sourcegraph.example.com"
request_timeout_seconds = 30
server_name = "custom-agent"

[custom_headers]
X-Requested-With = "cody-agent"
"#,
    )
    .expect("parses");

    assert_eq!(config.access_token, "sgp_file");
    assert_eq!(config.server_endpoint, "https://sourcegraph.example.com");
    assert_eq!(config.request_timeout(), Some(Duration::from_secs(30)));
    assert_eq!(config.server_name, "custom-agent");
    assert_eq!(
        config.custom_headers.get("X-Requested-With").map(String::as_str),
        Some("cody-agent")
    );
}

#[test]
fn invalid_toml_is_config_error() {
    let err = AgentConfig::from_toml_str("access_token = ").expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

// ── Validation ───────────────────────────────────────────────────────────────

#[test]
fn missing_token_fails_validation() {
    let mut config = AgentConfig::default();
    let err = config.validate().expect_err("must fail");
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains(ENV_ACCESS_TOKEN)));
}

#[test]
fn non_http_endpoint_fails_validation() {
    let mut config = AgentConfig {
        access_token: "t".into(),
        server_endpoint: "ftp://example.com".into(),
        ..AgentConfig::default()
    };
    assert!(matches!(config.validate(), Err(AppError::Config(_))));

    config.server_endpoint = "not a url".into();
    assert!(matches!(config.validate(), Err(AppError::Config(_))));
}

#[test]
fn workspace_root_is_canonicalised() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = AgentConfig {
        access_token: "t".into(),
        workspace_root: Some(dir.path().join(".")),
        ..AgentConfig::default()
    };
    config.validate().expect("valid");

    let expected = dir.path().canonicalize().expect("canonical");
    assert_eq!(config.workspace_root.as_deref(), Some(expected.as_path()));
    assert_eq!(
        config.static_editor().workspace_root,
        Some(expected.to_string_lossy().into_owned())
    );
}

#[test]
fn missing_workspace_root_fails_validation() {
    let dir = tempfile::tempdir().expect("temp dir");
    let mut config = AgentConfig {
        access_token: "t".into(),
        workspace_root: Some(dir.path().join("does-not-exist")),
        ..AgentConfig::default()
    };
    assert!(matches!(config.validate(), Err(AppError::Config(_))));
}

// ── Environment precedence ───────────────────────────────────────────────────

#[test]
#[serial]
fn environment_overrides_file() {
    clear_env();
    let file = write_config(
        r#"
access_token = "from-file"
server_endpoint = "https://file.example.com"
request_timeout_seconds = 5
"#,
    );
    std::env::set_var(ENV_ACCESS_TOKEN, "from-env");
    std::env::set_var(ENV_ENDPOINT, "https://env.example.com");

    let config = AgentConfig::load(Some(file.path())).expect("loads");
    clear_env();

    assert_eq!(config.access_token, "from-env");
    assert_eq!(config.server_endpoint, "https://env.example.com");
    assert_eq!(config.request_timeout_seconds, 5);
}

#[test]
#[serial]
fn token_from_environment_alone_is_enough() {
    clear_env();
    std::env::set_var(ENV_ACCESS_TOKEN, "sgp_env");

    let config = AgentConfig::load(None).expect("loads");
    clear_env();

    assert_eq!(config.access_token, "sgp_env");
    assert_eq!(config.server_endpoint, DEFAULT_SERVER_ENDPOINT);
}

#[test]
#[serial]
fn missing_token_everywhere_is_startup_error() {
    clear_env();
    let err = AgentConfig::load(None).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
#[serial]
fn malformed_timeout_variable_is_config_error() {
    clear_env();
    std::env::set_var(ENV_ACCESS_TOKEN, "t");
    std::env::set_var(ENV_REQUEST_TIMEOUT, "soon");

    let err = AgentConfig::load(None).expect_err("must fail");
    clear_env();

    assert!(matches!(err, AppError::Config(ref msg) if msg.contains(ENV_REQUEST_TIMEOUT)));
}

#[test]
#[serial]
fn unreadable_config_file_is_config_error() {
    clear_env();
    let dir = tempfile::tempdir().expect("temp dir");
    let err = AgentConfig::load(Some(&dir.path().join("missing.toml"))).expect_err("must fail");
    assert!(matches!(err, AppError::Config(_)));
}
