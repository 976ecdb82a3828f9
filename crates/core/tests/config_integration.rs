//! befw.toml 통합 설정 테스트
//!
//! - befw.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use befw_core::config::BefwConfig;
use befw_core::error::{BefwError, ConfigError};

// =============================================================================
// befw.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_and_validates() {
    let content = include_str!("../../../befw.toml.example");
    let config = BefwConfig::parse(content).expect("example config should parse");
    config
        .validate()
        .expect("example config should pass validation");

    assert_eq!(config.agent.tenant, "edge-01");
    assert_eq!(config.general.pid_file, "/var/run/befw/befw.pid");
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../befw.toml.example");
    let example = BefwConfig::parse(content).expect("should parse");
    let defaults = BefwConfig::default();

    assert_eq!(example.general.log_level, defaults.general.log_level);
    assert_eq!(example.general.log_format, defaults.general.log_format);
    assert_eq!(example.agent.server_url, defaults.agent.server_url);
    assert_eq!(example.agent.table, defaults.agent.table);
    assert_eq!(
        example.agent.poll_interval_secs,
        defaults.agent.poll_interval_secs
    );
    assert_eq!(
        example.agent.report_interval_secs,
        defaults.agent.report_interval_secs
    );
    assert_eq!(
        example.agent.compress_requests,
        defaults.agent.compress_requests
    );
    assert_eq!(
        example.telemetry.queue_capacity,
        defaults.telemetry.queue_capacity
    );
    assert_eq!(
        example.telemetry.sender_workers,
        defaults.telemetry.sender_workers
    );
    assert_eq!(example.metrics.port, defaults.metrics.port);
    assert_eq!(example.metrics.endpoint, defaults.metrics.endpoint);
}

// =============================================================================
// 부분 설정 테스트
// =============================================================================

#[test]
fn partial_config_telemetry_only() {
    let config = BefwConfig::parse(
        r#"
[telemetry]
queue_capacity = 8
"#,
    )
    .expect("should parse");
    assert_eq!(config.telemetry.queue_capacity, 8);
    assert_eq!(config.telemetry.sender_workers, 3);
    assert!(config.telemetry.enabled);
    assert_eq!(config.agent.poll_interval_secs, 30);
}

#[test]
fn unknown_section_is_ignored() {
    let config = BefwConfig::parse(
        r#"
[agent]
tenant = "t"

[future_section]
key = "value"
"#,
    )
    .expect("unknown sections should be ignored");
    assert_eq!(config.agent.tenant, "t");
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let mut config = BefwConfig::parse(
        r#"
[agent]
tenant = "from-file"
poll_interval_secs = 30
"#,
    )
    .expect("should parse");

    // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("BEFW_AGENT_TENANT", "from-env");
        std::env::set_var("BEFW_AGENT_POLL_INTERVAL_SECS", "7");
    }
    config.apply_env_overrides();
    unsafe {
        std::env::remove_var("BEFW_AGENT_TENANT");
        std::env::remove_var("BEFW_AGENT_POLL_INTERVAL_SECS");
    }

    assert_eq!(config.agent.tenant, "from-env");
    assert_eq!(config.agent.poll_interval_secs, 7);
}

#[test]
#[serial_test::serial]
fn env_override_bool_and_port() {
    let mut config = BefwConfig::default();
    // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("BEFW_AGENT_COMPRESS_REQUESTS", "false");
        std::env::set_var("BEFW_METRICS_PORT", "9300");
    }
    config.apply_env_overrides();
    unsafe {
        std::env::remove_var("BEFW_AGENT_COMPRESS_REQUESTS");
        std::env::remove_var("BEFW_METRICS_PORT");
    }

    assert!(!config.agent.compress_requests);
    assert_eq!(config.metrics.port, 9300);
}

#[test]
#[serial_test::serial]
fn env_override_invalid_number_keeps_toml_value() {
    let mut config = BefwConfig::parse("[telemetry]\nsender_workers = 5").expect("should parse");
    // SAFETY: serial 테스트로 실행되므로 환경변수 조작이 안전합니다.
    unsafe { std::env::set_var("BEFW_TELEMETRY_SENDER_WORKERS", "many") };
    config.apply_env_overrides();
    unsafe { std::env::remove_var("BEFW_TELEMETRY_SENDER_WORKERS") };

    assert_eq!(config.telemetry.sender_workers, 5);
}

// =============================================================================
// 에러 케이스
// =============================================================================

#[test]
fn comments_only_parses_with_defaults() {
    let config = BefwConfig::parse("# nothing here\n# still nothing\n").expect("should parse");
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn wrong_type_for_numeric_field() {
    let err = BefwConfig::parse("[agent]\npoll_interval_secs = \"soon\"").unwrap_err();
    assert!(matches!(
        err,
        BefwError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let err = BefwConfig::from_file("/nonexistent/befw.toml")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BefwError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
#[serial_test::serial]
async fn load_config_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("befw.toml");
    tokio::fs::write(&path, "[agent]\ntenant = \"disk\"\ntable = \"nat\"\n")
        .await
        .expect("write config");

    let config = BefwConfig::load(&path).await.expect("should load");
    assert_eq!(config.agent.tenant, "disk");
    assert_eq!(config.agent.table, "nat");
}

#[tokio::test]
#[serial_test::serial]
async fn load_rejects_missing_tenant() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("befw.toml");
    tokio::fs::write(&path, "[general]\nlog_level = \"debug\"\n")
        .await
        .expect("write config");

    let err = BefwConfig::load(&path).await.unwrap_err();
    assert!(err.to_string().contains("agent.tenant"));
}
