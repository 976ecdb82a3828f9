//! 설정 관리 -- befw.toml 파싱 및 런타임 설정
//!
//! [`BefwConfig`]는 에이전트와 데몬이 사용하는 모든 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BEFW_AGENT_TENANT=edge-01` 형식)
//! 3. 설정 파일 (`befw.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), befw_core::error::BefwError> {
//! use befw_core::config::BefwConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드 + 검증
//! let config = BefwConfig::load("befw.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BefwConfig::parse("[agent]\ntenant = \"edge-01\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BefwError, ConfigError};

/// 주기(초) 최대값
pub const MAX_INTERVAL_SECS: u64 = 3600;

/// 텔레메트리 큐 최대 용량
pub const MAX_QUEUE_CAPACITY: usize = 10_000;

/// 전송 워커 최대 수
pub const MAX_SENDER_WORKERS: usize = 64;

/// 지원하는 iptables 테이블
pub const VALID_TABLES: &[&str] = &["filter", "nat", "mangle", "raw", "security"];

/// befw 통합 설정
///
/// `befw.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BefwConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 에이전트 설정 (컨트롤 플레인, 주기)
    #[serde(default)]
    pub agent: AgentSection,
    /// 텔레메트리 큐/워커 설정
    #[serde(default)]
    pub telemetry: TelemetrySection,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl BefwConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BefwError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    ///
    /// 테넌트처럼 CLI 인자로만 주어질 수 있는 값이 있으므로
    /// 검증은 호출자가 모든 오버라이드를 적용한 뒤 수행합니다.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BefwError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BefwError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BefwError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BefwError> {
        toml::from_str(toml_str).map_err(|e| {
            BefwError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BEFW_{SECTION}_{FIELD}`
    /// 예: `BEFW_AGENT_SERVER_URL=http://10.0.0.1:8080/api/v1`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BEFW_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BEFW_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "BEFW_GENERAL_PID_FILE");

        // Agent
        override_string(&mut self.agent.tenant, "BEFW_AGENT_TENANT");
        override_string(&mut self.agent.server_url, "BEFW_AGENT_SERVER_URL");
        override_string(&mut self.agent.table, "BEFW_AGENT_TABLE");
        override_u64(
            &mut self.agent.poll_interval_secs,
            "BEFW_AGENT_POLL_INTERVAL_SECS",
        );
        override_u64(
            &mut self.agent.report_interval_secs,
            "BEFW_AGENT_REPORT_INTERVAL_SECS",
        );
        override_bool(
            &mut self.agent.compress_requests,
            "BEFW_AGENT_COMPRESS_REQUESTS",
        );

        // Telemetry
        override_bool(&mut self.telemetry.enabled, "BEFW_TELEMETRY_ENABLED");
        override_usize(
            &mut self.telemetry.queue_capacity,
            "BEFW_TELEMETRY_QUEUE_CAPACITY",
        );
        override_usize(
            &mut self.telemetry.sender_workers,
            "BEFW_TELEMETRY_SENDER_WORKERS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "BEFW_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "BEFW_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "BEFW_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "BEFW_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BefwError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.agent.tenant.trim().is_empty() {
            return Err(invalid("agent.tenant", "tenant must not be empty".to_owned()));
        }

        if !(self.agent.server_url.starts_with("http://")
            || self.agent.server_url.starts_with("https://"))
        {
            return Err(invalid(
                "agent.server_url",
                "must start with http:// or https://".to_owned(),
            ));
        }

        if !VALID_TABLES.contains(&self.agent.table.as_str()) {
            return Err(invalid(
                "agent.table",
                format!("must be one of: {}", VALID_TABLES.join(", ")),
            ));
        }

        check_interval("agent.poll_interval_secs", self.agent.poll_interval_secs)?;
        check_interval("agent.report_interval_secs", self.agent.report_interval_secs)?;

        if self.telemetry.queue_capacity == 0 || self.telemetry.queue_capacity > MAX_QUEUE_CAPACITY
        {
            return Err(invalid(
                "telemetry.queue_capacity",
                format!("must be between 1 and {MAX_QUEUE_CAPACITY}"),
            ));
        }

        if self.telemetry.sender_workers == 0 || self.telemetry.sender_workers > MAX_SENDER_WORKERS
        {
            return Err(invalid(
                "telemetry.sender_workers",
                format!("must be between 1 and {MAX_SENDER_WORKERS}"),
            ));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(invalid(
                    "metrics.port",
                    "port must not be 0 when metrics are enabled".to_owned(),
                ));
            }
            if !self.metrics.endpoint.starts_with('/') {
                return Err(invalid(
                    "metrics.endpoint",
                    "endpoint must start with '/'".to_owned(),
                ));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> BefwError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

fn check_interval(field: &str, secs: u64) -> Result<(), BefwError> {
    if secs == 0 || secs > MAX_INTERVAL_SECS {
        return Err(invalid(
            field,
            format!("must be between 1 and {MAX_INTERVAL_SECS} seconds"),
        ));
    }
    Ok(())
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pid_file: "/var/run/befw/befw.pid".to_owned(),
        }
    }
}

/// 에이전트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 이 에이전트가 속한 테넌트 (필수)
    pub tenant: String,
    /// 컨트롤 플레인 API 기본 URL
    pub server_url: String,
    /// 관리 대상 iptables 테이블
    pub table: String,
    /// 정책 조회 주기 (초)
    pub poll_interval_secs: u64,
    /// 카운터 수집/보고 주기 (초)
    pub report_interval_secs: u64,
    /// 요청 본문 gzip 압축 여부
    pub compress_requests: bool,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            tenant: String::new(),
            server_url: "http://127.0.0.1:8080/api/v1".to_owned(),
            table: "filter".to_owned(),
            poll_interval_secs: 30,
            report_interval_secs: 10,
            compress_requests: true,
        }
    }
}

/// 텔레메트리 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// 카운터 보고 활성화 여부
    pub enabled: bool,
    /// 보고 큐 용량 (가득 차면 생산자가 대기)
    pub queue_capacity: usize,
    /// 전송 워커 수
    pub sender_workers: usize,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 50,
            sender_workers: 3,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 메트릭 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9107,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_tenant() -> BefwConfig {
        let mut config = BefwConfig::default();
        config.agent.tenant = "edge-01".to_owned();
        config
    }

    #[test]
    fn default_config_has_sane_values() {
        let config = BefwConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert!(config.agent.tenant.is_empty());
        assert_eq!(config.agent.table, "filter");
        assert_eq!(config.agent.poll_interval_secs, 30);
        assert_eq!(config.telemetry.queue_capacity, 50);
        assert_eq!(config.telemetry.sender_workers, 3);
        assert!(config.agent.compress_requests);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_requires_tenant() {
        let err = BefwConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("agent.tenant"));
        with_tenant().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = BefwConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.agent.server_url, "http://127.0.0.1:8080/api/v1");
    }

    #[test]
    fn from_str_partial_toml_merges_with_defaults() {
        let toml = r#"
[agent]
tenant = "branch-7"
poll_interval_secs = 5
"#;
        let config = BefwConfig::parse(toml).unwrap();
        assert_eq!(config.agent.tenant, "branch-7");
        assert_eq!(config.agent.poll_interval_secs, 5);
        // 나머지는 기본값 유지
        assert_eq!(config.agent.report_interval_secs, 10);
        assert_eq!(config.telemetry.queue_capacity, 50);
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = BefwConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            BefwError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = with_tenant();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_non_http_server_url() {
        let mut config = with_tenant();
        config.agent.server_url = "ftp://control".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server_url"));
    }

    #[test]
    fn validate_rejects_unknown_table() {
        let mut config = with_tenant();
        config.agent.table = "bridge".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("agent.table"));
    }

    #[test]
    fn validate_interval_bounds() {
        let mut config = with_tenant();
        config.agent.poll_interval_secs = 0;
        assert!(config.validate().is_err());

        config.agent.poll_interval_secs = MAX_INTERVAL_SECS;
        config.validate().unwrap();

        config.agent.report_interval_secs = MAX_INTERVAL_SECS + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("report_interval_secs"));
    }

    #[test]
    fn validate_queue_and_worker_bounds() {
        let mut config = with_tenant();
        config.telemetry.queue_capacity = 0;
        assert!(config.validate().is_err());

        config.telemetry.queue_capacity = 1;
        config.telemetry.sender_workers = MAX_SENDER_WORKERS + 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sender_workers"));
    }

    #[test]
    fn validate_metrics_only_when_enabled() {
        let mut config = with_tenant();
        config.metrics.port = 0;
        config.validate().unwrap();

        config.metrics.enabled = true;
        assert!(config.validate().is_err());

        config.metrics.port = 9107;
        config.metrics.endpoint = "metrics".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.endpoint"));
    }

    #[test]
    fn env_override_string() {
        let mut val = "original".to_owned();
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_BEFW_STR", "overridden") };
        override_string(&mut val, "TEST_BEFW_STR");
        assert_eq!(val, "overridden");
        unsafe { std::env::remove_var("TEST_BEFW_STR") };
    }

    #[test]
    fn env_override_bool_invalid_keeps_original() {
        let mut val = true;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_BEFW_BOOL_BAD", "yes please") };
        override_bool(&mut val, "TEST_BEFW_BOOL_BAD");
        assert!(val);
        unsafe { std::env::remove_var("TEST_BEFW_BOOL_BAD") };
    }

    #[test]
    fn env_override_u16_parses() {
        let mut val = 1u16;
        // SAFETY: 테스트는 단일 스레드에서 실행되므로 환경변수 조작이 안전합니다.
        unsafe { std::env::set_var("TEST_BEFW_U16", "9200") };
        override_u16(&mut val, "TEST_BEFW_U16");
        assert_eq!(val, 9200);
        unsafe { std::env::remove_var("TEST_BEFW_U16") };
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = 30u64;
        override_u64(&mut val, "TEST_BEFW_NONEXISTENT_12345");
        assert_eq!(val, 30);
    }

    #[test]
    fn config_serialize_roundtrip() {
        let config = with_tenant();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = BefwConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.agent.tenant, "edge-01");
        assert_eq!(parsed.telemetry.sender_workers, 3);
        assert_eq!(parsed.metrics.endpoint, "/metrics");
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = BefwConfig::from_file("/nonexistent/path/befw.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BefwError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
