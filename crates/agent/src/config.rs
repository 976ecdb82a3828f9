//! 에이전트 설정
//!
//! [`AgentConfig`]는 core의 [`BefwConfig`](befw_core::config::BefwConfig)에서
//! 에이전트가 쓰는 값만 모으고, 종료 유예 시간 같은 내부 설정을 더합니다.
//!
//! # 사용 예시
//! ```ignore
//! use befw_core::config::BefwConfig;
//! use befw_agent::config::AgentConfig;
//!
//! let core_config = BefwConfig::default();
//! let config = AgentConfig::from_core(&core_config);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use befw_core::config::{BefwConfig, MAX_INTERVAL_SECS, MAX_QUEUE_CAPACITY, MAX_SENDER_WORKERS};

use crate::error::AgentError;

/// 종료 유예 시간 상한 (초)
const MAX_SHUTDOWN_GRACE_SECS: u64 = 300;

/// 에이전트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// 테넌트
    pub tenant: String,
    /// 컨트롤 플레인 API 기본 URL
    pub server_url: String,
    /// 관리 대상 테이블
    pub table: String,
    /// 정책 조회 주기 (초), 조회 요청 타임아웃으로도 사용
    pub poll_interval_secs: u64,
    /// 카운터 보고 주기 (초), 보고 요청 타임아웃으로도 사용
    pub report_interval_secs: u64,
    /// 요청 본문 gzip 압축
    pub compress_requests: bool,
    /// 카운터 보고 활성화
    pub telemetry_enabled: bool,
    /// 보고 큐 용량
    pub queue_capacity: usize,
    /// 전송 워커 수
    pub sender_workers: usize,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 정지 시 큐에 남은 보고를 전송할 유예 시간 (초)
    pub shutdown_grace_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            tenant: String::new(),
            server_url: "http://127.0.0.1:8080/api/v1".to_owned(),
            table: "filter".to_owned(),
            poll_interval_secs: 30,
            report_interval_secs: 10,
            compress_requests: true,
            telemetry_enabled: true,
            queue_capacity: 50,
            sender_workers: 3,
            shutdown_grace_secs: 5,
        }
    }
}

impl AgentConfig {
    /// core 설정에서 에이전트 설정을 생성합니다.
    pub fn from_core(core: &BefwConfig) -> Self {
        Self {
            tenant: core.agent.tenant.clone(),
            server_url: core.agent.server_url.clone(),
            table: core.agent.table.clone(),
            poll_interval_secs: core.agent.poll_interval_secs,
            report_interval_secs: core.agent.report_interval_secs,
            compress_requests: core.agent.compress_requests,
            telemetry_enabled: core.telemetry.enabled,
            queue_capacity: core.telemetry.queue_capacity,
            sender_workers: core.telemetry.sender_workers,
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.tenant.trim().is_empty() {
            return Err(config_error("tenant", "must not be empty".to_owned()));
        }
        if self.table.is_empty() {
            return Err(config_error("table", "must not be empty".to_owned()));
        }
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(config_error(
                "server_url",
                "must start with http:// or https://".to_owned(),
            ));
        }
        if self.poll_interval_secs == 0 || self.poll_interval_secs > MAX_INTERVAL_SECS {
            return Err(config_error(
                "poll_interval_secs",
                format!("must be 1-{MAX_INTERVAL_SECS}"),
            ));
        }
        if self.report_interval_secs == 0 || self.report_interval_secs > MAX_INTERVAL_SECS {
            return Err(config_error(
                "report_interval_secs",
                format!("must be 1-{MAX_INTERVAL_SECS}"),
            ));
        }
        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(config_error(
                "queue_capacity",
                format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            ));
        }
        if self.sender_workers == 0 || self.sender_workers > MAX_SENDER_WORKERS {
            return Err(config_error(
                "sender_workers",
                format!("must be 1-{MAX_SENDER_WORKERS}"),
            ));
        }
        if self.shutdown_grace_secs > MAX_SHUTDOWN_GRACE_SECS {
            return Err(config_error(
                "shutdown_grace_secs",
                format!("must be 0-{MAX_SHUTDOWN_GRACE_SECS}"),
            ));
        }
        Ok(())
    }
}

fn config_error(field: &str, reason: String) -> AgentError {
    AgentError::Config {
        field: field.to_owned(),
        reason,
    }
}

/// 에이전트 설정 빌더
#[derive(Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 테넌트를 설정합니다.
    pub fn tenant(mut self, tenant: impl Into<String>) -> Self {
        self.config.tenant = tenant.into();
        self
    }

    /// 컨트롤 플레인 URL을 설정합니다.
    pub fn server_url(mut self, url: impl Into<String>) -> Self {
        self.config.server_url = url.into();
        self
    }

    /// 관리 대상 테이블을 설정합니다.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.config.table = table.into();
        self
    }

    /// 정책 조회 주기(초)를 설정합니다.
    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.poll_interval_secs = secs;
        self
    }

    /// 카운터 보고 주기(초)를 설정합니다.
    pub fn report_interval_secs(mut self, secs: u64) -> Self {
        self.config.report_interval_secs = secs;
        self
    }

    /// 요청 압축 여부를 설정합니다.
    pub fn compress_requests(mut self, compress: bool) -> Self {
        self.config.compress_requests = compress;
        self
    }

    /// 카운터 보고 활성화 여부를 설정합니다.
    pub fn telemetry_enabled(mut self, enabled: bool) -> Self {
        self.config.telemetry_enabled = enabled;
        self
    }

    /// 보고 큐 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 전송 워커 수를 설정합니다.
    pub fn sender_workers(mut self, workers: usize) -> Self {
        self.config.sender_workers = workers;
        self
    }

    /// 종료 유예 시간(초)을 설정합니다.
    pub fn shutdown_grace_secs(mut self, secs: u64) -> Self {
        self.config.shutdown_grace_secs = secs;
        self
    }

    /// 설정을 검증하고 `AgentConfig`를 생성합니다.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
