//! 파이프라인 trait -- 장기 실행 컴포넌트의 생명주기 정의
//!
//! 데몬은 [`Pipeline`]을 구현한 컴포넌트를 start → (health_check)* → stop 순서로 관리합니다.

use std::fmt;
use std::future::Future;

use crate::error::BefwError;

/// 컴포넌트 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// 정상
    Healthy,
    /// 동작 중이지만 최근 작업이 실패함
    Degraded(String),
    /// 동작하지 않음
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded(reason) => write!(f, "degraded: {reason}"),
            Self::Unhealthy(reason) => write!(f, "unhealthy: {reason}"),
        }
    }
}

/// 생명주기를 가진 파이프라인
///
/// `start`는 백그라운드 태스크를 띄우고 바로 반환해야 합니다.
/// `stop`은 태스크가 종료될 때까지 기다립니다.
pub trait Pipeline: Send {
    /// 파이프라인을 시작합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), BefwError>> + Send;

    /// 파이프라인을 정지합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), BefwError>> + Send;

    /// 현재 상태를 보고합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}
