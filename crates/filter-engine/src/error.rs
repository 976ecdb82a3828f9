//! 필터 엔진 에러 타입
//!
//! [`FilterEngineError`]는 필터 엔진 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<FilterEngineError> for BefwError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use befw_core::error::{BefwError, FilterError};

/// 필터 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum FilterEngineError {
    /// 엔진 드라이버를 초기화할 수 없음 (iptables 바이너리 없음 등)
    #[error("filter engine unavailable: {0}")]
    Unavailable(String),

    /// 엔진 명령 실패
    #[error("{op} failed on {chain}: {reason}")]
    Command {
        /// 실패한 동작 (create-chain, clear-chain, append, insert, counters)
        op: &'static str,
        /// 대상 테이블/체인
        chain: String,
        /// 실패 사유
        reason: String,
    },

    /// 엔진에 반영할 수 없는 규칙
    #[error("invalid rule '{rule_id}': {reason}")]
    InvalidRule {
        /// 규칙 식별자
        rule_id: String,
        /// 사유
        reason: String,
    },

    /// 읽은 카운터 수가 규칙 수와 다름
    #[error("counter count mismatch: expected {expected}, got {actual}")]
    CounterMismatch {
        /// 스냅샷의 규칙 수
        expected: usize,
        /// 엔진에서 읽은 카운터 수
        actual: usize,
    },

    /// 카운터 목록 출력 파싱 실패
    #[error("failed to parse counters for {chain}: {reason}")]
    CounterParse {
        /// 대상 테이블/체인
        chain: String,
        /// 실패 사유
        reason: String,
    },
}

impl From<FilterEngineError> for BefwError {
    fn from(err: FilterEngineError) -> Self {
        match err {
            FilterEngineError::InvalidRule { rule_id, reason } => {
                BefwError::Filter(FilterError::InvalidRule { rule_id, reason })
            }
            FilterEngineError::CounterMismatch { expected, actual } => {
                BefwError::Filter(FilterError::CounterMismatch { expected, actual })
            }
            other => BefwError::Filter(FilterError::Engine(other.to_string())),
        }
    }
}
