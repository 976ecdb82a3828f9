//! 에이전트 에러 타입
//!
//! [`AgentError`]는 컨트롤 플레인 통신, 필터 반영, 생명주기 관리 중 발생하는 에러를 표현합니다.
//! `From<AgentError> for BefwError` 변환이 구현되어 있습니다.

use befw_core::error::{BefwError, ConfigError, PipelineError, TransportError};
use befw_filter_engine::FilterEngineError;

/// 에이전트 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// 요청 전송 실패 (연결, 타임아웃)
    #[error("request failed: {0}")]
    Request(String),

    /// 200 이외의 응답 상태
    #[error("unexpected status: {0}")]
    Status(u16),

    /// 요청 본문 인코딩 실패
    #[error("encode failed: {0}")]
    Encode(String),

    /// 응답 본문 디코딩 실패
    #[error("decode failed: {0}")]
    Decode(String),

    /// 필터 엔진 에러
    #[error(transparent)]
    Filter(#[from] FilterEngineError),

    /// 일부 규칙을 반영하지 못함
    #[error("{rejected} rule(s) could not be applied")]
    Incomplete {
        /// 건너뛴 규칙 수
        rejected: usize,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 블로킹 작업 실패 (패닉, 취소)
    #[error("task failed: {0}")]
    Task(String),
}

impl From<AgentError> for BefwError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Request(msg) => BefwError::Transport(TransportError::Request(msg)),
            AgentError::Status(code) => BefwError::Transport(TransportError::Status(code)),
            AgentError::Encode(msg) | AgentError::Decode(msg) => {
                BefwError::Transport(TransportError::Decode(msg))
            }
            AgentError::Filter(e) => e.into(),
            AgentError::Config { field, reason } => {
                BefwError::Config(ConfigError::InvalidValue { field, reason })
            }
            other @ (AgentError::Incomplete { .. } | AgentError::Task(_)) => {
                BefwError::Pipeline(PipelineError::InitFailed(other.to_string()))
            }
        }
    }
}
