//! 에러 타입 -- 도메인별 에러 정의

/// befw 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BefwError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 패킷 필터 엔진 에러
    #[error("filter error: {0}")]
    Filter(#[from] FilterError),

    /// 컨트롤 플레인 통신 에러
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 패킷 필터 엔진 에러
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// 엔진 명령 실패 (iptables 호출 오류 등)
    #[error("engine command failed: {0}")]
    Engine(String),

    /// 엔진에 반영할 수 없는 규칙
    #[error("invalid rule '{rule_id}': {reason}")]
    InvalidRule { rule_id: String, reason: String },

    /// 카운터 수와 규칙 수 불일치
    #[error("counter count mismatch: expected {expected}, got {actual}")]
    CounterMismatch { expected: usize, actual: usize },
}

/// 컨트롤 플레인 통신 에러
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// 요청 전송 실패 (연결, 타임아웃)
    #[error("request failed: {0}")]
    Request(String),

    /// 200 이외의 응답 상태
    #[error("unexpected status: {0}")]
    Status(u16),

    /// 응답 본문 디코딩 실패
    #[error("decode failed: {0}")]
    Decode(String),
}
