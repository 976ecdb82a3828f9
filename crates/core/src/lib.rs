//! befw 공통 크레이트
//!
//! 에이전트, 필터 엔진, 데몬이 공유하는 도메인 타입, 에러, 설정,
//! 파이프라인 생명주기 trait, 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{BefwError, ConfigError, FilterError, PipelineError, TransportError};

// 설정
pub use config::BefwConfig;

// 파이프라인 trait
pub use pipeline::{HealthStatus, Pipeline};

// 도메인 타입
pub use types::{
    AddressList, ChainRef, PolicyDocument, Rule, RuleAction, RuleStat, StatsReport,
    distinct_chains,
};
