//! befw 엣지 에이전트
//!
//! 컨트롤 플레인에서 테넌트 정책을 주기적으로 받아 라이브 필터에 반영하고,
//! 규칙별 카운터를 수집해 다시 보고합니다.
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 (`AgentError`)
//! - [`config`]: 에이전트 설정 (`AgentConfig`, `AgentConfigBuilder`)
//! - [`client`]: 컨트롤 플레인 trait과 HTTP 구현 (`ControlPlane`, `HttpControlPlane`)
//! - [`snapshot`]: 공유 정책 스냅샷 (`SharedSnapshot`)
//! - [`reconcile`]: 조회/반영 루프 (`Reconciler`)
//! - [`telemetry`]: 카운터 보고 파이프라인 (`TelemetryProducer`, `spawn_senders`)
//! - [`agent`]: 생명주기 관리 (`FirewallAgent`, `FirewallAgentBuilder`)

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod reconcile;
pub mod snapshot;
pub mod telemetry;

pub use agent::{FirewallAgent, FirewallAgentBuilder};
pub use client::{ControlPlane, HttpControlPlane};
pub use config::{AgentConfig, AgentConfigBuilder};
pub use error::AgentError;
pub use reconcile::{ReconcileStats, Reconciler};
pub use snapshot::{PolicySnapshot, SharedSnapshot};
pub use telemetry::{CycleOutcome, DeltaTracker, TelemetryProducer, TelemetryStats, spawn_senders};
