//! befw 패킷 필터 엔진
//!
//! # Module Structure
//!
//! - [`error`]: 도메인 에러 (`FilterEngineError`)
//! - [`spec`]: 규칙 → 엔진 인자 토큰 변환 (`FilterSpec`)
//! - [`driver`]: 엔진 capability trait (`FilterDriver`), iptables 구현
//! - [`memory`]: 인메모리 드라이버 (`MemoryFilterDriver`)
//! - [`counters`]: 슬롯 카운터와 목록 출력 파싱
//! - [`apply`]: 2단계 규칙 반영 (`FilterApplier`)
//! - [`harvest`]: 위치 기반 카운터 대응 (`CounterHarvester`)
//!
//! # Architecture
//!
//! ```text
//! Vec<Rule> --> FilterApplier.apply()      --> FilterDriver (iptables)
//! Vec<Rule> --> CounterHarvester.harvest() <-- FilterDriver (iptables)
//! ```

pub mod apply;
pub mod counters;
pub mod driver;
pub mod error;
pub mod harvest;
pub mod memory;
pub mod spec;

pub use apply::{ApplyReport, FilterApplier, RejectedRule};
pub use counters::SlotCounter;
pub use driver::{FilterDriver, IptablesDriver};
pub use error::FilterEngineError;
pub use harvest::{CounterHarvester, RuleCounter};
pub use memory::{DriverCall, FailPoint, MemoryFilterDriver};
pub use spec::FilterSpec;
