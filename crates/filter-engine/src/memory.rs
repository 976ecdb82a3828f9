//! 인메모리 필터 드라이버
//!
//! 체인/규칙 테이블을 메모리에 유지하는 [`FilterDriver`] 구현입니다.
//! 실제 iptables 없이 적용/수집 동작과 호출 순서를 검증할 때 사용합니다.

use std::collections::BTreeMap;

use parking_lot::Mutex;

use befw_core::types::ChainRef;

use crate::counters::SlotCounter;
use crate::driver::FilterDriver;
use crate::error::FilterEngineError;
use crate::spec::FilterSpec;

/// 드라이버에 들어온 호출 기록
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    ChainExists(ChainRef),
    CreateChain(ChainRef),
    ClearChain(ChainRef),
    Append(ChainRef, String),
    Insert(ChainRef, u32, String),
    Counters(ChainRef),
}

impl DriverCall {
    /// 호출 대상 체인
    pub fn chain(&self) -> &ChainRef {
        match self {
            Self::ChainExists(c)
            | Self::CreateChain(c)
            | Self::ClearChain(c)
            | Self::Append(c, _)
            | Self::Insert(c, _, _)
            | Self::Counters(c) => c,
        }
    }
}

/// 실패를 주입할 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    CreateChain,
    ClearChain,
    Append,
    Insert,
    Counters,
}

#[derive(Debug, Clone)]
struct Slot {
    spec: FilterSpec,
    counter: SlotCounter,
}

#[derive(Debug, Default)]
struct State {
    chains: BTreeMap<ChainRef, Vec<Slot>>,
    calls: Vec<DriverCall>,
    counter_overrides: BTreeMap<ChainRef, Vec<SlotCounter>>,
    fail_points: Vec<FailPoint>,
}

/// 인메모리 필터 드라이버
#[derive(Debug, Default)]
pub struct MemoryFilterDriver {
    state: Mutex<State>,
}

impl MemoryFilterDriver {
    /// 빈 필터 테이블로 드라이버를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 미리 존재하는 체인과 규칙을 추가합니다. 각 규칙은 공백으로 분리된 토큰 문자열입니다.
    pub fn with_chain(self, table: &str, chain: &str, rules: &[&str]) -> Self {
        {
            let mut state = self.state.lock();
            let slots = rules
                .iter()
                .map(|r| Slot {
                    spec: FilterSpec::from_tokens(r.split_whitespace()),
                    counter: SlotCounter::default(),
                })
                .collect();
            state.chains.insert(ChainRef::new(table, chain), slots);
        }
        self
    }

    /// 지정한 동작이 항상 실패하도록 설정합니다.
    pub fn with_failure(self, point: FailPoint) -> Self {
        self.state.lock().fail_points.push(point);
        self
    }

    /// 주입한 실패를 모두 해제합니다.
    pub fn clear_failures(&self) {
        self.state.lock().fail_points.clear();
    }

    /// 체인이 존재하면 그 규칙들을 렌더링된 문자열로 반환합니다.
    pub fn rules(&self, table: &str, chain: &str) -> Option<Vec<String>> {
        self.state
            .lock()
            .chains
            .get(&ChainRef::new(table, chain))
            .map(|slots| slots.iter().map(|s| s.spec.to_string()).collect())
    }

    /// 존재하는 체인 목록
    pub fn chains(&self) -> Vec<ChainRef> {
        self.state.lock().chains.keys().cloned().collect()
    }

    /// 슬롯에 트래픽을 기록합니다. 슬롯이 없으면 false.
    pub fn record_traffic(
        &self,
        table: &str,
        chain: &str,
        slot: usize,
        packets: u64,
        bytes: u64,
    ) -> bool {
        let mut state = self.state.lock();
        match state
            .chains
            .get_mut(&ChainRef::new(table, chain))
            .and_then(|slots| slots.get_mut(slot))
        {
            Some(slot) => {
                slot.counter.packets += packets;
                slot.counter.bytes += bytes;
                true
            }
            None => false,
        }
    }

    /// 체인의 카운터 조회 결과를 고정값으로 덮어씁니다 (불일치 시나리오용).
    pub fn override_counters(&self, table: &str, chain: &str, counters: Vec<SlotCounter>) {
        self.state
            .lock()
            .counter_overrides
            .insert(ChainRef::new(table, chain), counters);
    }

    /// 지금까지의 호출 기록
    pub fn calls(&self) -> Vec<DriverCall> {
        self.state.lock().calls.clone()
    }

    /// 호출 기록을 비웁니다.
    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn check(state: &State, point: FailPoint, chain: &ChainRef) -> Result<(), FilterEngineError> {
        if state.fail_points.contains(&point) {
            return Err(FilterEngineError::Command {
                op: op_name(point),
                chain: chain.to_string(),
                reason: "injected failure".to_owned(),
            });
        }
        Ok(())
    }
}

fn op_name(point: FailPoint) -> &'static str {
    match point {
        FailPoint::CreateChain => "create-chain",
        FailPoint::ClearChain => "clear-chain",
        FailPoint::Append => "append",
        FailPoint::Insert => "insert",
        FailPoint::Counters => "counters",
    }
}

fn no_chain(op: &'static str, chain: &ChainRef) -> FilterEngineError {
    FilterEngineError::Command {
        op,
        chain: chain.to_string(),
        reason: "no chain by that name".to_owned(),
    }
}

impl FilterDriver for MemoryFilterDriver {
    fn chain_exists(&self, table: &str, chain: &str) -> Result<bool, FilterEngineError> {
        let key = ChainRef::new(table, chain);
        let mut state = self.state.lock();
        state.calls.push(DriverCall::ChainExists(key.clone()));
        Ok(state.chains.contains_key(&key))
    }

    fn create_chain(&self, table: &str, chain: &str) -> Result<(), FilterEngineError> {
        let key = ChainRef::new(table, chain);
        let mut state = self.state.lock();
        state.calls.push(DriverCall::CreateChain(key.clone()));
        Self::check(&state, FailPoint::CreateChain, &key)?;
        if state.chains.contains_key(&key) {
            return Err(FilterEngineError::Command {
                op: "create-chain",
                chain: key.to_string(),
                reason: "chain already exists".to_owned(),
            });
        }
        state.chains.insert(key, Vec::new());
        Ok(())
    }

    fn clear_chain(&self, table: &str, chain: &str) -> Result<(), FilterEngineError> {
        let key = ChainRef::new(table, chain);
        let mut state = self.state.lock();
        state.calls.push(DriverCall::ClearChain(key.clone()));
        Self::check(&state, FailPoint::ClearChain, &key)?;
        state.counter_overrides.remove(&key);
        let slots = state
            .chains
            .get_mut(&key)
            .ok_or_else(|| no_chain("clear-chain", &key))?;
        slots.clear();
        Ok(())
    }

    fn append_unique(
        &self,
        table: &str,
        chain: &str,
        spec: &FilterSpec,
    ) -> Result<(), FilterEngineError> {
        let key = ChainRef::new(table, chain);
        let mut state = self.state.lock();
        state
            .calls
            .push(DriverCall::Append(key.clone(), spec.to_string()));
        Self::check(&state, FailPoint::Append, &key)?;
        let slots = state
            .chains
            .get_mut(&key)
            .ok_or_else(|| no_chain("append", &key))?;
        if slots.iter().any(|s| &s.spec == spec) {
            return Ok(());
        }
        slots.push(Slot {
            spec: spec.clone(),
            counter: SlotCounter::default(),
        });
        Ok(())
    }

    fn insert(
        &self,
        table: &str,
        chain: &str,
        position: u32,
        spec: &FilterSpec,
    ) -> Result<(), FilterEngineError> {
        let key = ChainRef::new(table, chain);
        let mut state = self.state.lock();
        state
            .calls
            .push(DriverCall::Insert(key.clone(), position, spec.to_string()));
        Self::check(&state, FailPoint::Insert, &key)?;
        let slots = state
            .chains
            .get_mut(&key)
            .ok_or_else(|| no_chain("insert", &key))?;
        let index = position as usize;
        if index == 0 || index > slots.len() + 1 {
            return Err(FilterEngineError::Command {
                op: "insert",
                chain: key.to_string(),
                reason: format!("index of insertion too big: {position}"),
            });
        }
        slots.insert(
            index - 1,
            Slot {
                spec: spec.clone(),
                counter: SlotCounter::default(),
            },
        );
        Ok(())
    }

    fn chain_counters(
        &self,
        table: &str,
        chain: &str,
    ) -> Result<Vec<SlotCounter>, FilterEngineError> {
        let key = ChainRef::new(table, chain);
        let mut state = self.state.lock();
        state.calls.push(DriverCall::Counters(key.clone()));
        Self::check(&state, FailPoint::Counters, &key)?;
        if let Some(counters) = state.counter_overrides.get(&key) {
            return Ok(counters.clone());
        }
        let slots = state
            .chains
            .get(&key)
            .ok_or_else(|| no_chain("counters", &key))?;
        Ok(slots.iter().map(|s| s.counter).collect())
    }
}
