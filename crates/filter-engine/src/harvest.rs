//! 카운터 수집 -- 체인별 슬롯 카운터를 규칙 식별자에 위치 기준으로 대응
//!
//! 체인의 N번째 카운터는 스냅샷 규칙 목록에서 그 체인의 N번째 규칙에 대응합니다.
//! 읽은 카운터 총수가 규칙 수와 다르면 그 사이클의 결과 전체를 버립니다.
//!
//! 길이는 같지만 순서가 밀린 카운터 목록은 이 검사로 걸러지지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use befw_core::metrics as m;
use befw_core::types::{ChainRef, Rule, distinct_chains};

use crate::counters::SlotCounter;
use crate::driver::FilterDriver;
use crate::error::FilterEngineError;

/// 규칙 하나의 누적 카운터
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCounter {
    pub rule_id: String,
    pub packets: u64,
    pub bytes: u64,
}

/// 필터 엔진에서 규칙별 누적 카운터를 읽습니다.
pub struct CounterHarvester<D: FilterDriver> {
    driver: Arc<D>,
}

impl<D: FilterDriver> CounterHarvester<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }

    /// 스냅샷 규칙 목록에 대응하는 카운터를 규칙 목록 순서대로 반환합니다.
    ///
    /// 체인마다 한 번씩만 읽습니다.
    ///
    /// # Errors
    ///
    /// - 엔진 조회 실패: 해당 에러
    /// - 카운터 총수 ≠ 규칙 수, 또는 체인별 수 불일치: `CounterMismatch`
    pub fn harvest(&self, rules: &[Rule]) -> Result<Vec<RuleCounter>, FilterEngineError> {
        let mut per_chain: HashMap<ChainRef, Vec<SlotCounter>> = HashMap::new();
        let mut total = 0usize;
        for chain in distinct_chains(rules) {
            let counters = self.driver.chain_counters(&chain.table, &chain.chain)?;
            total += counters.len();
            per_chain.insert(chain, counters);
        }

        if total != rules.len() {
            return Err(self.mismatch(rules.len(), total));
        }

        // 체인별 다음 슬롯 위치
        let mut cursor: HashMap<ChainRef, usize> = HashMap::new();
        let mut harvested = Vec::with_capacity(rules.len());
        for rule in rules {
            let chain = rule.chain_ref();
            let index = cursor.entry(chain.clone()).or_insert(0);
            let slot = per_chain
                .get(&chain)
                .and_then(|counters| counters.get(*index))
                .copied();
            // 총수는 맞지만 체인 간 분포가 다른 경우
            let Some(slot) = slot else {
                return Err(self.mismatch(rules.len(), total));
            };
            *index += 1;
            harvested.push(RuleCounter {
                rule_id: rule.id.clone(),
                packets: slot.packets,
                bytes: slot.bytes,
            });
        }

        debug!(rules = harvested.len(), "counters harvested");
        Ok(harvested)
    }

    fn mismatch(&self, expected: usize, actual: usize) -> FilterEngineError {
        counter!(m::FILTER_COUNTER_MISMATCH_TOTAL).increment(1);
        FilterEngineError::CounterMismatch { expected, actual }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{DriverCall, MemoryFilterDriver};

    fn rule(id: &str, chain: &str) -> Rule {
        Rule {
            id: id.to_owned(),
            table: "filter".to_owned(),
            chain: chain.to_owned(),
            ..Rule::default()
        }
    }

    #[test]
    fn correlates_by_position_per_chain() {
        let driver = Arc::new(
            MemoryFilterDriver::new()
                .with_chain("filter", "A", &["-j A1", "-j A2"])
                .with_chain("filter", "B", &["-j B1"]),
        );
        driver.record_traffic("filter", "A", 0, 1, 10);
        driver.record_traffic("filter", "A", 1, 2, 20);
        driver.record_traffic("filter", "B", 0, 3, 30);

        let harvester = CounterHarvester::new(Arc::clone(&driver));
        let counters = harvester
            .harvest(&[rule("a1", "A"), rule("b1", "B"), rule("a2", "A")])
            .unwrap();

        assert_eq!(
            counters,
            vec![
                RuleCounter { rule_id: "a1".to_owned(), packets: 1, bytes: 10 },
                RuleCounter { rule_id: "b1".to_owned(), packets: 3, bytes: 30 },
                RuleCounter { rule_id: "a2".to_owned(), packets: 2, bytes: 20 },
            ]
        );
    }

    #[test]
    fn each_chain_read_once() {
        let driver = Arc::new(MemoryFilterDriver::new().with_chain(
            "filter",
            "A",
            &["-j X", "-j Y", "-j Z"],
        ));
        let harvester = CounterHarvester::new(Arc::clone(&driver));
        harvester
            .harvest(&[rule("1", "A"), rule("2", "A"), rule("3", "A")])
            .unwrap();
        let reads = driver
            .calls()
            .iter()
            .filter(|c| matches!(c, DriverCall::Counters(_)))
            .count();
        assert_eq!(reads, 1);
    }

    #[test]
    fn total_mismatch_discards_cycle() {
        let driver =
            Arc::new(MemoryFilterDriver::new().with_chain("filter", "A", &["-j X"]));
        let harvester = CounterHarvester::new(Arc::clone(&driver));
        let err = harvester
            .harvest(&[rule("1", "A"), rule("2", "A")])
            .unwrap_err();
        assert!(matches!(
            err,
            FilterEngineError::CounterMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn uneven_distribution_is_a_mismatch() {
        let driver = Arc::new(
            MemoryFilterDriver::new()
                .with_chain("filter", "A", &["-j X", "-j Y"])
                .with_chain("filter", "B", &[]),
        );
        let harvester = CounterHarvester::new(Arc::clone(&driver));
        let err = harvester
            .harvest(&[rule("1", "A"), rule("2", "B")])
            .unwrap_err();
        assert!(matches!(err, FilterEngineError::CounterMismatch { .. }));
    }

    #[test]
    fn shifted_counters_of_same_length_pass() {
        // 알려진 한계: 길이가 같으면 순서 어긋남을 감지하지 못함
        let driver = Arc::new(MemoryFilterDriver::new().with_chain("filter", "A", &["-j X"]));
        driver.override_counters("filter", "A", vec![SlotCounter::new(9, 900)]);
        let harvester = CounterHarvester::new(Arc::clone(&driver));
        let counters = harvester.harvest(&[rule("other", "A")]).unwrap();
        assert_eq!(counters[0].packets, 9);
    }

    #[test]
    fn engine_error_propagates() {
        let driver = Arc::new(MemoryFilterDriver::new());
        let harvester = CounterHarvester::new(Arc::clone(&driver));
        let err = harvester.harvest(&[rule("1", "MISSING")]).unwrap_err();
        assert!(matches!(err, FilterEngineError::Command { op: "counters", .. }));
    }
}
