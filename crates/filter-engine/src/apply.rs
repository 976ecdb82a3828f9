//! 규칙 반영 -- 정렬된 규칙 목록을 라이브 필터 상태로 만드는 2단계 적용
//!
//! 1. ensure 단계: 참조된 (테이블, 체인)마다 체인이 없으면 생성
//! 2. apply 단계: 체인을 처음 만날 때 한 번만 비우고, 규칙 목록 순서대로 append/insert
//!
//! 엔진 명령 실패는 그 사이클의 나머지를 중단합니다. 이미 반영된 규칙은 롤백하지 않으며
//! 다음 사이클이 체인을 다시 비우고 채웁니다.
//! insert 위치가 없는 규칙은 그 규칙만 건너뛰고 나머지는 계속 반영합니다.

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use tracing::{debug, info, warn};

use befw_core::metrics as m;
use befw_core::types::{ChainRef, Rule, RuleAction, distinct_chains};

use crate::driver::FilterDriver;
use crate::error::FilterEngineError;
use crate::spec::FilterSpec;

/// 반영하지 못한 규칙
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRule {
    pub rule_id: String,
    pub chain: ChainRef,
    pub reason: String,
}

/// 한 번의 반영 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    /// ensure 단계에서 확인한 체인 수
    pub chains_ensured: usize,
    /// 새로 만든 체인 수
    pub chains_created: usize,
    /// 비운 체인 수
    pub chains_cleared: usize,
    /// 엔진에 넘긴 규칙 수
    pub rules_applied: usize,
    /// 건너뛴 규칙
    pub rejected: Vec<RejectedRule>,
}

impl ApplyReport {
    /// 모든 규칙이 반영되었는지 여부
    pub fn is_complete(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// 규칙 목록을 필터 엔진에 반영합니다.
pub struct FilterApplier<D: FilterDriver> {
    driver: Arc<D>,
}

impl<D: FilterDriver> FilterApplier<D> {
    pub fn new(driver: Arc<D>) -> Self {
        Self { driver }
    }

    /// 규칙 목록을 반영합니다.
    ///
    /// 같은 목록을 연속으로 반영해도 결과 상태는 같습니다.
    /// 변경이 없어도 체인은 매번 비우고 다시 채웁니다.
    ///
    /// # Errors
    ///
    /// 엔진 명령(체인 확인/생성/비우기, append, insert)이 실패하면 즉시 중단하고
    /// 해당 에러를 반환합니다.
    pub fn apply(&self, rules: &[Rule]) -> Result<ApplyReport, FilterEngineError> {
        let mut report = ApplyReport::default();

        // ensure 단계
        for chain in distinct_chains(rules) {
            report.chains_ensured += 1;
            if !self.driver.chain_exists(&chain.table, &chain.chain)? {
                self.driver.create_chain(&chain.table, &chain.chain)?;
                report.chains_created += 1;
                debug!(chain = %chain, "chain created");
            }
        }

        // apply 단계
        let mut cleared: HashSet<ChainRef> = HashSet::new();
        for rule in rules {
            let chain = rule.chain_ref();
            if !cleared.contains(&chain) {
                self.driver.clear_chain(&chain.table, &chain.chain)?;
                report.chains_cleared += 1;
                counter!(m::FILTER_CHAINS_CLEARED_TOTAL, m::LABEL_CHAIN => chain.to_string())
                    .increment(1);
                debug!(chain = %chain, "chain cleared");
                cleared.insert(chain.clone());
            }

            let spec = FilterSpec::from_rule(rule);
            match rule.action {
                RuleAction::Insert if rule.position == 0 => {
                    let err = FilterEngineError::InvalidRule {
                        rule_id: rule.display_id().to_owned(),
                        reason: "insert action requires a rule position".to_owned(),
                    };
                    warn!(rule_id = rule.display_id(), chain = %chain, error = %err, "rule rejected");
                    counter!(m::FILTER_RULES_REJECTED_TOTAL, m::LABEL_CHAIN => chain.to_string())
                        .increment(1);
                    report.rejected.push(RejectedRule {
                        rule_id: rule.id.clone(),
                        chain,
                        reason: err.to_string(),
                    });
                    continue;
                }
                RuleAction::Insert => {
                    self.driver
                        .insert(&chain.table, &chain.chain, rule.position, &spec)?;
                }
                RuleAction::Append => {
                    self.driver
                        .append_unique(&chain.table, &chain.chain, &spec)?;
                }
            }
            report.rules_applied += 1;
            counter!(m::FILTER_RULES_APPLIED_TOTAL).increment(1);
            debug!(rule_id = rule.display_id(), chain = %chain, spec = %spec, "rule applied");
        }

        info!(
            chains = report.chains_ensured,
            created = report.chains_created,
            applied = report.rules_applied,
            rejected = report.rejected.len(),
            "rules applied"
        );
        Ok(report)
    }
}
