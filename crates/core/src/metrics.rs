//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `befw_`
//! - 모듈명: `reconcile_`, `filter_`, `telemetry_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(befw_core::metrics::RECONCILE_RUNS_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 체인 레이블 키
pub const LABEL_CHAIN: &str = "chain";

// ─── Reconcile 메트릭 ──────────────────────────────────────────────

/// Reconcile: 실행 횟수 (counter, label: result)
pub const RECONCILE_RUNS_TOTAL: &str = "befw_reconcile_runs_total";

/// Reconcile: 1회 소요 시간 (histogram, 초)
pub const RECONCILE_DURATION_SECONDS: &str = "befw_reconcile_duration_seconds";

/// Reconcile: 현재 스냅샷의 규칙 수 (gauge)
pub const RECONCILE_SNAPSHOT_RULES: &str = "befw_reconcile_snapshot_rules";

// ─── Filter Engine 메트릭 ──────────────────────────────────────────

/// Filter: 엔진에 반영된 규칙 수 (counter)
pub const FILTER_RULES_APPLIED_TOTAL: &str = "befw_filter_rules_applied_total";

/// Filter: 반영하지 못한 규칙 수 (counter)
pub const FILTER_RULES_REJECTED_TOTAL: &str = "befw_filter_rules_rejected_total";

/// Filter: 카운터 수 불일치로 버린 수집 결과 (counter)
pub const FILTER_COUNTER_MISMATCH_TOTAL: &str = "befw_filter_counter_mismatch_total";

/// Filter: 반영 중 비운 체인 수 (counter)
pub const FILTER_CHAINS_CLEARED_TOTAL: &str = "befw_filter_chains_cleared_total";

// ─── Telemetry 메트릭 ──────────────────────────────────────────────

/// Telemetry: 큐에 넣은 보고 수 (counter)
pub const TELEMETRY_REPORTS_QUEUED_TOTAL: &str = "befw_telemetry_reports_queued_total";

/// Telemetry: 전송한 보고 수 (counter, label: result)
pub const TELEMETRY_REPORTS_SENT_TOTAL: &str = "befw_telemetry_reports_sent_total";

/// Telemetry: 보고 전송 소요 시간 (histogram, 초)
pub const TELEMETRY_SEND_DURATION_SECONDS: &str = "befw_telemetry_send_duration_seconds";

/// Telemetry: 큐에 대기 중인 보고 수 (gauge)
pub const TELEMETRY_QUEUE_DEPTH: &str = "befw_telemetry_queue_depth";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "befw_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1)
pub const DAEMON_BUILD_INFO: &str = "befw_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 원격 호출/엔진 반영 소요 시간 버킷 (초)
///
/// 10ms ~ 60s 범위
pub const ROUND_TRIP_DURATION_BUCKETS: [f64; 9] = [0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 10.0, 60.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번만 호출해야 합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Reconcile
    describe_counter!(
        RECONCILE_RUNS_TOTAL,
        "Total number of reconcile runs by result"
    );
    describe_histogram!(
        RECONCILE_DURATION_SECONDS,
        "Time to fetch and apply one policy snapshot in seconds"
    );
    describe_gauge!(
        RECONCILE_SNAPSHOT_RULES,
        "Number of rules in the current policy snapshot"
    );

    // Filter Engine
    describe_counter!(
        FILTER_RULES_APPLIED_TOTAL,
        "Total number of rules applied to the packet filter"
    );
    describe_counter!(
        FILTER_RULES_REJECTED_TOTAL,
        "Total number of rules that could not be applied"
    );
    describe_counter!(
        FILTER_COUNTER_MISMATCH_TOTAL,
        "Total number of harvests discarded due to counter count mismatch"
    );
    describe_counter!(
        FILTER_CHAINS_CLEARED_TOTAL,
        "Total number of chains cleared while applying rules"
    );

    // Telemetry
    describe_counter!(
        TELEMETRY_REPORTS_QUEUED_TOTAL,
        "Total number of counter reports queued for sending"
    );
    describe_counter!(
        TELEMETRY_REPORTS_SENT_TOTAL,
        "Total number of counter reports sent by result"
    );
    describe_histogram!(
        TELEMETRY_SEND_DURATION_SECONDS,
        "Time to deliver one counter report in seconds"
    );
    describe_gauge!(
        TELEMETRY_QUEUE_DEPTH,
        "Number of counter reports waiting in the send queue"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "befw daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        RECONCILE_RUNS_TOTAL,
        RECONCILE_DURATION_SECONDS,
        RECONCILE_SNAPSHOT_RULES,
        FILTER_RULES_APPLIED_TOTAL,
        FILTER_RULES_REJECTED_TOTAL,
        FILTER_COUNTER_MISMATCH_TOTAL,
        FILTER_CHAINS_CLEARED_TOTAL,
        TELEMETRY_REPORTS_QUEUED_TOTAL,
        TELEMETRY_REPORTS_SENT_TOTAL,
        TELEMETRY_SEND_DURATION_SECONDS,
        TELEMETRY_QUEUE_DEPTH,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_befw_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("befw_"),
                "Metric '{}' does not start with 'befw_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names: Vec<_> = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 없어도 패닉하지 않아야 함
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_RESULT, LABEL_CHAIN] {
            assert_eq!(label.to_lowercase(), label);
        }
    }

    #[test]
    fn round_trip_buckets_are_sorted() {
        let buckets = ROUND_TRIP_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(
                buckets[i] > buckets[i - 1],
                "Bucket values must be in ascending order"
            );
        }
    }
}
