//! 정책 조회/반영 루프
//!
//! 매 tick마다 독립 태스크를 띄워 조회 → 스냅샷 교체 → 엔진 반영을 수행합니다.
//! 조회가 주기보다 오래 걸리면 두 사이클이 동시에 진행될 수 있고, 나중에 끝난 쪽이 이깁니다.
//! 취소 토큰은 새 tick 예약만 멈추며 진행 중인 사이클은 끝까지 실행됩니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use parking_lot::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use befw_core::metrics as m;
use befw_filter_engine::{ApplyReport, FilterApplier, FilterDriver};

use crate::client::ControlPlane;
use crate::error::AgentError;
use crate::snapshot::{PolicySnapshot, SharedSnapshot};

/// 조회/반영 사이클 통계
#[derive(Debug, Default)]
pub struct ReconcileStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl ReconcileStats {
    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// 가장 최근에 끝난 사이클이 실패했다면 그 사유
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    fn record_success(&self) {
        self.succeeded.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = None;
    }

    fn record_failure(&self, reason: String) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.lock() = Some(reason);
    }
}

/// 컨트롤 플레인의 정책을 라이브 필터에 맞춰 넣습니다.
pub struct Reconciler<D: FilterDriver, C: ControlPlane> {
    tenant: String,
    table: String,
    client: Arc<C>,
    applier: Arc<FilterApplier<D>>,
    snapshot: SharedSnapshot,
    stats: Arc<ReconcileStats>,
}

impl<D: FilterDriver, C: ControlPlane> Reconciler<D, C> {
    pub fn new(
        tenant: impl Into<String>,
        table: impl Into<String>,
        client: Arc<C>,
        driver: Arc<D>,
        snapshot: SharedSnapshot,
        stats: Arc<ReconcileStats>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            table: table.into(),
            client,
            applier: Arc::new(FilterApplier::new(driver)),
            snapshot,
            stats,
        }
    }

    /// 한 사이클을 수행합니다.
    ///
    /// 조회에 성공하면 스냅샷을 먼저 교체한 뒤 새 규칙 목록을 반영합니다.
    /// 반영이 실패해도 스냅샷은 이미 교체된 상태로 남습니다.
    ///
    /// # Errors
    ///
    /// - 조회 실패: `Request`, `Status`, `Decode`
    /// - 엔진 명령 실패: `Filter`
    /// - 일부 규칙을 건너뜀: `Incomplete`
    pub async fn reconcile_once(&self) -> Result<ApplyReport, AgentError> {
        let document = self.client.fetch_policy(&self.tenant, &self.table).await?;

        // 교체부터 반영이 끝날 때까지 수집 루프는 카운터를 쓰지 않음
        let _applying = self.snapshot.begin_apply();
        let mut next = PolicySnapshot::from(document);
        if next.tenant.is_empty() {
            next.tenant = self.tenant.clone();
        }
        let snapshot = self.snapshot.replace(next);
        gauge!(m::RECONCILE_SNAPSHOT_RULES).set(snapshot.rules.len() as f64);
        debug!(
            rules = snapshot.rules.len(),
            address_lists = snapshot.address_lists.len(),
            "policy snapshot replaced"
        );

        let applier = Arc::clone(&self.applier);
        let report = tokio::task::spawn_blocking(move || applier.apply(&snapshot.rules))
            .await
            .map_err(|e| AgentError::Task(e.to_string()))??;

        if !report.is_complete() {
            return Err(AgentError::Incomplete {
                rejected: report.rejected.len(),
            });
        }
        Ok(report)
    }

    async fn run_cycle(&self) {
        let started = Instant::now();
        let result = self.reconcile_once().await;
        histogram!(m::RECONCILE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match result {
            Ok(report) => {
                counter!(m::RECONCILE_RUNS_TOTAL, m::LABEL_RESULT => "success").increment(1);
                self.stats.record_success();
                info!(
                    chains = report.chains_ensured,
                    rules = report.rules_applied,
                    "reconcile completed"
                );
            }
            Err(e) => {
                counter!(m::RECONCILE_RUNS_TOTAL, m::LABEL_RESULT => "failure").increment(1);
                error!(tenant = %self.tenant, error = %e, "reconcile failed, retrying next tick");
                self.stats.record_failure(e.to_string());
            }
        }
    }

    /// 취소될 때까지 `interval`마다 사이클 태스크를 띄웁니다. 첫 사이클은 즉시 시작합니다.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            tenant = %self.tenant,
            table = %self.table,
            interval_secs = interval.as_secs(),
            "reconcile loop started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("reconcile loop stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let this = Arc::clone(&self);
                    tokio::spawn(async move {
                        this.run_cycle().await;
                    });
                }
            }
        }
    }
}
