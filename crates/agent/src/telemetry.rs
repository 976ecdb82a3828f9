//! 카운터 보고 파이프라인
//!
//! ```text
//! SharedSnapshot --read--> TelemetryProducer (harvest + delta)
//!                               |
//!                          mpsc (bounded, 가득 차면 대기)
//!                               |
//!                     sender worker x N --> ControlPlane.report_stats()
//! ```
//!
//! 큐가 가득 차면 생산자는 자리가 날 때까지 기다리며 보고를 버리지 않습니다.
//! 보고가 버려지는 경우는 카운터 수 불일치와 전송 실패뿐입니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use befw_core::metrics as m;
use befw_core::types::{RuleStat, StatsReport};
use befw_filter_engine::{CounterHarvester, FilterDriver, FilterEngineError, RuleCounter};

use crate::client::ControlPlane;
use crate::error::AgentError;
use crate::snapshot::SharedSnapshot;

/// 보고 파이프라인 통계
#[derive(Debug, Default)]
pub struct TelemetryStats {
    queued: AtomicU64,
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    depth: AtomicU64,
}

impl TelemetryStats {
    /// 큐에 넣은 보고 수
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    /// 전송 성공한 보고 수
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// 전송 실패한 보고 수
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// 버린 수집 사이클 수
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 마지막으로 관측한 큐 길이
    pub fn queue_depth(&self) -> u64 {
        self.depth.load(Ordering::Relaxed)
    }

    fn record_depth(&self, depth: usize) {
        self.depth.store(depth as u64, Ordering::Relaxed);
        gauge!(m::TELEMETRY_QUEUE_DEPTH).set(depth as f64);
    }
}

/// 규칙별 직전 누적값을 기억하고 증분을 계산합니다.
///
/// 기준값은 한 반영 세대 안에서만 유효합니다. 세대가 바뀌면 체인이 비워졌으므로
/// [`rebase`](Self::rebase)로 기준값을 버립니다.
#[derive(Debug, Default)]
pub struct DeltaTracker {
    baseline: HashMap<String, (u64, u64)>,
    epoch: Option<u64>,
}

impl DeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기준값이 `epoch` 세대의 것이 아니면 모두 버리고 `true`를 반환합니다.
    pub fn rebase(&mut self, epoch: u64) -> bool {
        if self.epoch == Some(epoch) {
            return false;
        }
        self.epoch = Some(epoch);
        self.baseline.clear();
        true
    }

    /// 현재 누적값 대비 증분을 계산합니다. 기준값은 바꾸지 않습니다.
    ///
    /// 누적값이 직전보다 작으면 카운터가 초기화된 것으로 보고 현재값을 그대로 씁니다.
    pub fn deltas(&self, counters: &[RuleCounter]) -> Vec<RuleStat> {
        counters
            .iter()
            .map(|c| {
                let (packets, bytes) = match self.baseline.get(&c.rule_id) {
                    Some(&(prev_packets, prev_bytes))
                        if c.packets >= prev_packets && c.bytes >= prev_bytes =>
                    {
                        (c.packets - prev_packets, c.bytes - prev_bytes)
                    }
                    _ => (c.packets, c.bytes),
                };
                RuleStat {
                    id: c.rule_id.clone(),
                    packets,
                    bytes,
                }
            })
            .collect()
    }

    /// 기준값을 현재 누적값으로 옮깁니다. 스냅샷에서 사라진 규칙은 잊습니다.
    pub fn commit(&mut self, counters: &[RuleCounter]) {
        self.baseline = counters
            .iter()
            .map(|c| (c.rule_id.clone(), (c.packets, c.bytes)))
            .collect();
    }

    pub fn len(&self) -> usize {
        self.baseline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.baseline.is_empty()
    }
}

/// 한 수집 사이클의 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// 보고를 큐에 넣음
    Queued,
    /// 스냅샷이 비어 있어 건너뜀
    Skipped,
    /// 수집 실패 또는 카운터 수 불일치로 버림
    Dropped,
    /// 큐 대기 중 취소됨
    Cancelled,
    /// 큐가 닫힘
    Closed,
}

/// 카운터를 수집해 보고 큐에 넣는 생산자
pub struct TelemetryProducer<D: FilterDriver> {
    tenant: String,
    harvester: Arc<CounterHarvester<D>>,
    snapshot: SharedSnapshot,
    deltas: DeltaTracker,
    tx: mpsc::Sender<StatsReport>,
    stats: Arc<TelemetryStats>,
}

impl<D: FilterDriver> TelemetryProducer<D> {
    pub fn new(
        tenant: impl Into<String>,
        driver: Arc<D>,
        snapshot: SharedSnapshot,
        tx: mpsc::Sender<StatsReport>,
        stats: Arc<TelemetryStats>,
    ) -> Self {
        Self {
            tenant: tenant.into(),
            harvester: Arc::new(CounterHarvester::new(driver)),
            snapshot,
            deltas: DeltaTracker::new(),
            tx,
            stats,
        }
    }

    /// 수집 → 증분 계산 → 큐 삽입을 한 번 수행합니다.
    ///
    /// 큐가 가득 차 있으면 자리가 나거나 취소될 때까지 기다립니다.
    /// 규칙 반영이 진행 중이면 건너뛰고, 수집 도중 반영이 일어나면 그 사이클을 버립니다.
    pub async fn cycle(&mut self, cancel: &CancellationToken) -> CycleOutcome {
        let Some(epoch) = self.snapshot.settled_epoch() else {
            debug!("rules are being applied, harvest skipped");
            return CycleOutcome::Skipped;
        };
        let snapshot = self.snapshot.load();
        if snapshot.is_empty() {
            debug!("policy snapshot empty, harvest skipped");
            return CycleOutcome::Skipped;
        }

        let harvester = Arc::clone(&self.harvester);
        let rules = Arc::clone(&snapshot);
        let harvested = tokio::task::spawn_blocking(move || harvester.harvest(&rules.rules))
            .await
            .map_err(|e| AgentError::Task(e.to_string()))
            .and_then(|r| r.map_err(AgentError::from));

        let counters = match harvested {
            Ok(counters) => counters,
            Err(AgentError::Filter(e @ FilterEngineError::CounterMismatch { .. })) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "counters do not match snapshot, cycle dropped");
                return CycleOutcome::Dropped;
            }
            Err(e) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "harvest failed, cycle dropped");
                return CycleOutcome::Dropped;
            }
        };

        if self.snapshot.settled_epoch() != Some(epoch) {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("rules re-applied during harvest, cycle dropped");
            return CycleOutcome::Dropped;
        }
        if self.deltas.rebase(epoch) {
            debug!(epoch, "chains rebuilt since last report, delta baselines reset");
        }

        let tenant = if snapshot.tenant.is_empty() {
            self.tenant.clone()
        } else {
            snapshot.tenant.clone()
        };
        let report = StatsReport::new(tenant, self.deltas.deltas(&counters));

        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                debug!("cancelled while waiting for queue capacity");
                CycleOutcome::Cancelled
            }
            sent = self.tx.send(report) => match sent {
                Ok(()) => {
                    self.deltas.commit(&counters);
                    self.stats.queued.fetch_add(1, Ordering::Relaxed);
                    counter!(m::TELEMETRY_REPORTS_QUEUED_TOTAL).increment(1);
                    self.stats
                        .record_depth(self.tx.max_capacity() - self.tx.capacity());
                    debug!(rules = counters.len(), "counter report queued");
                    CycleOutcome::Queued
                }
                Err(_) => {
                    warn!("report queue closed");
                    CycleOutcome::Closed
                }
            },
        }
    }

    /// 취소될 때까지 `interval`마다 수집합니다. 반환 시 송신측이 닫혀 워커가 남은 보고를 비웁니다.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "harvest loop started");

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.cycle(&cancel).await {
                        CycleOutcome::Cancelled | CycleOutcome::Closed => break,
                        _ => {}
                    }
                }
            }
        }
        info!("harvest loop stopped");
    }
}

/// 보고 큐를 공유하는 전송 워커 `workers`개를 띄웁니다.
///
/// 각 워커는 큐가 닫히고 비워지면 종료합니다. 전송 실패는 로그만 남기고 재시도하지 않습니다.
pub fn spawn_senders<C: ControlPlane>(
    client: Arc<C>,
    rx: mpsc::Receiver<StatsReport>,
    workers: usize,
    stats: Arc<TelemetryStats>,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..workers)
        .map(|worker| {
            let client = Arc::clone(&client);
            let rx = Arc::clone(&rx);
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                loop {
                    let next = {
                        let mut rx = rx.lock().await;
                        let next = rx.recv().await;
                        stats.record_depth(rx.len());
                        next
                    };
                    let Some(report) = next else {
                        debug!(worker, "report queue closed, sender exiting");
                        break;
                    };

                    let started = Instant::now();
                    let result = client.report_stats(&report).await;
                    histogram!(m::TELEMETRY_SEND_DURATION_SECONDS)
                        .record(started.elapsed().as_secs_f64());

                    match result {
                        Ok(()) => {
                            stats.sent.fetch_add(1, Ordering::Relaxed);
                            counter!(m::TELEMETRY_REPORTS_SENT_TOTAL, m::LABEL_RESULT => "success")
                                .increment(1);
                            debug!(worker, rules = report.stats.len(), "counter report sent");
                        }
                        Err(e) => {
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                            counter!(m::TELEMETRY_REPORTS_SENT_TOTAL, m::LABEL_RESULT => "failure")
                                .increment(1);
                            warn!(worker, error = %e, "counter report failed, not retried");
                        }
                    }
                }
            })
        })
        .collect()
}
