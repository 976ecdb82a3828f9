//! 방화벽 에이전트 -- 조회/반영 루프와 카운터 보고 파이프라인의 생명주기 관리
//!
//! [`FirewallAgent`]는 core의 [`Pipeline`] trait을 구현하여
//! `befw-daemon`에서 start/stop/health_check로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! ControlPlane ──fetch──> Reconciler ──replace──> SharedSnapshot
//!                              |                        |
//!                        FilterApplier            TelemetryProducer
//!                              |                        |
//!                         FilterDriver <──counters──────┘
//!                                                       |
//!                                               mpsc ──> sender x N ──report──> ControlPlane
//! ```

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use befw_core::error::{BefwError, PipelineError};
use befw_core::pipeline::{HealthStatus, Pipeline};
use befw_filter_engine::FilterDriver;

use crate::client::ControlPlane;
use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::reconcile::{ReconcileStats, Reconciler};
use crate::snapshot::{PolicySnapshot, SharedSnapshot};
use crate::telemetry::{TelemetryProducer, TelemetryStats, spawn_senders};

/// 에이전트 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum AgentState {
    Initialized,
    Running,
    Stopped,
}

/// 엣지 방화벽 에이전트
///
/// # 사용 예시
/// ```ignore
/// use befw_agent::{FirewallAgentBuilder, HttpControlPlane};
/// use befw_filter_engine::IptablesDriver;
///
/// let mut agent = FirewallAgentBuilder::new()
///     .config(config)
///     .driver(Arc::new(IptablesDriver::new()?))
///     .control_plane(Arc::new(client))
///     .build()?;
///
/// agent.start().await?;
/// ```
pub struct FirewallAgent<D: FilterDriver, C: ControlPlane> {
    config: AgentConfig,
    state: AgentState,
    driver: Arc<D>,
    client: Arc<C>,
    snapshot: SharedSnapshot,
    reconcile_stats: Arc<ReconcileStats>,
    telemetry_stats: Arc<TelemetryStats>,
    cancel: CancellationToken,
    /// 조회 루프, 수집 루프
    loops: Vec<JoinHandle<()>>,
    /// 전송 워커
    senders: Vec<JoinHandle<()>>,
}

impl<D: FilterDriver, C: ControlPlane> FirewallAgent<D, C> {
    /// 현재 상태명을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            AgentState::Initialized => "initialized",
            AgentState::Running => "running",
            AgentState::Stopped => "stopped",
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// 현재 정책 스냅샷
    pub fn snapshot(&self) -> Arc<PolicySnapshot> {
        self.snapshot.load()
    }

    /// 성공한 조회/반영 사이클 수
    pub fn reconciles_succeeded(&self) -> u64 {
        self.reconcile_stats.succeeded()
    }

    /// 실패한 조회/반영 사이클 수
    pub fn reconciles_failed(&self) -> u64 {
        self.reconcile_stats.failed()
    }

    /// 큐에 넣은 보고 수
    pub fn reports_queued(&self) -> u64 {
        self.telemetry_stats.queued()
    }

    /// 전송 성공한 보고 수
    pub fn reports_sent(&self) -> u64 {
        self.telemetry_stats.sent()
    }

    /// 전송 실패한 보고 수
    pub fn reports_failed(&self) -> u64 {
        self.telemetry_stats.failed()
    }

    /// 버려진 수집 사이클 수
    pub fn harvests_dropped(&self) -> u64 {
        self.telemetry_stats.dropped()
    }
}

impl<D: FilterDriver, C: ControlPlane> Pipeline for FirewallAgent<D, C> {
    async fn start(&mut self) -> Result<(), BefwError> {
        if self.state == AgentState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(
            tenant = %self.config.tenant,
            server_url = %self.config.server_url,
            table = %self.config.table,
            "starting firewall agent"
        );

        // 재시작 시 이전 토큰은 이미 취소되어 있음
        self.cancel = CancellationToken::new();

        let reconciler = Arc::new(Reconciler::new(
            self.config.tenant.clone(),
            self.config.table.clone(),
            Arc::clone(&self.client),
            Arc::clone(&self.driver),
            self.snapshot.clone(),
            Arc::clone(&self.reconcile_stats),
        ));
        self.loops.push(tokio::spawn(
            reconciler.run(self.config.poll_interval(), self.cancel.clone()),
        ));

        if self.config.telemetry_enabled {
            let (tx, rx) = mpsc::channel(self.config.queue_capacity);
            self.senders = spawn_senders(
                Arc::clone(&self.client),
                rx,
                self.config.sender_workers,
                Arc::clone(&self.telemetry_stats),
            );
            let producer = TelemetryProducer::new(
                self.config.tenant.clone(),
                Arc::clone(&self.driver),
                self.snapshot.clone(),
                tx,
                Arc::clone(&self.telemetry_stats),
            );
            self.loops.push(tokio::spawn(
                producer.run(self.config.report_interval(), self.cancel.clone()),
            ));
        } else {
            info!("telemetry disabled, counters will not be reported");
        }

        self.state = AgentState::Running;
        info!(
            workers = self.senders.len(),
            queue_capacity = self.config.queue_capacity,
            "firewall agent started"
        );
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BefwError> {
        if self.state != AgentState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping firewall agent");
        self.cancel.cancel();

        // 루프 종료 -> 송신측 drop -> 워커가 남은 보고를 비우고 종료
        for task in self.loops.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "agent loop terminated abnormally");
            }
        }

        let grace = self.config.shutdown_grace();
        let mut senders = std::mem::take(&mut self.senders);
        let drained = tokio::time::timeout(grace, async {
            for sender in senders.iter_mut() {
                if let Err(e) = sender.await {
                    warn!(error = %e, "sender worker terminated abnormally");
                }
            }
        })
        .await;
        if drained.is_err() {
            warn!(
                grace_secs = grace.as_secs(),
                "report queue not drained within grace period, aborting senders"
            );
            for sender in &senders {
                sender.abort();
            }
        }

        self.state = AgentState::Stopped;
        info!(
            reconciles = self.reconcile_stats.succeeded(),
            reports_sent = self.telemetry_stats.sent(),
            "firewall agent stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            AgentState::Running => match self.reconcile_stats.last_error() {
                Some(reason) => HealthStatus::Degraded(format!("last reconcile failed: {reason}")),
                None => HealthStatus::Healthy,
            },
            AgentState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            AgentState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 방화벽 에이전트 빌더
pub struct FirewallAgentBuilder<D: FilterDriver, C: ControlPlane> {
    config: AgentConfig,
    driver: Option<Arc<D>>,
    client: Option<Arc<C>>,
    snapshot: Option<SharedSnapshot>,
}

impl<D: FilterDriver, C: ControlPlane> FirewallAgentBuilder<D, C> {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
            driver: None,
            client: None,
            snapshot: None,
        }
    }

    /// 에이전트 설정을 지정합니다.
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// 필터 엔진 드라이버를 설정합니다.
    pub fn driver(mut self, driver: Arc<D>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// 컨트롤 플레인 클라이언트를 설정합니다.
    pub fn control_plane(mut self, client: Arc<C>) -> Self {
        self.client = Some(client);
        self
    }

    /// 외부에서 관찰할 스냅샷 핸들을 설정합니다. 없으면 새로 만듭니다.
    pub fn snapshot(mut self, snapshot: SharedSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    /// 에이전트를 빌드합니다.
    pub fn build(self) -> Result<FirewallAgent<D, C>, AgentError> {
        self.config.validate()?;

        let driver = self.driver.ok_or_else(|| AgentError::Config {
            field: "driver".to_owned(),
            reason: "filter driver must be provided".to_owned(),
        })?;
        let client = self.client.ok_or_else(|| AgentError::Config {
            field: "control_plane".to_owned(),
            reason: "control plane client must be provided".to_owned(),
        })?;

        Ok(FirewallAgent {
            config: self.config,
            state: AgentState::Initialized,
            driver,
            client,
            snapshot: self.snapshot.unwrap_or_default(),
            reconcile_stats: Arc::new(ReconcileStats::default()),
            telemetry_stats: Arc::new(TelemetryStats::default()),
            cancel: CancellationToken::new(),
            loops: Vec::new(),
            senders: Vec::new(),
        })
    }
}

impl<D: FilterDriver, C: ControlPlane> Default for FirewallAgentBuilder<D, C> {
    fn default() -> Self {
        Self::new()
    }
}
