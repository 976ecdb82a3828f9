//! Process orchestration -- config resolution, agent assembly and lifecycle.
//!
//! The [`Orchestrator`] owns the loaded configuration and the
//! [`FirewallAgent`]. It writes the PID file, starts the agent, waits for a
//! shutdown signal, stops the agent and removes the PID file.
//!
//! # Config precedence (lowest to highest)
//!
//! 1. built-in defaults
//! 2. `befw.toml`
//! 3. `BEFW_*` environment variables
//! 4. CLI flags

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use befw_agent::{AgentConfig, ControlPlane, FirewallAgent, FirewallAgentBuilder, HttpControlPlane};
use befw_core::config::BefwConfig;
use befw_core::pipeline::{HealthStatus, Pipeline};
use befw_filter_engine::{FilterDriver, IptablesDriver};

use crate::cli::DaemonCli;
use crate::metrics_server;

/// Uptime gauge refresh period.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Daemon health snapshot.
#[derive(Debug, Clone)]
pub struct DaemonHealth {
    pub status: HealthStatus,
    pub uptime_secs: u64,
}

/// Resolve the effective configuration for `cli`.
///
/// Reads the file, applies `BEFW_*` environment overrides, then CLI flags,
/// and validates the result.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the merged
/// configuration is invalid (e.g. no tenant).
pub async fn load_config(cli: &DaemonCli) -> Result<BefwConfig> {
    let mut config = BefwConfig::from_file(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
    config.apply_env_overrides();
    apply_cli_overrides(&mut config, cli);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;
    Ok(config)
}

/// Apply CLI flag overrides on top of file and environment settings.
pub fn apply_cli_overrides(config: &mut BefwConfig, cli: &DaemonCli) {
    if let Some(tenant) = &cli.tenant {
        config.agent.tenant = tenant.clone();
    }
    if let Some(url) = &cli.server_url {
        config.agent.server_url = url.clone();
    }
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(pid_file) = &cli.pid_file {
        config.general.pid_file = pid_file.clone();
    }
}

/// The main daemon orchestrator.
pub struct Orchestrator<D: FilterDriver, C: ControlPlane> {
    config: BefwConfig,
    agent: FirewallAgent<D, C>,
    shutdown_tx: broadcast::Sender<()>,
    start_time: Instant,
}

impl Orchestrator<IptablesDriver, HttpControlPlane> {
    /// Build the production orchestrator: native iptables driver and HTTP
    /// control-plane client.
    ///
    /// Installs the metrics recorder first when `[metrics].enabled`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, iptables is not
    /// available, or the HTTP client cannot be created.
    pub fn from_config(config: BefwConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let driver = IptablesDriver::new()
            .map_err(|e| anyhow::anyhow!("failed to initialize iptables driver: {}", e))?;

        // 요청 타임아웃은 각 루프의 주기와 같음
        let agent_config = AgentConfig::from_core(&config);
        let client = HttpControlPlane::new(
            agent_config.server_url.clone(),
            agent_config.compress_requests,
            agent_config.poll_interval(),
            agent_config.report_interval(),
        )
        .map_err(|e| anyhow::anyhow!("failed to create control plane client: {}", e))?;

        Self::build(config, Arc::new(driver), Arc::new(client))
    }
}

impl<D: FilterDriver, C: ControlPlane> Orchestrator<D, C> {
    /// Assemble the agent from an already-validated configuration and the
    /// given collaborators.
    pub fn build(config: BefwConfig, driver: Arc<D>, client: Arc<C>) -> Result<Self> {
        let agent = FirewallAgentBuilder::new()
            .config(AgentConfig::from_core(&config))
            .driver(driver)
            .control_plane(client)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build firewall agent: {}", e))?;

        if config.metrics.enabled {
            record_daemon_metrics();
        }

        let (shutdown_tx, _) = broadcast::channel(4);
        tracing::info!(tenant = %config.agent.tenant, "orchestrator initialized");

        Ok(Self {
            config,
            agent,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Run until SIGTERM or SIGINT.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Start the agent, wait for `shutdown` to resolve, then stop it.
    ///
    /// The PID file (if configured) exists exactly while the agent runs.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let pid_file = self.config.general.pid_file.clone();
        if !pid_file.is_empty() {
            write_pid_file(Path::new(&pid_file))?;
        }

        if let Err(e) = self.agent.start().await {
            tracing::error!(error = %e, "failed to start firewall agent");
            if !pid_file.is_empty() {
                remove_pid_file(Path::new(&pid_file));
            }
            return Err(e.into());
        }

        let uptime_task = self
            .config
            .metrics
            .enabled
            .then(|| spawn_uptime_updater(self.start_time, self.shutdown_tx.subscribe()));

        tracing::info!("befw-daemon running");
        let signal = shutdown.await;
        match &signal {
            Ok(name) => tracing::info!(signal = name, "shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "signal handling failed, shutting down"),
        }

        let _ = self.shutdown_tx.send(());
        if let Some(task) = uptime_task {
            let _ = task.await;
        }

        let stopped = self.agent.stop().await;
        if !pid_file.is_empty() {
            remove_pid_file(Path::new(&pid_file));
        }
        stopped?;
        signal.map(|_| ())
    }

    /// Current health of the daemon.
    pub async fn health(&self) -> DaemonHealth {
        DaemonHealth {
            status: self.agent.health_check().await,
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn agent(&self) -> &FirewallAgent<D, C> {
        &self.agent
    }

    pub fn config(&self) -> &BefwConfig {
        &self.config
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to `path`.
///
/// The file is created with `create_new` so a second instance fails instead
/// of overwriting the first one's PID. Mode is 0o600, parent dirs 0o700.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    if !file.metadata()?.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file",
            path.display()
        ));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    let pid = std::process::id();
    writeln!(file, "{}", pid)?;
    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file. Failure is logged, not returned.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file");
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

fn record_daemon_metrics() {
    use befw_core::metrics as m;
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use befw_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
