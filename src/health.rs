use std::sync::Arc;
use crate::config::Config;
use crate::error_handling::SolutionError;
use crate::monitor::AuxMonitor;
use crate::prometheus_metrics::PrometheusMetrics;
use crate::stats::MonitorStatus;
use crate::submit::{SolutionRequest, SubmitOutcome};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Aux work has been fetched from the node.
    Healthy,
    /// No work seen yet; the node may be down or still syncing.
    Waiting,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Waiting => write!(f, "waiting"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub currency: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigSummary {
    pub work_interval_ms: u64,
    pub coinserv_url: String,
    pub flush: bool,
    pub send: bool,
    pub signal: Option<i32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: MonitorStatus,
    pub config_summary: ConfigSummary,
}

pub struct HealthChecker {
    monitor: Arc<AuxMonitor>,
    metrics: Arc<PrometheusMetrics>,
    config: Config,
    start_time: std::time::Instant,
}

impl HealthChecker {
    pub fn new(monitor: Arc<AuxMonitor>, metrics: Arc<PrometheusMetrics>, config: Config) -> Self {
        Self {
            monitor,
            metrics,
            config,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn health_status(&self) -> HealthStatus {
        if self.monitor.current_work().is_some() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Waiting
        }
    }

    pub fn get_health(&self) -> HealthResponse {
        HealthResponse {
            status: self.health_status().to_string(),
            currency: self.monitor.currency().to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn get_status(&self) -> StatusResponse {
        StatusResponse {
            status: self.monitor.status(),
            config_summary: ConfigSummary {
                work_interval_ms: self.config.work_interval_ms,
                coinserv_url: self.config.coinserv.redacted_url(),
                flush: self.config.flush,
                send: self.config.send,
                signal: self.config.signal,
            },
        }
    }

    pub fn monitor(&self) -> &Arc<AuxMonitor> {
        &self.monitor
    }

    pub async fn submit_solution(&self, solution: SolutionRequest) -> Result<SubmitOutcome, SolutionError> {
        self.monitor.submit_solution(solution).await
    }

    pub fn metrics_enabled(&self) -> bool {
        self.config.metrics_enabled
    }

    pub fn export_metrics(&self) -> Result<String, std::fmt::Error> {
        self.metrics.export_metrics()
    }
}
