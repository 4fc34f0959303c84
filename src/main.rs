use std::sync::Arc;

use anyhow::Context;
use log::{LevelFilter, error, info};

use aux_monitor::config::Config;
use aux_monitor::health::HealthChecker;
use aux_monitor::jobs::HttpJobNotifier;
use aux_monitor::monitor::{AuxMonitor, MonitorSettings};
use aux_monitor::prometheus_metrics::PrometheusMetrics;
use aux_monitor::reporter::{HttpReporter, Reporter};
use aux_monitor::rpc::CoinservRpc;
use aux_monitor::server::StatusServer;
use aux_monitor::wake::{RefreshTrigger, listen_for_signal};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let level = config.log_level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .filter_module("aux_monitor", level)
        .init();

    if !config.enabled {
        info!("{} aux monitor is disabled, exiting", config.currency);
        return Ok(());
    }

    let rpc = Arc::new(CoinservRpc::new(&config.coinserv).context("Failed to build coinserv client")?);
    let jobs = Arc::new(
        HttpJobNotifier::new(&config.currency, config.job_notify_url.clone())
            .context("Failed to build job notifier")?,
    );
    let reporter: Option<Arc<dyn Reporter>> = match (&config.report_url, config.reporting_enabled()) {
        (Some(url), true) => Some(Arc::new(HttpReporter::new(url).context("Failed to build reporter")?)),
        _ => None,
    };
    let metrics = Arc::new(PrometheusMetrics::new());

    let monitor = AuxMonitor::new(
        MonitorSettings::from_config(&config),
        rpc,
        jobs,
        reporter,
        Arc::clone(&metrics),
    );

    let health = Arc::new(HealthChecker::new(Arc::clone(&monitor), metrics, config.clone()));
    let server = StatusServer::new(health, &config.status_bind, config.status_port);
    tokio::spawn(async move {
        if let Err(e) = server.start().await {
            error!("Status server stopped: {}", e);
        }
    });

    let (trigger, triggers) = RefreshTrigger::new();
    if let Some(signum) = config.signal {
        tokio::spawn(listen_for_signal(signum, trigger.clone()));
    }

    info!(
        "Monitoring {} aux work at {} every {}ms (flush={}, send={})",
        config.currency, config.coinserv.redacted_url(), config.work_interval_ms, config.flush, config.send
    );

    tokio::select! {
        _ = Arc::clone(&monitor).run(triggers) => {}
        res = tokio::signal::ctrl_c() => {
            res.context("Failed to listen for ctrl-c")?;
            info!("Shutting down {} aux monitor", config.currency);
        }
    }
    drop(trigger);

    Ok(())
}
