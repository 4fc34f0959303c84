use std::sync::atomic::AtomicU64;

use prometheus_client::{
    encoding::text::encode,
    metrics::{counter::Counter, gauge::Gauge, histogram::Histogram},
    registry::Registry,
};

pub struct PrometheusMetrics {
    registry: Registry,

    // Counters
    solves: Counter,
    accepts: Counter,
    rejects: Counter,
    work_restarts: Counter,
    new_jobs: Counter,
    rpc_errors: Counter,

    // Gauges
    height: Gauge<i64>,
    difficulty: Gauge<f64, AtomicU64>,

    // Histograms
    submit_attempts: Histogram,
}

impl PrometheusMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let solves = Counter::default();
        let accepts = Counter::default();
        let rejects = Counter::default();
        let work_restarts = Counter::default();
        let new_jobs = Counter::default();
        let rpc_errors = Counter::default();

        let height = Gauge::default();
        let difficulty = Gauge::<f64, AtomicU64>::default();

        let submit_attempts = Histogram::new([1.0, 2.0, 3.0, 4.0, 5.0].into_iter());

        registry.register(
            "aux_monitor_solves",
            "Aux block solutions handed to the monitor",
            solves.clone(),
        );
        registry.register(
            "aux_monitor_accepts",
            "Aux blocks accepted by the node",
            accepts.clone(),
        );
        registry.register(
            "aux_monitor_rejects",
            "Aux blocks rejected after exhausting submit attempts",
            rejects.clone(),
        );
        registry.register(
            "aux_monitor_work_restarts",
            "New aux block heights that regenerated jobs",
            work_restarts.clone(),
        );
        registry.register(
            "aux_monitor_new_jobs",
            "Aux work changes observed by polling",
            new_jobs.clone(),
        );
        registry.register(
            "aux_monitor_rpc_errors",
            "Failed calls against the aux node",
            rpc_errors.clone(),
        );
        registry.register(
            "aux_monitor_height",
            "Current aux chain height",
            height.clone(),
        );
        registry.register(
            "aux_monitor_difficulty",
            "Current aux network difficulty",
            difficulty.clone(),
        );
        registry.register(
            "aux_monitor_submit_attempts",
            "Attempts used per aux block submission",
            submit_attempts.clone(),
        );

        Self {
            registry,
            solves,
            accepts,
            rejects,
            work_restarts,
            new_jobs,
            rpc_errors,
            height,
            difficulty,
            submit_attempts,
        }
    }

    pub fn record_solve(&self) {
        self.solves.inc();
    }

    pub fn record_outcome(&self, accepted: bool, attempts: u32) {
        if accepted {
            self.accepts.inc();
        } else {
            self.rejects.inc();
        }
        self.submit_attempts.observe(attempts as f64);
    }

    pub fn record_new_work(&self, restart: bool, height: u64, difficulty: f64) {
        if restart {
            self.work_restarts.inc();
        }
        self.new_jobs.inc();
        self.height.set(height as i64);
        self.difficulty.set(difficulty);
    }

    pub fn record_rpc_error(&self) {
        self.rpc_errors.inc();
    }

    pub fn export_metrics(&self) -> Result<String, std::fmt::Error> {
        let mut buffer = String::new();
        encode(&mut buffer, &self.registry)?;
        Ok(buffer)
    }
}

impl Default for PrometheusMetrics {
    fn default() -> Self {
        Self::new()
    }
}
