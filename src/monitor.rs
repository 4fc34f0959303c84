//! Aux chain work polling and job regeneration policy.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use primitive_types::U256;
use tokio::time::MissedTickBehavior;

use crate::config::Config;
use crate::error_handling::{RetryPolicy, RpcError};
use crate::jobs::JobManager;
use crate::pow;
use crate::prometheus_metrics::PrometheusMetrics;
use crate::reporter::Reporter;
use crate::rpc::NodeRpc;
use crate::stats::{MonitorStatus, StatsTracker};
use crate::types::{NetworkState, SolutionHandle, WorkDescriptor};
use crate::wake::{RefreshReason, RefreshReceiver, WakeSignal};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub currency: String,
    pub algo: String,
    /// Whether a new aux height asks the job manager to drop issued jobs.
    pub flush: bool,
    /// Whether accepted blocks go to the reporter.
    pub send: bool,
    pub work_interval: Duration,
    pub retry: RetryPolicy,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            currency: config.currency.clone(),
            algo: config.algo.clone(),
            flush: config.flush,
            send: config.send,
            work_interval: config.get_work_interval(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Descriptors still eligible for solutions arriving from outside the process.
const ANNOUNCED_WORK_CAPACITY: usize = 16;

#[derive(Debug, Default)]
struct PollState {
    work: Option<Arc<WorkDescriptor>>,
    net: NetworkState,
    announced: VecDeque<Arc<WorkDescriptor>>,
}

pub struct AuxMonitor {
    pub(crate) settings: MonitorSettings,
    pub(crate) rpc: Arc<dyn NodeRpc>,
    jobmanager: Arc<dyn JobManager>,
    pub(crate) reporter: Option<Arc<dyn Reporter>>,
    pub(crate) stats: StatsTracker,
    pub(crate) metrics: Arc<PrometheusMetrics>,
    wake: WakeSignal,
    state: Mutex<PollState>,
    // serializes timer ticks and out-of-band refreshes
    refresh_lock: tokio::sync::Mutex<()>,
    me: Weak<AuxMonitor>,
}

impl AuxMonitor {
    pub fn new(
        settings: MonitorSettings,
        rpc: Arc<dyn NodeRpc>,
        jobmanager: Arc<dyn JobManager>,
        reporter: Option<Arc<dyn Reporter>>,
        metrics: Arc<PrometheusMetrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            settings,
            rpc,
            jobmanager,
            reporter,
            stats: StatsTracker::new(),
            metrics,
            wake: WakeSignal::new(),
            state: Mutex::new(PollState::default()),
            refresh_lock: tokio::sync::Mutex::new(()),
            me: me.clone(),
        })
    }

    fn state(&self) -> MutexGuard<'_, PollState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn currency(&self) -> &str {
        &self.settings.currency
    }

    /// Snapshot of the aux work last announced, if any.
    pub fn current_work(&self) -> Option<Arc<WorkDescriptor>> {
        self.state().work.clone()
    }

    /// A recently announced descriptor by aux block hash, newest first.
    pub fn work_for_hash(&self, hash: U256) -> Option<Arc<WorkDescriptor>> {
        self.state().announced.iter().rev().find(|work| work.block_hash == hash).cloned()
    }

    pub fn network_state(&self) -> NetworkState {
        self.state().net
    }

    /// Pulsed whenever the node offers new transactions at an unchanged height.
    pub fn wake(&self) -> &WakeSignal {
        &self.wake
    }

    pub fn stats(&self) -> &StatsTracker {
        &self.stats
    }

    pub fn status(&self) -> MonitorStatus {
        let net = self.network_state();
        self.stats.snapshot(&self.settings.currency, net)
    }

    /// Poll on the work interval and whenever a refresh is requested through
    /// `triggers`. Never returns; cancel by dropping the future.
    pub async fn run(self: Arc<Self>, mut triggers: RefreshReceiver) {
        let mut interval = tokio::time::interval(self.settings.work_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut triggers_open = true;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.refresh(None).await;
                }
                reason = triggers.recv(), if triggers_open => match reason {
                    Some(reason) => {
                        self.refresh(Some(reason)).await;
                    }
                    None => {
                        debug!("{} refresh trigger closed, polling on interval only", self.settings.currency);
                        triggers_open = false;
                    }
                },
            }
        }
    }

    /// One poll cycle. Returns false when the cycle was abandoned because
    /// the node could not be queried; nothing is changed in that case.
    pub async fn refresh(&self, reason: Option<RefreshReason>) -> bool {
        let _guard = self.refresh_lock.lock().await;
        let currency = &self.settings.currency;

        if let Some(reason) = &reason {
            info!("Updating {} aux work from a signal received! ({:?})", currency, reason);
        }

        let reply = match self.rpc.get_auxiliary_work().await {
            Ok(reply) => reply,
            Err(e) => return self.abandon_cycle("getauxblock", e).await,
        };
        let Some(hash) = pow::u256_from_be_hex(&reply.hash) else {
            return self
                .abandon_cycle("getauxblock", RpcError::malformed(format!("bad hash {:?}", reply.hash)))
                .await;
        };

        if self.current_work().is_some_and(|work| work.block_hash == hash) {
            return true;
        }

        // The hash moved either because the chain advanced or because the
        // node picked up new transactions; only the height tells which.
        let height = match self.rpc.get_block_count().await {
            Ok(height) => height,
            Err(e) => return self.abandon_cycle("getblockcount", e).await,
        };

        let Some(target) = pow::u256_from_le_hex(&reply.target) else {
            return self
                .abandon_cycle("getauxblock", RpcError::malformed(format!("bad target {:?}", reply.target)))
                .await;
        };
        let difficulty = pow::difficulty(target);

        let work = Arc::new(WorkDescriptor {
            block_hash: hash,
            target,
            chain_id: reply.chain_id,
            chain_type: currency.clone(),
            height,
            merkle_hashes: vec![hash],
            merkle_index: 0,
            found_block: SolutionHandle::new(self.me.clone()),
        });

        let new_height = {
            let mut state = self.state();
            let new_height = state.net.height != Some(height);
            if state.announced.len() == ANNOUNCED_WORK_CAPACITY {
                state.announced.pop_front();
            }
            state.announced.push_back(Arc::clone(&work));
            state.work = Some(Arc::clone(&work));
            state.net = NetworkState {
                difficulty: Some(difficulty),
                height: Some(height),
            };
            new_height
        };

        if new_height {
            self.jobmanager.generate_job(work, true, self.settings.flush).await;
            self.stats.record_work_restart();
        } else {
            self.wake.trigger();
            self.stats.record_new_job();
        }
        self.metrics.record_new_work(new_height, height, difficulty);

        info!(
            "New {} aux work announced! Diff {:.4}. Height {}",
            currency, difficulty, height
        );
        true
    }

    async fn abandon_cycle(&self, method: &str, error: RpcError) -> bool {
        warn!("{} {} failed, skipping poll cycle: {}", self.settings.currency, method, error);
        self.metrics.record_rpc_error();
        tokio::time::sleep(self.settings.retry.poll_backoff).await;
        false
    }
}
