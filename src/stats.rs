use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::types::{BlockStats, NetworkState, RecentBlock};

pub const RECENT_BLOCKS_CAPACITY: usize = 15;
const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSummary {
    pub total: u64,
    pub last_minute: u64,
}

/// Cumulative count plus the number of events inside the trailing minute.
#[derive(Debug, Default)]
pub struct OneMinuteCounter {
    total: u64,
    events: VecDeque<Instant>,
}

impl OneMinuteCounter {
    pub fn incr(&mut self) {
        let now = Instant::now();
        self.prune(now);
        self.total += 1;
        self.events.push_back(now);
    }

    pub fn summary(&mut self) -> WindowSummary {
        self.prune(Instant::now());
        WindowSummary {
            total: self.total,
            last_minute: self.events.len() as u64,
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.events.front() {
            if now.duration_since(*oldest) >= WINDOW {
                self.events.pop_front();
            } else {
                break;
            }
        }
    }
}

/// FIFO of the last accepted blocks; the oldest entry falls off.
#[derive(Debug, Clone, Default)]
pub struct RecentBlocks {
    blocks: VecDeque<RecentBlock>,
}

impl RecentBlocks {
    pub fn push(&mut self, block: RecentBlock) {
        if self.blocks.len() == RECENT_BLOCKS_CAPACITY {
            self.blocks.pop_front();
        }
        self.blocks.push_back(block);
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn to_vec(&self) -> Vec<RecentBlock> {
        self.blocks.iter().copied().collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorStatus {
    pub currency: String,
    pub current_height: Option<u64>,
    pub block_stats: BlockStats,
    pub current_net: NetworkState,
    pub work_restarts: WindowSummary,
    pub new_jobs: WindowSummary,
    pub recent_blocks: Vec<RecentBlock>,
}

#[derive(Debug, Default)]
struct Counters {
    work_restarts: OneMinuteCounter,
    new_jobs: OneMinuteCounter,
}

#[derive(Debug, Default)]
struct Blocks {
    stats: BlockStats,
    recent: RecentBlocks,
}

/// Accounting shared by the poll loop and the submission protocol. Locks
/// are never held across an await.
#[derive(Debug, Default)]
pub struct StatsTracker {
    counters: Mutex<Counters>,
    blocks: Mutex<Blocks>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn blocks(&self) -> MutexGuard<'_, Blocks> {
        self.blocks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_work_restart(&self) {
        let mut counters = self.counters();
        counters.work_restarts.incr();
        counters.new_jobs.incr();
    }

    pub fn record_new_job(&self) {
        let mut counters = self.counters();
        counters.new_jobs.incr();
    }

    pub fn record_solve(&self) {
        let mut blocks = self.blocks();
        blocks.stats.solves += 1;
    }

    pub fn record_accept(&self, height: u64, timestamp: i64) {
        let mut blocks = self.blocks();
        blocks.stats.accepts += 1;
        blocks.recent.push(RecentBlock { height, timestamp });
    }

    pub fn record_reject(&self) {
        let mut blocks = self.blocks();
        blocks.stats.rejects += 1;
    }

    pub fn record_last_solve(&self, height: u64, worker: String, at: DateTime<Utc>) {
        let mut blocks = self.blocks();
        blocks.stats.last_solve_height = Some(height);
        blocks.stats.last_solve_worker = Some(worker);
        blocks.stats.last_solve_time = Some(at);
    }

    pub fn record_last_solve_hash(&self, hash: String) {
        let mut blocks = self.blocks();
        blocks.stats.last_solve_hash = Some(hash);
    }

    pub fn block_stats(&self) -> BlockStats {
        self.blocks().stats.clone()
    }

    pub fn recent_blocks(&self) -> Vec<RecentBlock> {
        self.blocks().recent.to_vec()
    }

    pub fn work_restarts(&self) -> WindowSummary {
        self.counters().work_restarts.summary()
    }

    pub fn new_jobs(&self) -> WindowSummary {
        self.counters().new_jobs.summary()
    }

    pub fn snapshot(&self, currency: &str, current_net: NetworkState) -> MonitorStatus {
        let (block_stats, recent_blocks) = {
            let blocks = self.blocks();
            (blocks.stats.clone(), blocks.recent.to_vec())
        };
        let (work_restarts, new_jobs) = {
            let mut counters = self.counters();
            (counters.work_restarts.summary(), counters.new_jobs.summary())
        };

        MonitorStatus {
            currency: currency.to_string(),
            current_height: current_net.height,
            block_stats,
            current_net,
            work_restarts,
            new_jobs,
            recent_blocks,
        }
    }
}
