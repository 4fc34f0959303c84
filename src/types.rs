use std::fmt;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use log::warn;
use primitive_types::U256;
use serde::{Deserialize, Serialize};

use crate::monitor::AuxMonitor;

/// The aux work currently offered by the node. Replaced wholesale on every
/// detected change and shared out as `Arc<WorkDescriptor>` snapshots.
#[derive(Debug, Clone)]
pub struct WorkDescriptor {
    pub block_hash: U256,
    pub target: U256,
    pub chain_id: i64,
    pub chain_type: String,
    pub height: u64,
    /// Leaves of the merged mining tree this chain sits in, and our slot.
    pub merkle_hashes: Vec<U256>,
    pub merkle_index: usize,
    pub found_block: SolutionHandle,
}

impl WorkDescriptor {
    /// Place this chain into a merged tree built by the job manager when
    /// more than one aux chain is mined at once.
    pub fn with_merged_tree(mut self, hashes: Vec<U256>, index: usize) -> Self {
        self.merkle_hashes = hashes;
        self.merkle_index = index;
        self
    }
}

/// Callback handed to the job manager with every descriptor; routes a
/// solved share back into the monitor that announced the work.
#[derive(Clone)]
pub struct SolutionHandle(Weak<AuxMonitor>);

impl SolutionHandle {
    pub fn new(monitor: Weak<AuxMonitor>) -> Self {
        Self(monitor)
    }

    pub async fn submit(&self, found: FoundBlock) -> Option<BlockReport> {
        match self.0.upgrade() {
            Some(monitor) => monitor.found_block(found).await,
            None => {
                warn!("Aux monitor dropped before block at height {} could be submitted", found.work.height + 1);
                None
            }
        }
    }
}

impl fmt::Debug for SolutionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SolutionHandle")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkState {
    pub difficulty: Option<f64>,
    pub height: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockStats {
    pub accepts: u64,
    pub rejects: u64,
    pub solves: u64,
    pub last_solve_height: Option<u64>,
    pub last_solve_time: Option<DateTime<Utc>>,
    pub last_solve_worker: Option<String>,
    pub last_solve_hash: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentBlock {
    pub height: u64,
    pub timestamp: i64,
}

/// A solution found by a miner for a job that embedded aux work.
#[derive(Debug, Clone)]
pub struct FoundBlock {
    pub address: String,
    pub worker: String,
    /// Serialized 80-byte parent block header.
    pub header: Vec<u8>,
    pub coinbase_raw: Vec<u8>,
    /// Merkle branch of the coinbase inside the parent block.
    pub coinbase_branch: Vec<[u8; 32]>,
    pub work: Arc<WorkDescriptor>,
    pub start: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockReport {
    pub address: String,
    pub height: u64,
    pub total_subsidy: i64,
    pub fees: i64,
    pub hex_bits: String,
    pub hash: String,
    pub merged: String,
    pub algo: String,
    pub worker: String,
}

/// Raw `getauxblock` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuxWorkReply {
    pub hash: String,
    #[serde(rename = "chainid")]
    pub chain_id: i64,
    #[serde(alias = "_target")]
    pub target: String,
}
