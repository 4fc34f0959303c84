//! Scripted collaborators for exercising the monitor without a node.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use chrono::Utc;
use primitive_types::U256;

use crate::auxpow::{aux_hash_hex, u256_to_le_bytes};
use crate::error_handling::{RetryPolicy, RpcError};
use crate::jobs::JobManager;
use crate::monitor::{AuxMonitor, MonitorSettings};
use crate::prometheus_metrics::PrometheusMetrics;
use crate::reporter::Reporter;
use crate::rpc::{BlockReply, NodeRpc, RpcResult, TransactionReply, TxDetail};
use crate::types::{AuxWorkReply, BlockReport, FoundBlock, SolutionHandle, WorkDescriptor};

pub fn diff1_target() -> U256 {
    U256::from(0xffffu64) << 208
}

pub fn aux_reply(hash: u64) -> AuxWorkReply {
    AuxWorkReply {
        hash: aux_hash_hex(U256::from(hash)),
        chain_id: 1,
        target: hex::encode(u256_to_le_bytes(diff1_target())),
    }
}

pub fn descriptor(hash: u64, height: u64) -> Arc<WorkDescriptor> {
    Arc::new(WorkDescriptor {
        block_hash: U256::from(hash),
        target: diff1_target(),
        chain_id: 1,
        chain_type: "NMC".into(),
        height,
        merkle_hashes: vec![U256::from(hash)],
        merkle_index: 0,
        found_block: SolutionHandle::new(Weak::new()),
    })
}

pub fn found_block(work: Arc<WorkDescriptor>) -> FoundBlock {
    FoundBlock {
        address: "mwT5FhANpkurDKBVXVyAH1b6T3rz9T1owr".into(),
        worker: "rig1".into(),
        header: vec![0x11; 80],
        coinbase_raw: vec![0x01, 0x00, 0x00, 0x00, 0x01, 0xff],
        coinbase_branch: vec![[0x22; 32]],
        work,
        start: Utc::now(),
    }
}

/// Node double: each call pops the next scripted reply. Unscripted work
/// and height calls fail, unscripted submissions are refused.
#[derive(Default)]
pub struct MockRpc {
    pub aux_work: Mutex<VecDeque<RpcResult<AuxWorkReply>>>,
    pub block_counts: Mutex<VecDeque<RpcResult<u64>>>,
    pub submissions: Mutex<VecDeque<RpcResult<bool>>>,
    pub fail_block_hash: AtomicBool,
    pub fail_block: AtomicBool,
    pub fail_transaction: AtomicBool,
    pub amount: Mutex<Option<f64>>,
    pub calls: Mutex<Vec<String>>,
    pub submitted: Mutex<Vec<(String, String)>>,
}

impl MockRpc {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_work(&self, reply: RpcResult<AuxWorkReply>) {
        self.aux_work.lock().unwrap().push_back(reply);
    }

    pub fn push_count(&self, reply: RpcResult<u64>) {
        self.block_counts.lock().unwrap().push_back(reply);
    }

    pub fn push_submission(&self, reply: RpcResult<bool>) {
        self.submissions.lock().unwrap().push_back(reply);
    }

    pub fn calls_to(&self, method: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|m| *m == method).count()
    }

    fn log(&self, method: &str) {
        self.calls.lock().unwrap().push(method.to_string());
    }
}

fn unscripted(method: &str) -> RpcError {
    RpcError::malformed(format!("{method}: no scripted reply"))
}

#[async_trait]
impl NodeRpc for MockRpc {
    async fn get_auxiliary_work(&self) -> RpcResult<AuxWorkReply> {
        self.log("getauxblock");
        self.aux_work.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted("getauxblock")))
    }

    async fn get_block_count(&self) -> RpcResult<u64> {
        self.log("getblockcount");
        self.block_counts.lock().unwrap().pop_front().unwrap_or_else(|| Err(unscripted("getblockcount")))
    }

    async fn submit_auxiliary_block(&self, hash_hex: &str, auxpow_hex: &str) -> RpcResult<bool> {
        self.log("submitauxblock");
        self.submitted.lock().unwrap().push((hash_hex.to_string(), auxpow_hex.to_string()));
        self.submissions.lock().unwrap().pop_front().unwrap_or(Ok(false))
    }

    async fn get_block_hash(&self, height: u64) -> RpcResult<String> {
        self.log("getblockhash");
        if self.fail_block_hash.load(Ordering::Relaxed) {
            return Err(RpcError::Node { code: -8, message: "Block height out of range".into() });
        }
        Ok(format!("{:064x}", height))
    }

    async fn get_block(&self, hash: &str) -> RpcResult<BlockReply> {
        self.log("getblock");
        if self.fail_block.load(Ordering::Relaxed) {
            return Err(RpcError::Node { code: -5, message: "Block not found".into() });
        }
        Ok(BlockReply { hash: hash.to_string(), tx: vec![format!("cb{hash}")] })
    }

    async fn get_transaction(&self, _txid: &str) -> RpcResult<TransactionReply> {
        self.log("gettransaction");
        if self.fail_transaction.load(Ordering::Relaxed) {
            return Err(RpcError::Node { code: -5, message: "Invalid or non-wallet transaction id".into() });
        }
        let amount = self.amount.lock().unwrap().unwrap_or(50.0);
        Ok(TransactionReply { details: vec![TxDetail { amount, category: Some("immature".into()) }] })
    }
}

#[derive(Default)]
pub struct RecordingJobManager {
    pub calls: Mutex<Vec<(bool, bool)>>,
    pub works: Mutex<Vec<Arc<WorkDescriptor>>>,
}

impl RecordingJobManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<(bool, bool)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn works(&self) -> Vec<Arc<WorkDescriptor>> {
        self.works.lock().unwrap().clone()
    }
}

#[async_trait]
impl JobManager for RecordingJobManager {
    async fn generate_job(&self, work: Arc<WorkDescriptor>, push: bool, flush: bool) {
        self.works.lock().unwrap().push(work);
        self.calls.lock().unwrap().push((push, flush));
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    pub reports: Mutex<Vec<BlockReport>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<BlockReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reporter for RecordingReporter {
    async fn report_block(&self, report: &BlockReport) {
        self.reports.lock().unwrap().push(report.clone());
    }
}

pub fn settings(flush: bool, send: bool) -> MonitorSettings {
    MonitorSettings {
        currency: "NMC".into(),
        algo: "sha256d".into(),
        flush,
        send,
        work_interval: std::time::Duration::from_secs(3600),
        retry: RetryPolicy::default(),
    }
}

pub fn monitor(
    settings: MonitorSettings,
    rpc: Arc<MockRpc>,
    jobs: Arc<RecordingJobManager>,
    reporter: Option<Arc<RecordingReporter>>,
) -> Arc<AuxMonitor> {
    AuxMonitor::new(
        settings,
        rpc,
        jobs,
        reporter.map(|r| r as Arc<dyn Reporter>),
        Arc::new(PrometheusMetrics::new()),
    )
}
