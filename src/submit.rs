//! Getting a solved aux block accepted by the node, and reporting it.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::auxpow::{AuxProofOfWork, aux_hash_hex};
use crate::error_handling::SolutionError;
use crate::monitor::AuxMonitor;
use crate::pow;
use crate::rpc::BlockReply;
use crate::types::{BlockReport, FoundBlock, WorkDescriptor};

/// Amount and fee value used when the real figure is unknown.
const UNKNOWN: i64 = -1;

/// A solved share posted by a solution detector running outside this
/// process. Byte fields are hex; branch hashes are in serialization order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionRequest {
    /// Aux block hash of the work the share was mined against, as announced.
    pub aux_hash: String,
    pub address: String,
    pub worker: String,
    pub header: String,
    pub coinbase: String,
    #[serde(default)]
    pub coinbase_branch: Vec<String>,
}

impl SolutionRequest {
    pub fn into_found_block(self, work: Arc<WorkDescriptor>) -> Result<FoundBlock, SolutionError> {
        let header = hex::decode(&self.header).map_err(|_| SolutionError::BadHex("header"))?;
        let coinbase_raw = hex::decode(&self.coinbase).map_err(|_| SolutionError::BadHex("coinbase"))?;
        let coinbase_branch = self
            .coinbase_branch
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let bytes = hex::decode(h).map_err(|_| SolutionError::BadHex("coinbase_branch"))?;
                <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| SolutionError::BranchLength(i))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FoundBlock {
            address: self.address,
            worker: self.worker,
            header,
            coinbase_raw,
            coinbase_branch,
            work,
            start: Utc::now(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    pub accepted: bool,
    pub attempts: u32,
    pub report: Option<BlockReport>,
}

impl AuxMonitor {
    /// Submit a solution for the aux work it was found against. The report
    /// is returned when the block was accepted and reporting is enabled.
    pub async fn found_block(&self, found: FoundBlock) -> Option<BlockReport> {
        self.settle_block(found).await.report
    }

    /// Entry point for solutions detected outside the process. The share is
    /// matched to a recently announced descriptor by its aux hash.
    pub async fn submit_solution(&self, request: SolutionRequest) -> Result<SubmitOutcome, SolutionError> {
        let hash = pow::u256_from_be_hex(&request.aux_hash).ok_or(SolutionError::BadHex("aux_hash"))?;
        let work = self
            .work_for_hash(hash)
            .ok_or_else(|| SolutionError::UnknownWork(request.aux_hash.clone()))?;
        let found = request.into_found_block(work)?;
        Ok(self.settle_block(found).await)
    }

    /// The solve is always accounted as exactly one accept or one reject.
    pub async fn settle_block(&self, found: FoundBlock) -> SubmitOutcome {
        let currency = &self.settings.currency;
        let new_height = found.work.height + 1;

        self.stats.record_solve();
        self.metrics.record_solve();
        info!("New {} Aux block at height {}", currency, new_height);

        let (accepted, attempts) = match AuxProofOfWork::build(&found) {
            Ok(auxpow) => {
                let hash_hex = aux_hash_hex(found.work.block_hash);
                self.submit_with_retries(&hash_hex, &auxpow.to_hex(), new_height).await
            }
            Err(e) => {
                error!("{} aux proof-of-work could not be built: {}", currency, e);
                (false, 0)
            }
        };

        if !accepted {
            error!("{} Aux block at height {} was not accepted after {} attempts", currency, new_height, attempts);
            self.stats.record_reject();
        }
        self.metrics.record_outcome(accepted, attempts);
        self.stats
            .record_last_solve(new_height, format!("{}.{}", found.address, found.worker), Utc::now());
        debug!(
            "{} solve at height {} settled {}ms after it was found",
            currency,
            new_height,
            (Utc::now() - found.start).num_milliseconds()
        );

        let report = match &self.reporter {
            Some(reporter) if accepted && self.settings.send => {
                info!("Submitting {} new block to reporter", currency);
                let report = self.assemble_report(&found, new_height).await;
                reporter.report_block(&report).await;
                Some(report)
            }
            _ => None,
        };

        SubmitOutcome { accepted, attempts, report }
    }

    /// Returns whether the node accepted the block and how many attempts it took.
    async fn submit_with_retries(&self, hash_hex: &str, auxpow_hex: &str, new_height: u64) -> (bool, u32) {
        let currency = &self.settings.currency;
        let max_attempts = self.settings.retry.submit_attempts;

        for attempt in 1..=max_attempts {
            match self.rpc.submit_auxiliary_block(hash_hex, auxpow_hex).await {
                Ok(true) => {
                    info!("NEW {} Aux BLOCK ACCEPTED!!!", currency);
                    self.stats.record_accept(new_height, Utc::now().timestamp());
                    return (true, attempt);
                }
                Ok(false) => error!(
                    "{} Aux Block failed to submit to the server, server returned false! (attempt {}/{})",
                    currency, attempt, max_attempts
                ),
                Err(e) => {
                    self.metrics.record_rpc_error();
                    error!(
                        "{} Aux block failed to submit to the server: {} (attempt {}/{})",
                        currency, e, attempt, max_attempts
                    );
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.settings.retry.submit_delay).await;
            }
        }

        (false, max_attempts)
    }

    /// Best-effort lookup of what the node recorded for our block. Each
    /// lookup falls back to a default on its own.
    async fn assemble_report(&self, found: &FoundBlock, new_height: u64) -> BlockReport {
        let currency = &self.settings.currency;

        let hash = match self.rpc.get_block_hash(new_height).await {
            Ok(hash) => Some(hash),
            Err(e) => {
                info!("{} block hash lookup at height {} failed: {}", currency, new_height, e);
                None
            }
        };

        let block: Option<BlockReply> = match &hash {
            Some(hash) => match self.rpc.get_block(hash).await {
                Ok(block) => Some(block),
                Err(e) => {
                    info!("{} block lookup for {} failed: {}", currency, hash, e);
                    None
                }
            },
            None => None,
        };

        let amount = match block.as_ref().and_then(|b| b.tx.first()) {
            Some(txid) => match self.rpc.get_transaction(txid).await {
                Ok(tx) => {
                    let amount = tx.details.first().map(|d| d.amount);
                    if amount.is_none() {
                        warn!("{} coinbase {} carries no payout details", currency, txid);
                    }
                    amount
                }
                Err(e) => {
                    info!("{} coinbase lookup for {} failed: {}", currency, txid, e);
                    None
                }
            },
            None => None,
        };

        let hash = hash.unwrap_or_default();
        self.stats.record_last_solve_hash(hash.clone());

        BlockReport {
            address: found.address.clone(),
            height: new_height,
            total_subsidy: amount.map(|a| (a * 100_000_000.0).round() as i64).unwrap_or(UNKNOWN),
            fees: UNKNOWN,
            hex_bits: pow::hex_bits(found.work.target),
            hash,
            merged: currency.clone(),
            algo: self.settings.algo.clone(),
            worker: found.worker.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::error_handling::RpcError;
    use crate::stats::RECENT_BLOCKS_CAPACITY;
    use crate::test_utils::{
        MockRpc, RecordingJobManager, RecordingReporter, aux_reply, descriptor, found_block, monitor, settings,
    };
    use crate::types::RecentBlock;

    fn assert_balanced(mon: &crate::monitor::AuxMonitor) {
        let stats = mon.stats().block_stats();
        assert_eq!(stats.accepts + stats.rejects, stats.solves);
    }

    #[tokio::test(start_paused = true)]
    async fn end_to_end_poll_then_accept_on_third_attempt() {
        let rpc = MockRpc::new();
        let jobs = RecordingJobManager::new();
        let reporter = RecordingReporter::new();
        let mon = monitor(settings(true, true), rpc.clone(), jobs.clone(), Some(reporter.clone()));

        rpc.push_work(Ok(aux_reply(0xAA)));
        rpc.push_count(Ok(100));
        mon.refresh(None).await;
        let restarts = mon.stats().work_restarts().total;
        let new_jobs = mon.stats().new_jobs().total;
        let job_calls = jobs.calls().len();

        rpc.push_work(Ok(aux_reply(0xAA)));
        mon.refresh(None).await;
        assert_eq!(jobs.calls().len(), job_calls);

        rpc.push_work(Ok(aux_reply(0xBB)));
        rpc.push_count(Ok(101));
        mon.refresh(None).await;
        let work = mon.current_work().unwrap();
        assert_eq!(work.height, 101);
        assert_eq!(jobs.calls().len(), job_calls + 1);
        assert_eq!(jobs.calls().last(), Some(&(true, true)));
        assert_eq!(mon.stats().work_restarts().total, restarts + 1);
        assert_eq!(mon.stats().new_jobs().total, new_jobs + 1);

        rpc.push_submission(Ok(false));
        rpc.push_submission(Err(RpcError::Http(503)));
        rpc.push_submission(Ok(true));
        let started = tokio::time::Instant::now();
        let report = mon.found_block(found_block(work)).await.unwrap();

        assert_eq!(rpc.calls_to("submitauxblock"), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
        let stats = mon.stats().block_stats();
        assert_eq!((stats.solves, stats.accepts, stats.rejects), (1, 1, 0));
        assert_eq!(stats.last_solve_height, Some(102));
        assert_eq!(stats.last_solve_worker.as_deref(), Some("mwT5FhANpkurDKBVXVyAH1b6T3rz9T1owr.rig1"));

        let recent = mon.stats().recent_blocks();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].height, 102);

        assert_eq!(report.height, 102);
        assert_eq!(report.total_subsidy, 5_000_000_000);
        assert_eq!(report.fees, -1);
        assert_eq!(report.hex_bits, "1D00FFFF");
        assert_eq!(report.merged, "NMC");
        assert_eq!(reporter.reports(), vec![report]);

        let (hash_hex, _) = rpc.submitted.lock().unwrap()[0].clone();
        assert_eq!(hash_hex, format!("{:064x}", 0xBB));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_record_a_reject() {
        let rpc = MockRpc::new();
        let reporter = RecordingReporter::new();
        let mon = monitor(settings(false, true), rpc.clone(), RecordingJobManager::new(), Some(reporter.clone()));

        for _ in 0..5 {
            rpc.push_submission(Err(RpcError::Node { code: -1, message: "bad-auxpow".into() }));
        }
        // a sixth reply that must never be consumed
        rpc.push_submission(Ok(true));

        let report = mon.found_block(found_block(descriptor(0xBB, 101))).await;
        assert!(report.is_none());
        assert_eq!(rpc.calls_to("submitauxblock"), 5);

        let stats = mon.stats().block_stats();
        assert_eq!((stats.solves, stats.accepts, stats.rejects), (1, 0, 1));
        assert_eq!(stats.last_solve_height, Some(102));
        assert!(mon.stats().recent_blocks().is_empty());
        assert!(reporter.reports().is_empty());
        assert_balanced(&mon);
    }

    #[tokio::test(start_paused = true)]
    async fn falsy_replies_are_retried() {
        let rpc = MockRpc::new();
        let mon = monitor(settings(false, false), rpc.clone(), RecordingJobManager::new(), None);

        rpc.push_submission(Ok(false));
        rpc.push_submission(Ok(true));
        mon.found_block(found_block(descriptor(0xBB, 101))).await;

        assert_eq!(rpc.calls_to("submitauxblock"), 2);
        assert_eq!(mon.stats().block_stats().accepts, 1);
        assert_eq!(rpc.calls_to("getblockhash"), 0, "reporting disabled");
        assert_balanced(&mon);
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_failures_default_report_fields() {
        let rpc = MockRpc::new();
        let reporter = RecordingReporter::new();
        let mon = monitor(settings(false, true), rpc.clone(), RecordingJobManager::new(), Some(reporter.clone()));

        rpc.fail_block.store(true, Ordering::Relaxed);
        rpc.push_submission(Ok(true));
        let report = mon.found_block(found_block(descriptor(0xBB, 101))).await.unwrap();

        assert_eq!(report.hash, format!("{:064x}", 102));
        assert_eq!(report.total_subsidy, -1);
        assert_eq!(report.fees, -1);
        assert_eq!(rpc.calls_to("gettransaction"), 0);
        assert_eq!(reporter.reports().len(), 1);

        let stats = mon.stats().block_stats();
        assert_eq!((stats.accepts, stats.rejects), (1, 0));
        assert_eq!(stats.last_solve_hash, Some(report.hash));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_block_hash_still_reports() {
        let rpc = MockRpc::new();
        let reporter = RecordingReporter::new();
        let mon = monitor(settings(false, true), rpc.clone(), RecordingJobManager::new(), Some(reporter.clone()));

        rpc.fail_block_hash.store(true, Ordering::Relaxed);
        rpc.push_submission(Ok(true));
        let report = mon.found_block(found_block(descriptor(0xBB, 101))).await.unwrap();

        assert_eq!(report.hash, "");
        assert_eq!(report.total_subsidy, -1);
        assert_eq!(rpc.calls_to("getblock"), 0);
        assert_eq!(mon.stats().block_stats().accepts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transaction_failure_keeps_hash() {
        let rpc = MockRpc::new();
        let reporter = RecordingReporter::new();
        let mon = monitor(settings(false, true), rpc.clone(), RecordingJobManager::new(), Some(reporter.clone()));

        rpc.fail_transaction.store(true, Ordering::Relaxed);
        rpc.push_submission(Ok(true));
        let report = mon.found_block(found_block(descriptor(0xBB, 101))).await.unwrap();

        assert_eq!(report.hash, format!("{:064x}", 102));
        assert_eq!(report.total_subsidy, -1);
        assert_eq!(report.fees, -1);
    }

    #[tokio::test(start_paused = true)]
    async fn reported_amount_is_in_base_units() {
        let rpc = MockRpc::new();
        let mon = monitor(settings(false, true), rpc.clone(), RecordingJobManager::new(), Some(RecordingReporter::new()));

        *rpc.amount.lock().unwrap() = Some(0.1);
        rpc.push_submission(Ok(true));
        let report = mon.found_block(found_block(descriptor(0xBB, 101))).await.unwrap();
        assert_eq!(report.total_subsidy, 10_000_000);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_solution_is_a_reject_without_submission() {
        let rpc = MockRpc::new();
        let mon = monitor(settings(false, true), rpc.clone(), RecordingJobManager::new(), None);

        let mut found = found_block(descriptor(0xBB, 101));
        found.header.truncate(40);
        assert!(mon.found_block(found).await.is_none());

        assert_eq!(rpc.calls_to("submitauxblock"), 0);
        let stats = mon.stats().block_stats();
        assert_eq!((stats.solves, stats.rejects), (1, 1));
        assert_eq!(stats.last_solve_height, Some(102));
    }

    #[tokio::test(start_paused = true)]
    async fn recent_blocks_keep_last_fifteen() {
        let rpc = MockRpc::new();
        let mon = monitor(settings(false, false), rpc.clone(), RecordingJobManager::new(), None);

        for height in 0..16u64 {
            rpc.push_submission(Ok(true));
            mon.found_block(found_block(descriptor(0xBB, height))).await;
        }

        let recent: Vec<RecentBlock> = mon.stats().recent_blocks();
        assert_eq!(recent.len(), RECENT_BLOCKS_CAPACITY);
        assert_eq!(recent.first().map(|b| b.height), Some(2));
        assert_eq!(recent.last().map(|b| b.height), Some(16));
        assert_eq!(mon.stats().block_stats().accepts, 16);
        assert_balanced(&mon);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_uses_solve_time_snapshot() {
        let rpc = MockRpc::new();
        let jobs = RecordingJobManager::new();
        let mon = monitor(settings(false, false), rpc.clone(), jobs, None);

        rpc.push_work(Ok(aux_reply(0xAA)));
        rpc.push_count(Ok(100));
        mon.refresh(None).await;
        let solved_on = mon.current_work().unwrap();

        // work moves on before the solution is submitted
        rpc.push_work(Ok(aux_reply(0xCC)));
        rpc.push_count(Ok(101));
        mon.refresh(None).await;

        rpc.push_submission(Ok(true));
        mon.found_block(found_block(Arc::clone(&solved_on))).await;

        let (hash_hex, _) = rpc.submitted.lock().unwrap()[0].clone();
        assert_eq!(hash_hex, format!("{:064x}", 0xAA));
        assert_eq!(mon.stats().block_stats().last_solve_height, Some(101));
    }

    fn solution(aux_hash: u64) -> SolutionRequest {
        SolutionRequest {
            aux_hash: format!("{:064x}", aux_hash),
            address: "mwT5FhANpkurDKBVXVyAH1b6T3rz9T1owr".into(),
            worker: "rig2".into(),
            header: hex::encode([0x11u8; 80]),
            coinbase: "01000000010000".into(),
            coinbase_branch: vec![hex::encode([0x22u8; 32])],
        }
    }

    #[tokio::test(start_paused = true)]
    async fn posted_solution_settles_against_announced_work() {
        let rpc = MockRpc::new();
        let reporter = RecordingReporter::new();
        let mon = monitor(settings(false, true), rpc.clone(), RecordingJobManager::new(), Some(reporter.clone()));

        rpc.push_work(Ok(aux_reply(0xAA)));
        rpc.push_count(Ok(100));
        mon.refresh(None).await;
        rpc.push_work(Ok(aux_reply(0xAB)));
        rpc.push_count(Ok(100));
        mon.refresh(None).await;

        // mined against the older descriptor at the same height
        rpc.push_submission(Ok(false));
        rpc.push_submission(Ok(true));
        let outcome = mon.submit_solution(solution(0xAA)).await.unwrap();

        assert!(outcome.accepted);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.report.as_ref().map(|r| r.worker.as_str()), Some("rig2"));
        assert_eq!(reporter.reports().len(), 1);

        let (hash_hex, auxpow_hex) = rpc.submitted.lock().unwrap()[0].clone();
        assert_eq!(hash_hex, format!("{:064x}", 0xAA));
        assert!(auxpow_hex.starts_with("01000000010000"));
        let stats = mon.stats().block_stats();
        assert_eq!((stats.solves, stats.accepts, stats.rejects), (1, 1, 0));
        assert_eq!(stats.last_solve_height, Some(101));
    }

    #[tokio::test(start_paused = true)]
    async fn posted_solution_for_unknown_work_is_refused() {
        let rpc = MockRpc::new();
        let mon = monitor(settings(false, true), rpc.clone(), RecordingJobManager::new(), None);

        let err = mon.submit_solution(solution(0xEE)).await.unwrap_err();
        assert_eq!(err, SolutionError::UnknownWork(format!("{:064x}", 0xEE)));
        assert_eq!(mon.stats().block_stats().solves, 0);
        assert_eq!(rpc.calls_to("submitauxblock"), 0);
    }

    #[test]
    fn malformed_solution_fields_are_named() {
        let work = descriptor(0xBB, 101);

        let mut bad = solution(0xBB);
        bad.header = "zz".into();
        assert_eq!(bad.into_found_block(Arc::clone(&work)).unwrap_err(), SolutionError::BadHex("header"));

        let mut short = solution(0xBB);
        short.coinbase_branch.push("abcd".into());
        assert_eq!(short.into_found_block(Arc::clone(&work)).unwrap_err(), SolutionError::BranchLength(1));

        let found = solution(0xBB).into_found_block(work).unwrap();
        assert_eq!(found.header.len(), 80);
        assert_eq!(found.coinbase_branch, vec![[0x22u8; 32]]);
    }
}
