//! Boundary to the pool's job manager.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::auxpow::aux_hash_hex;
use crate::types::WorkDescriptor;

/// Whatever builds and ships stratum jobs. Called with the descriptor the
/// monitor has just committed whenever the aux height moves.
#[async_trait]
pub trait JobManager: Send + Sync {
    async fn generate_job(&self, work: Arc<WorkDescriptor>, push: bool, flush: bool);
}

/// Wire form of a `WorkDescriptor`. Hashes and the target are 64-char
/// big-endian hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxWork {
    pub hash: String,
    pub target: String,
    pub chain_id: i64,
    pub chain_type: String,
    pub height: u64,
    pub merkle_hashes: Vec<String>,
    pub merkle_index: usize,
}

impl From<&WorkDescriptor> for AuxWork {
    fn from(work: &WorkDescriptor) -> Self {
        Self {
            hash: aux_hash_hex(work.block_hash),
            target: aux_hash_hex(work.target),
            chain_id: work.chain_id,
            chain_type: work.chain_type.clone(),
            height: work.height,
            merkle_hashes: work.merkle_hashes.iter().map(|h| aux_hash_hex(*h)).collect(),
            merkle_index: work.merkle_index,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateJobRequest {
    pub currency: String,
    pub push: bool,
    pub flush: bool,
    pub work: AuxWork,
}

/// Forwards regeneration requests to an out-of-process job manager over
/// HTTP. Without an endpoint the requests are only logged.
pub struct HttpJobNotifier {
    currency: String,
    url: Option<String>,
    http: Client,
}

impl HttpJobNotifier {
    pub fn new(currency: &str, url: Option<String>) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(Duration::from_secs(5)).build()?;
        Ok(Self {
            currency: currency.to_string(),
            url,
            http,
        })
    }

    pub fn request(&self, work: &WorkDescriptor, push: bool, flush: bool) -> GenerateJobRequest {
        GenerateJobRequest {
            currency: self.currency.clone(),
            push,
            flush,
            work: AuxWork::from(work),
        }
    }
}

#[async_trait]
impl JobManager for HttpJobNotifier {
    async fn generate_job(&self, work: Arc<WorkDescriptor>, push: bool, flush: bool) {
        let request = self.request(&work, push, flush);

        let Some(url) = &self.url else {
            info!(
                "{} job regeneration requested for aux {} at height {} (push={}, flush={})",
                self.currency, request.work.hash, request.work.height, push, flush
            );
            return;
        };

        match self.http.post(url).json(&request).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("{} job regeneration delivered to {}", self.currency, url);
            }
            Ok(resp) => warn!("{} job manager answered {}", self.currency, resp.status()),
            Err(e) => warn!("{} job manager unreachable: {}", self.currency, e),
        }
    }
}
