use std::time::Duration;
use thiserror::Error;

/// Failure talking to the auxiliary chain's node. Every variant is
/// transient from the monitor's point of view.
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("node returned HTTP {0}")]
    Http(u16),
    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },
    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl RpcError {
    pub fn malformed(what: impl Into<String>) -> Self {
        RpcError::Malformed(what.into())
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AuxPowError {
    #[error("parent block header must be 80 bytes, got {0}")]
    HeaderLength(usize),
    #[error("coinbase transaction is empty")]
    EmptyCoinbase,
    #[error("merkle index {index} out of range for {len} hashes")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("merged merkle tree has no hashes")]
    NoHashes,
}

/// A posted solution that cannot be turned into a submission.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SolutionError {
    #[error("{0} is not valid hex")]
    BadHex(&'static str),
    #[error("coinbase branch entry {0} is not 32 bytes")]
    BranchLength(usize),
    #[error("no announced aux work with hash {0}")]
    UnknownWork(String),
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound on `getauxblock` submissions for a single solve.
    pub submit_attempts: u32,
    pub submit_delay: Duration,
    /// Pause after a failed poll before the cycle is abandoned.
    pub poll_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            submit_attempts: 5,
            submit_delay: Duration::from_secs(1),
            poll_backoff: Duration::from_secs(2),
        }
    }
}
