use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use reqwest::Client;

use crate::types::BlockReport;

/// External service that records found blocks. Fire-and-forget: the
/// monitor never acts on the outcome.
#[async_trait]
pub trait Reporter: Send + Sync {
    async fn report_block(&self, report: &BlockReport);
}

pub struct HttpReporter {
    url: String,
    http: Client,
}

impl HttpReporter {
    pub fn new(url: &str) -> Result<Self, reqwest::Error> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { url: url.to_string(), http })
    }
}

#[async_trait]
impl Reporter for HttpReporter {
    async fn report_block(&self, report: &BlockReport) {
        match self.http.post(&self.url).json(report).send().await {
            Ok(resp) if resp.status().is_success() => {
                info!("Reported {} block {} at height {}", report.merged, report.hash, report.height);
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                warn!("Block report for {} height {} refused ({}): {}", report.merged, report.height, status, body);
            }
            Err(e) => warn!("Block report for {} height {} failed: {}", report.merged, report.height, e),
        }
    }
}
