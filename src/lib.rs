pub mod types;
pub mod pow;
pub mod auxpow;
pub mod rpc;
pub mod jobs;
pub mod reporter;
pub mod wake;
pub mod stats;
pub mod monitor;
pub mod submit;
pub mod config;
pub mod prometheus_metrics;
pub mod error_handling;
pub mod health;
pub mod server;
#[cfg(test)]
mod test_utils;
