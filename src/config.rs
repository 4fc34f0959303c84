use std::env;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Connection to the aux chain's coin server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoinservConfig {
    pub url: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub timeout_ms: u64,
}

impl CoinservConfig {
    /// The node URL without any `user:pass@`, safe to log or publish.
    pub fn redacted_url(&self) -> String {
        match reqwest::Url::parse(&self.url) {
            Ok(mut parsed) if parsed.has_host() => {
                // only fails for URLs without a host
                let _ = parsed.set_username("");
                let _ = parsed.set_password(None);
                parsed.to_string()
            }
            _ => match self.url.rsplit_once('@') {
                Some((_, host)) => host.to_string(),
                None => self.url.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub enabled: bool,
    pub work_interval_ms: u64,
    /// OS signal number that forces an immediate work refresh.
    pub signal: Option<i32>,
    pub currency: String,
    pub coinserv: CoinservConfig,
    pub flush: bool,
    pub send: bool,
    pub algo: String,

    // Collaborator endpoints
    pub report_url: Option<String>,
    pub job_notify_url: Option<String>,

    // Status surface and logging
    pub status_bind: String,
    pub status_port: u16,
    pub log_level: String,
    pub metrics_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: false,
            work_interval_ms: 1000,
            signal: None,
            currency: String::new(),
            coinserv: CoinservConfig {
                timeout_ms: 5000,
                ..CoinservConfig::default()
            },
            flush: false,
            send: true,
            algo: "scrypt".to_string(),

            report_url: None,
            job_notify_url: None,

            status_bind: "127.0.0.1".to_string(),
            status_port: 8420,
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        // Required configuration
        config.currency = lookup("AUX_CURRENCY")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUX_CURRENCY".to_string()))?;
        config.coinserv.url = lookup("AUX_COINSERV_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("AUX_COINSERV_URL".to_string()))?;

        // Optional configuration with defaults
        if let Some(val) = lookup("AUX_ENABLED") {
            config.enabled = parse_bool("AUX_ENABLED", val)?;
        }

        if let Some(val) = lookup("AUX_WORK_INTERVAL_MS") {
            config.work_interval_ms = val.parse()
                .map_err(|_| ConfigError::InvalidEnvVar("AUX_WORK_INTERVAL_MS".to_string(), val))?;
        }

        if let Some(val) = lookup("AUX_SIGNAL") {
            config.signal = Some(parse_signal(&val)
                .ok_or(ConfigError::InvalidEnvVar("AUX_SIGNAL".to_string(), val))?);
        }

        config.coinserv.username = lookup("AUX_COINSERV_USER");
        config.coinserv.password = lookup("AUX_COINSERV_PASS");

        if let Some(val) = lookup("AUX_COINSERV_TIMEOUT_MS") {
            config.coinserv.timeout_ms = val.parse()
                .map_err(|_| ConfigError::InvalidEnvVar("AUX_COINSERV_TIMEOUT_MS".to_string(), val))?;
        }

        if let Some(val) = lookup("AUX_FLUSH") {
            config.flush = parse_bool("AUX_FLUSH", val)?;
        }

        if let Some(val) = lookup("AUX_SEND") {
            config.send = parse_bool("AUX_SEND", val)?;
        }

        if let Some(val) = lookup("AUX_ALGO") {
            config.algo = val;
        }

        config.report_url = lookup("REPORT_URL");
        config.job_notify_url = lookup("JOB_NOTIFY_URL");

        if let Some(val) = lookup("STATUS_BIND") {
            config.status_bind = val;
        }

        if let Some(val) = lookup("STATUS_PORT") {
            config.status_port = val.parse()
                .map_err(|_| ConfigError::InvalidEnvVar("STATUS_PORT".to_string(), val))?;
        }

        if let Some(val) = lookup("LOG_LEVEL") {
            config.log_level = val;
        }

        if let Some(val) = lookup("METRICS_ENABLED") {
            config.metrics_enabled = parse_bool("METRICS_ENABLED", val)?;
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.currency.trim().is_empty() {
            return Err(ConfigError::ValidationError("AUX_CURRENCY must not be empty".to_string()));
        }

        if self.coinserv.url.trim().is_empty() {
            return Err(ConfigError::ValidationError("AUX_COINSERV_URL must not be empty".to_string()));
        }

        if self.work_interval_ms == 0 {
            return Err(ConfigError::ValidationError("AUX_WORK_INTERVAL_MS must be greater than 0".to_string()));
        }

        if let Some(url) = &self.report_url {
            if !url.starts_with("http") {
                return Err(ConfigError::ValidationError("REPORT_URL must be a valid HTTP URL".to_string()));
            }
        }

        if let Some(url) = &self.job_notify_url {
            if !url.starts_with("http") {
                return Err(ConfigError::ValidationError("JOB_NOTIFY_URL must be a valid HTTP URL".to_string()));
            }
        }

        Ok(())
    }

    pub fn get_work_interval(&self) -> Duration {
        Duration::from_millis(self.work_interval_ms)
    }

    /// Reporting happens only when enabled and somewhere to send to exists.
    pub fn reporting_enabled(&self) -> bool {
        self.send && self.report_url.is_some()
    }
}

fn parse_bool(key: &str, val: String) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidEnvVar(key.to_string(), val)),
    }
}

fn parse_signal(val: &str) -> Option<i32> {
    match val.trim().to_uppercase().as_str() {
        "SIGHUP" | "HUP" => Some(1),
        "SIGUSR1" | "USR1" => Some(10),
        "SIGUSR2" | "USR2" => Some(12),
        other => other.parse().ok().filter(|n| *n > 0),
    }
}
