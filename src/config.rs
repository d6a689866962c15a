use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::core::ConfigError;
use crate::registry::Source;
use crate::relay::RelayCredentials;

// ---------- Capture ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,
    #[serde(default = "default_stream_path")]
    pub stream_path: String,
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
    #[serde(default = "default_true")]
    pub autostart: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            stream_path: default_stream_path(),
            tick_ms: default_tick_ms(),
            workers: default_workers(),
            fetch_timeout_secs: default_fetch_timeout(),
            ffmpeg: default_ffmpeg(),
            autostart: true,
        }
    }
}

impl CaptureConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(10))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }
}

// ---------- Relay (FTP) ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RelayConfig {
    pub address: String,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_relay_timeout")]
    pub timeout_secs: u64,
}

// ---------- API ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: String,
}

// ---------- Retention ----------
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RetentionConfig {
    pub days: u64,
    #[serde(default = "default_retention_interval")]
    pub interval_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub capture: CaptureConfig,
    pub relay: Option<RelayConfig>,
    pub api: Option<ApiConfig>,
    pub retention: Option<RetentionConfig>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("captures")
}
fn default_stream_path() -> String {
    "11".to_string()
}
fn default_tick_ms() -> u64 {
    1000
}
fn default_workers() -> usize {
    4
}
fn default_fetch_timeout() -> u64 {
    10
}
fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}
fn default_true() -> bool {
    true
}
fn default_relay_timeout() -> u64 {
    15
}
fn default_bind() -> String {
    "0.0.0.0:3010".to_string()
}
fn default_retention_interval() -> u64 {
    3600
}

pub fn load(path: &str) -> anyhow::Result<Config> {
    let txt = std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path))?;
    let cfg = parse(&txt).with_context(|| format!("invalid config {}", path))?;
    Ok(cfg)
}

pub fn parse(txt: &str) -> Result<Config, ConfigError> {
    let cfg: Config = toml::from_str(txt).map_err(|e| ConfigError::with_context("toml", e))?;
    cfg.validate()?;
    Ok(cfg)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.workers == 0 {
            return Err(ConfigError::message("capture.workers must be at least 1"));
        }

        let mut seen = BTreeSet::new();
        for source in &self.sources {
            if !seen.insert(source.id) {
                return Err(ConfigError::DuplicateSource { id: source.id });
            }
        }

        if let Some(relay) = &self.relay {
            if relay.address.trim().is_empty() {
                return Err(ConfigError::MissingRelayField { field: "address" });
            }
            if relay.user.trim().is_empty() {
                return Err(ConfigError::MissingRelayField { field: "user" });
            }
        }

        Ok(())
    }

    pub fn relay_credentials(&self) -> Option<RelayCredentials> {
        self.relay.as_ref().map(|relay| RelayCredentials {
            address: relay.address.clone(),
            user: relay.user.clone(),
            password: relay.password.clone(),
        })
    }

    pub fn relay_timeout(&self) -> Duration {
        Duration::from_secs(
            self.relay
                .as_ref()
                .map(|r| r.timeout_secs)
                .unwrap_or_else(default_relay_timeout)
                .max(1),
        )
    }
}
