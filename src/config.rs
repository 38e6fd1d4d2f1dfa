// src/config.rs
use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::source::{ExtractionRule, SourceDescriptor};

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

const ENV_SOURCES_PATH: &str = "SOURCES_CONFIG_PATH";
const DEFAULT_SOURCES_PATH: &str = "config/sources.toml";

/// Fatal at startup only; fetch and delivery problems are runtime errors
/// with their own types.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no sources configured ({0})")]
    MissingSources(String),
    #[error("reading {path}: {err}")]
    Io {
        path: String,
        #[source]
        err: std::io::Error,
    },
    #[error("parsing {path}: {err}")]
    Parse {
        path: String,
        #[source]
        err: toml::de::Error,
    },
    #[error("source `{id}`: {reason}")]
    InvalidSource { id: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    /// Target sink. Absent is allowed: deliveries then fail with
    /// `DeliveryError::NotConfigured` instead of aborting startup.
    pub webhook_url: Option<String>,
    /// Delivery-time switch: send identical content without the
    /// audience-wide tag.
    pub quiet_mode: bool,
    pub sources: Vec<SourceDescriptor>,
}

impl MonitorConfig {
    /// Environment first, then the TOML source list:
    /// 1) $SOURCES_CONFIG_PATH
    /// 2) config/sources.toml
    pub fn from_env() -> Result<Self, ConfigError> {
        let poll_interval =
            Duration::from_secs(env_u64("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS));
        let fetch_timeout =
            Duration::from_secs(env_u64("FETCH_TIMEOUT_SECS", DEFAULT_FETCH_TIMEOUT_SECS));
        let webhook_url = std::env::var("DISCORD_WEBHOOK_URL")
            .ok()
            .filter(|v| !v.trim().is_empty());
        let quiet_mode = env_flag("QUIET_MODE");

        let sources = load_sources_default()?;
        validate_sources(&sources)?;

        Ok(Self {
            poll_interval,
            fetch_timeout,
            webhook_url,
            quiet_mode,
            sources,
        })
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .ok()
        .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

#[derive(serde::Deserialize)]
struct SourcesFile {
    sources: Vec<SourceDescriptor>,
}

/// Load source descriptors from an explicit TOML path.
pub fn load_sources_from(path: &Path) -> Result<Vec<SourceDescriptor>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
        path: path.display().to_string(),
        err,
    })?;
    let file: SourcesFile = toml::from_str(&content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        err,
    })?;
    Ok(file.sources)
}

/// Load sources using env var + fallback. A missing file is fatal: without
/// source parameters there is nothing to monitor.
pub fn load_sources_default() -> Result<Vec<SourceDescriptor>, ConfigError> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(&p);
        if !pb.exists() {
            return Err(ConfigError::MissingSources(format!(
                "{ENV_SOURCES_PATH} points to non-existent path {p}"
            )));
        }
        return load_sources_from(&pb);
    }
    let fallback = PathBuf::from(DEFAULT_SOURCES_PATH);
    if fallback.exists() {
        return load_sources_from(&fallback);
    }
    Err(ConfigError::MissingSources(format!(
        "set {ENV_SOURCES_PATH} or provide {DEFAULT_SOURCES_PATH}"
    )))
}

pub fn validate_sources(sources: &[SourceDescriptor]) -> Result<(), ConfigError> {
    if sources.is_empty() {
        return Err(ConfigError::MissingSources("empty source list".into()));
    }
    for s in sources {
        if s.id.trim().is_empty() {
            return Err(ConfigError::InvalidSource {
                id: s.title.clone(),
                reason: "missing id".into(),
            });
        }
        if s.url.trim().is_empty() {
            return Err(ConfigError::InvalidSource {
                id: s.id.clone(),
                reason: "missing endpoint url".into(),
            });
        }
        match &s.rule {
            ExtractionRule::AppStoreLookup { bundle_id } if bundle_id.trim().is_empty() => {
                return Err(ConfigError::InvalidSource {
                    id: s.id.clone(),
                    reason: "missing bundle_id".into(),
                });
            }
            ExtractionRule::PagePattern { pattern } => {
                if let Err(e) = Regex::new(pattern) {
                    return Err(ConfigError::InvalidSource {
                        id: s.id.clone(),
                        reason: format!("invalid pattern: {e}"),
                    });
                }
            }
            _ => {}
        }
    }
    let mut ids: Vec<&str> = sources.iter().map(|s| s.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    if ids.len() != sources.len() {
        return Err(ConfigError::MissingSources("duplicate source ids".into()));
    }
    Ok(())
}
