// src/source/mod.rs
pub mod fetcher;

use serde::{Deserialize, Serialize};
use thiserror::Error;

fn default_color() -> u32 {
    0x5865F2
}

/// Static description of one monitored source. Immutable after configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,    // e.g., "appstore", "webpage"
    pub title: String, // embed title prefix, e.g., "App Store release"
    /// Endpoint the raw payload is fetched from.
    pub url: String,
    pub rule: ExtractionRule,
    /// Link shown in the notification embed.
    #[serde(default)]
    pub link: Option<String>,
    /// Embed accent color.
    #[serde(default = "default_color")]
    pub color: u32,
}

/// How a version string is pulled out of the raw payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionRule {
    /// Exact field read from an app-store lookup payload, keyed by bundle id.
    AppStoreLookup { bundle_id: String },
    /// First match of `pattern` against unstructured page text. Capture
    /// group 1 is used when present, the whole match otherwise.
    PagePattern { pattern: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected status {0}")]
    Status(u16),
    #[error("payload parse failed: {0}")]
    Parse(String),
}
