use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{build_payload, DeliveryError, Notify};
use crate::detector::Transition;

/// Posts release notifications to a Discord channel webhook.
///
/// Deliveries are fire-and-forget: the version store is committed before
/// dispatch, so a failed send is reported once and the next cycle sees the
/// new version as unchanged. No retry loop.
#[derive(Clone)]
pub struct DiscordNotifier {
    webhook: Option<String>,
    client: Client,
    timeout: Duration,
    quiet: bool,
}

impl DiscordNotifier {
    pub fn new(webhook: Option<String>, quiet: bool) -> Self {
        Self {
            webhook,
            client: Client::new(),
            timeout: Duration::from_secs(5),
            quiet,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }
}

#[async_trait]
impl Notify for DiscordNotifier {
    async fn dispatch(&self, transition: &Transition) -> Result<(), DeliveryError> {
        let Some(url) = &self.webhook else {
            return Err(DeliveryError::NotConfigured);
        };

        let payload = build_payload(transition, self.quiet);

        let resp = self
            .client
            .post(url)
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Sink(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DeliveryError::Status(status.as_u16()));
        }
        Ok(())
    }
}
