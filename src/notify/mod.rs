pub mod discord;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::detector::Transition;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("notification sink not configured")]
    NotConfigured,
    #[error("sink request failed: {0}")]
    Sink(String),
    #[error("sink returned status {0}")]
    Status(u16),
}

/// Delivery seam. Production uses [`discord::DiscordNotifier`]; tests record
/// dispatched transitions instead of touching the network.
#[async_trait]
pub trait Notify: Send + Sync {
    async fn dispatch(&self, transition: &Transition) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookEmbed {
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub color: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebhookPayload {
    pub content: Option<String>,
    pub embeds: Vec<WebhookEmbed>,
}

/// Build the outgoing message for a transition. Quiet mode is a delivery-time
/// switch: it only drops the audience tag, the embed is identical.
pub fn build_payload(transition: &Transition, quiet: bool) -> WebhookPayload {
    let meta = &transition.source;
    let title = format!("{}: {} is out", meta.title, transition.new);
    let description = format!(
        "**Previous:** {}\n**New:** {}\n**Detected (UTC):** {}",
        if transition.old.is_empty() {
            "unknown"
        } else {
            transition.old.as_str()
        },
        transition.new,
        transition.detected_at.format("%Y-%m-%d %H:%M:%S"),
    );

    let content = if quiet {
        None
    } else {
        Some("@everyone".to_string())
    };

    WebhookPayload {
        content,
        embeds: vec![WebhookEmbed {
            title,
            description,
            url: meta.link.clone(),
            color: meta.color,
        }],
    }
}
