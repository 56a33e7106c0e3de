//! Web push message sending.
//!
//! Encrypts a payload for one subscription (RFC 8291), authenticates with
//! VAPID (RFC 8292), POSTs it to the push service (RFC 8030) and classifies
//! the answer.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::ece::{self, SubscriberKeys};
use super::vapid::VapidSigner;

/// Default message lifetime at the push service (24 hours).
pub const DEFAULT_TTL_SECS: u32 = 86_400;

/// A browser's push subscription.
///
/// Contains everything needed to send a web push message to this browser.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushSubscription {
    /// Push service endpoint URL.
    pub endpoint: String,
    /// Browser's P-256 ECDH public key (base64url).
    pub p256dh: String,
    /// Shared auth secret (base64url).
    pub auth: String,
}

/// Notification shown by the host's service worker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub body: String,
    /// Click destination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Replaces any earlier notification with the same tag.
    pub tag: String,
}

impl PushPayload {
    /// Build a payload whose tag embeds the current time in milliseconds.
    ///
    /// Separate invocations therefore never collapse into one notification.
    pub fn new(title: &str, body: &str, url: Option<&str>) -> Self {
        Self {
            title: title.to_string(),
            body: body.to_string(),
            url: url.map(str::to_string),
            tag: format!("host-{}", chrono::Utc::now().timestamp_millis()),
        }
    }
}

/// Result of one delivery attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Push service accepted the message (2xx).
    Delivered,
    /// Subscription is permanently invalid (404 or 410); caller deletes it.
    Gone,
    /// Any other non-success status. Not retried.
    Failed(u16),
}

impl DeliveryOutcome {
    /// Classify a push service HTTP status code.
    pub fn from_status(status: u16) -> Self {
        match status {
            200..=299 => Self::Delivered,
            404 | 410 => Self::Gone,
            _ => Self::Failed(status),
        }
    }
}

/// Origin of a push endpoint (`scheme://host[:port]`), the VAPID audience.
pub fn audience(endpoint: &str) -> Result<String> {
    let url = url::Url::parse(endpoint).context("Invalid push endpoint URL")?;
    anyhow::ensure!(
        matches!(url.scheme(), "https" | "http"),
        "Push endpoint must be http(s), got {}",
        url.scheme()
    );
    let origin = url.origin();
    anyhow::ensure!(origin.is_tuple(), "Push endpoint has no origin");
    Ok(origin.ascii_serialization())
}

/// Sends encrypted, VAPID-authenticated pushes to individual subscriptions.
///
/// Cheap to clone; the signer is shared and the `reqwest::Client` pools
/// connections across calls.
#[derive(Clone, Debug)]
pub struct PushDispatcher {
    client: reqwest::Client,
    signer: Arc<VapidSigner>,
    ttl_secs: u32,
}

impl PushDispatcher {
    /// Creates a dispatcher.
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client shared across deliveries
    /// * `signer` - VAPID signer built from the service keys
    /// * `ttl_secs` - Value of the `TTL` header
    pub fn new(client: reqwest::Client, signer: VapidSigner, ttl_secs: u32) -> Self {
        Self {
            client,
            signer: Arc::new(signer),
            ttl_secs,
        }
    }

    /// The VAPID signer this dispatcher authenticates with.
    pub fn signer(&self) -> &VapidSigner {
        &self.signer
    }

    /// Deliver `payload` to a single subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The endpoint URL is malformed
    /// - The subscription keys are malformed
    /// - The payload does not fit a single record
    /// - The HTTP request cannot be sent
    pub async fn send_one(
        &self,
        subscription: &PushSubscription,
        payload: &PushPayload,
    ) -> Result<DeliveryOutcome> {
        let plaintext = serde_json::to_vec(payload).context("Failed to serialize push payload")?;
        self.send_raw(subscription, &plaintext).await
    }

    /// Deliver an already-serialized payload to a single subscription.
    pub async fn send_raw(
        &self,
        subscription: &PushSubscription,
        plaintext: &[u8],
    ) -> Result<DeliveryOutcome> {
        let audience = audience(&subscription.endpoint)?;
        let authorization = self
            .signer
            .authorization(&audience)
            .context("Failed to build VAPID authorization")?;

        let keys = SubscriberKeys::from_base64url(&subscription.p256dh, &subscription.auth)
            .context("Invalid subscription keys")?;
        let body = ece::encrypt(&keys, plaintext).context("Failed to encrypt push payload")?;

        let response = self
            .client
            .post(&subscription.endpoint)
            .header("Authorization", authorization)
            .header("Content-Type", "application/octet-stream")
            .header("Content-Encoding", "aes128gcm")
            .header("TTL", self.ttl_secs.to_string())
            .header("Urgency", "high")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Web push HTTP request to {audience} failed"))?;

        let status = response.status().as_u16();
        let outcome = DeliveryOutcome::from_status(status);

        match outcome {
            DeliveryOutcome::Delivered => {
                log::debug!("[WebPush] Delivered via {} (HTTP {})", audience, status);
            }
            DeliveryOutcome::Gone => {
                log::info!("[WebPush] Subscription expired at {} (HTTP {})", audience, status);
            }
            DeliveryOutcome::Failed(429) => {
                log::warn!("[WebPush] Rate limited by {} (429)", audience);
            }
            DeliveryOutcome::Failed(_) => {
                let detail = response.text().await.unwrap_or_default();
                log::warn!(
                    "[WebPush] Send failed via {} (HTTP {}): {}",
                    audience,
                    status,
                    detail.trim()
                );
            }
        }

        Ok(outcome)
    }
}
