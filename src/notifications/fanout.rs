//! Notification fan-out to every browser a host has subscribed.
//!
//! One call loads the owner's subscriptions, dispatches to all of them
//! concurrently, deletes the ones the push service reported gone, and
//! returns aggregate counts. Per-subscription failures never abort the
//! fan-out.

// Rust guideline compliant 2026-02

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::push::{DeliveryOutcome, PushDispatcher, PushPayload};
use super::store::SubscriptionStore;

/// Aggregate result of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutSummary {
    /// Subscriptions the push service accepted.
    pub sent: usize,
    /// Subscriptions attempted.
    pub total: usize,
    /// Subscriptions found gone and deleted.
    pub expired: usize,
}

/// Errors that fail a fan-out as a whole.
#[derive(Debug, thiserror::Error)]
pub enum FanoutError {
    /// No owner id was given.
    #[error("host_id is required")]
    MissingOwner,
    /// Subscriptions could not be loaded.
    #[error("failed to load push subscriptions: {0:#}")]
    Store(anyhow::Error),
}

/// Sends one notification to all of an owner's subscriptions.
#[derive(Clone)]
pub struct Notifier {
    store: Arc<dyn SubscriptionStore>,
    dispatcher: PushDispatcher,
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Notifier {
    /// Creates a notifier over a store and dispatcher.
    pub fn new(store: Arc<dyn SubscriptionStore>, dispatcher: PushDispatcher) -> Self {
        Self { store, dispatcher }
    }

    /// Notify every subscription of `owner_id`.
    ///
    /// An owner with no subscriptions is a normal outcome and yields
    /// `{sent: 0, total: 0, expired: 0}` without any HTTP call.
    pub async fn notify_owner(
        &self,
        owner_id: &str,
        title: &str,
        body: &str,
        url: Option<&str>,
    ) -> Result<FanoutSummary, FanoutError> {
        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(FanoutError::MissingOwner);
        }

        let subscriptions = self
            .store
            .select(owner_id)
            .await
            .map_err(FanoutError::Store)?;

        if subscriptions.is_empty() {
            log::debug!("[Fanout] No push subscriptions for host {}", owner_id);
            return Ok(FanoutSummary::default());
        }

        let payload = PushPayload::new(title, body, url);
        let attempts = subscriptions.iter().map(|stored| {
            let payload = &payload;
            async move {
                let outcome = self.dispatcher.send_one(&stored.subscription, payload).await;
                (stored.id.as_str(), outcome)
            }
        });

        let mut summary = FanoutSummary {
            total: subscriptions.len(),
            ..FanoutSummary::default()
        };
        let mut gone = Vec::new();

        for (id, outcome) in join_all(attempts).await {
            match outcome {
                Ok(DeliveryOutcome::Delivered) => summary.sent += 1,
                Ok(DeliveryOutcome::Gone) => gone.push(id.to_string()),
                Ok(DeliveryOutcome::Failed(status)) => {
                    log::debug!("[Fanout] Push to subscription {} failed (HTTP {})", id, status);
                }
                Err(e) => {
                    log::warn!("[Fanout] Push to subscription {} failed: {:#}", id, e);
                }
            }
        }

        summary.expired = gone.len();
        if !gone.is_empty() {
            // Undeleted rows are reported gone again by the next fan-out
            if let Err(e) = self.store.delete_many(&gone).await {
                log::error!(
                    "[Fanout] Failed to delete {} expired subscription(s): {:#}",
                    gone.len(),
                    e
                );
            }
        }

        log::info!(
            "[Fanout] Host {}: sent {}/{} ({} expired)",
            owner_id,
            summary.sent,
            summary.total,
            summary.expired
        );
        Ok(summary)
    }
}
