//! Host Push - Web Push delivery for host booking notifications.
//!
//! This crate signs, encrypts and delivers Web Push messages to every
//! browser a host has subscribed, without a push-messaging library.
//!
//! # Architecture
//!
//! ```text
//! POST /notify (bearer secret)
//!     ↓
//! Fan-out: load the host's subscriptions from the store
//!     ↓
//! Dispatcher (per subscription, concurrently)
//!     ├── VAPID JWT (RFC 8292, ES256)
//!     └── aes128gcm payload (RFC 8291: ECDH + HKDF + AES-128-GCM)
//!     ↓
//! Push service (RFC 8030) → 2xx delivered / 404,410 gone / other failed
//!     ↓
//! Gone subscriptions are deleted from the store
//! ```
//!
//! # Modules
//!
//! - [`notifications`] - Codec, VAPID signer, encryptor, dispatcher, fan-out, store
//! - [`server`] - Authenticated HTTP trigger endpoint
//! - [`config`] - Configuration loading with environment overrides

pub mod config;
pub mod notifications;
pub mod server;

pub use config::Config;
pub use notifications::fanout::{FanoutError, FanoutSummary, Notifier};
pub use notifications::push::{DeliveryOutcome, PushDispatcher, PushPayload, PushSubscription};
pub use notifications::store::{JsonSubscriptionStore, StoredSubscription, SubscriptionStore};
pub use notifications::vapid::{VapidKeys, VapidSigner};
