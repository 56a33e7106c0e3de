//! Web push notification infrastructure.
//!
//! Delivers host notifications directly to browser push services. Every
//! protocol step is built here against low-level primitives (`p256`,
//! `hkdf`, `aes-gcm`) rather than a push-messaging library.
//!
//! # Architecture
//!
//! ```text
//! Notifier::notify_owner(host_id, title, body, url)
//!     ↓
//! SubscriptionStore::select(host_id)
//!     ↓
//! PushDispatcher::send_one (one per subscription)
//!     ├── VapidSigner  → Authorization: vapid t=<jwt>, k=<key>
//!     └── ece::encrypt → aes128gcm body
//!     ↓
//! SubscriptionStore::delete_many(gone ids)
//! ```
//!
//! # VAPID Keys
//!
//! The service holds one P-256 keypair (RFC 8292) supplied through
//! configuration. The public key is what browsers pass as
//! `applicationServerKey` when subscribing. Keys are loaded once and
//! never mutated.
//!
//! # Push Subscriptions
//!
//! Browsers register an endpoint plus `p256dh`/`auth` key material per
//! host. When a push service answers 404 or 410 the subscription is gone
//! and is removed after the fan-out completes.

// Rust guideline compliant 2026-02

pub mod base64url;
pub mod ece;
pub mod fanout;
pub mod push;
pub mod store;
pub mod vapid;
