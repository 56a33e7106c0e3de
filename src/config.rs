//! Configuration loading.
//!
//! Reads `config.json` from the configuration directory when present, then
//! applies environment variable overrides. Secrets (the VAPID private key
//! and the service secret) are never serialized back out.
//!
//! The resulting [`Config`] is built once at startup and handed to the
//! dispatcher and server; nothing reads the environment after that.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, time::Duration};

use crate::notifications::push::{PushDispatcher, DEFAULT_TTL_SECS};
use crate::notifications::vapid::{VapidKeys, VapidSigner};

/// Configuration for the host push service.
#[derive(Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP trigger endpoint binds to.
    pub bind_addr: String,
    /// VAPID public key, base64url uncompressed P-256 point.
    pub vapid_public_key: Option<String>,
    /// VAPID private key, base64url raw scalar - NOT serialized.
    #[serde(skip_serializing)]
    pub vapid_private_key: Option<String>,
    /// Contact URI placed in the VAPID `sub` claim.
    pub vapid_subject: String,
    /// VAPID JWT lifetime in seconds (clamped to 24h).
    pub vapid_expiry_secs: u64,
    /// `TTL` header sent to push services, in seconds.
    pub push_ttl_secs: u32,
    /// Timeout for a single push service request, in seconds.
    pub request_timeout_secs: u64,
    /// Bearer secret required by `POST /notify` - NOT serialized.
    #[serde(skip_serializing)]
    pub service_secret: String,
    /// Location of the JSON subscription store.
    pub store_path: PathBuf,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_addr", &self.bind_addr)
            .field("vapid_public_key", &self.vapid_public_key)
            .field("vapid_private_key", &self.vapid_private_key.as_ref().map(|_| "<redacted>"))
            .field("vapid_subject", &self.vapid_subject)
            .field("vapid_expiry_secs", &self.vapid_expiry_secs)
            .field("push_ttl_secs", &self.push_ttl_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("service_secret", &"<redacted>")
            .field("store_path", &self.store_path)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let store_path = Self::config_dir()
            .map(|dir| dir.join("subscriptions.json"))
            .unwrap_or_else(|_| PathBuf::from("subscriptions.json"));

        Self {
            bind_addr: "127.0.0.1:8787".to_string(),
            vapid_public_key: None,
            vapid_private_key: None,
            vapid_subject: "mailto:admin@localhost".to_string(),
            vapid_expiry_secs: 12 * 60 * 60,
            push_ttl_secs: DEFAULT_TTL_SECS,
            request_timeout_secs: 10,
            service_secret: String::new(),
            store_path,
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// Directory selection priority:
    /// 1. `HOST_PUSH_CONFIG_DIR` env var: explicit override
    /// 2. Default: platform config dir joined with `host-push`
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var("HOST_PUSH_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join("host-push"))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = match Self::load_from_file()? {
            Some(config) => config,
            None => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_from_file() -> Result<Option<Self>> {
        let config_path = Self::config_dir()?.join("config.json");
        if !config_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {:?}", config_path))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {:?}", config_path))?;
        Ok(Some(config))
    }

    /// Apply overrides from `lookup` (the process environment in production).
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind_addr) = lookup("HOST_PUSH_BIND") {
            self.bind_addr = bind_addr;
        }

        if let Some(public_key) = lookup("VAPID_PUBLIC_KEY") {
            self.vapid_public_key = Some(public_key);
        }

        if let Some(private_key) = lookup("VAPID_PRIVATE_KEY") {
            self.vapid_private_key = Some(private_key);
        }

        if let Some(subject) = lookup("VAPID_SUBJECT") {
            self.vapid_subject = subject;
        }

        if let Some(secret) = lookup("PUSH_SERVICE_SECRET") {
            self.service_secret = secret;
        }

        if let Some(store_path) = lookup("HOST_PUSH_STORE_PATH") {
            self.store_path = PathBuf::from(store_path);
        }

        if let Some(expiry) = lookup("VAPID_EXPIRY_SECS") {
            match expiry.parse::<u64>() {
                Ok(secs) => self.vapid_expiry_secs = secs,
                Err(e) => log::warn!("Ignoring invalid VAPID_EXPIRY_SECS {:?}: {}", expiry, e),
            }
        }

        if let Some(ttl) = lookup("PUSH_TTL_SECS") {
            match ttl.parse::<u32>() {
                Ok(secs) => self.push_ttl_secs = secs,
                Err(e) => log::warn!("Ignoring invalid PUSH_TTL_SECS {:?}: {}", ttl, e),
            }
        }

        if let Some(timeout) = lookup("PUSH_REQUEST_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.request_timeout_secs = secs,
                Err(e) => log::warn!("Ignoring invalid PUSH_REQUEST_TIMEOUT_SECS {:?}: {}", timeout, e),
            }
        }
    }

    /// Import the configured VAPID keypair.
    ///
    /// # Errors
    ///
    /// Returns an error if either key is missing, malformed, or the two do
    /// not belong together.
    pub fn vapid_keys(&self) -> Result<VapidKeys> {
        let public = self
            .vapid_public_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .context("VAPID_PUBLIC_KEY is not configured")?;
        let private = self
            .vapid_private_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .context("VAPID_PRIVATE_KEY is not configured")?;
        VapidKeys::from_base64url(public, private)
    }

    /// Build the push dispatcher from this configuration.
    pub fn build_dispatcher(&self) -> Result<PushDispatcher> {
        let signer = VapidSigner::new(
            self.vapid_keys()?,
            &self.vapid_subject,
            self.vapid_expiry_secs,
        )?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(self.request_timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(PushDispatcher::new(client, signer, self.push_ttl_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::base64url;
    use p256::ecdsa::SigningKey;
    use p256::elliptic_curve::rand_core::OsRng;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn key_pair() -> (String, String) {
        let key = SigningKey::random(&mut OsRng);
        (
            base64url::encode(key.verifying_key().to_encoded_point(false).as_bytes()),
            base64url::encode(key.to_bytes()),
        )
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup(&[
            ("HOST_PUSH_BIND", "0.0.0.0:9000"),
            ("VAPID_SUBJECT", "mailto:hosts@example.com"),
            ("PUSH_SERVICE_SECRET", "s3cret"),
            ("PUSH_TTL_SECS", "600"),
            ("VAPID_EXPIRY_SECS", "3600"),
            ("HOST_PUSH_STORE_PATH", "/tmp/subs.json"),
        ]));

        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.vapid_subject, "mailto:hosts@example.com");
        assert_eq!(config.service_secret, "s3cret");
        assert_eq!(config.push_ttl_secs, 600);
        assert_eq!(config.vapid_expiry_secs, 3600);
        assert_eq!(config.store_path, PathBuf::from("/tmp/subs.json"));
    }

    #[test]
    fn test_invalid_numeric_override_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(lookup(&[("PUSH_TTL_SECS", "soon")]));
        assert_eq!(config.push_ttl_secs, DEFAULT_TTL_SECS);
    }

    #[test]
    fn test_secrets_are_not_serialized() {
        let mut config = Config::default();
        config.vapid_private_key = Some("private".to_string());
        config.service_secret = "s3cret".to_string();

        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("private"));
        assert!(!json.contains("s3cret"));
        assert!(!format!("{config:?}").contains("s3cret"));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(r#"{"bind_addr": "0.0.0.0:1"}"#).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:1");
        assert_eq!(config.push_ttl_secs, DEFAULT_TTL_SECS);
        assert!(config.vapid_public_key.is_none());
    }

    #[test]
    fn test_missing_vapid_keys_is_config_error() {
        let config = Config::default();
        let err = config.build_dispatcher().unwrap_err();
        assert!(err.to_string().contains("VAPID_PUBLIC_KEY"));
    }

    #[test]
    fn test_build_dispatcher_from_keys() {
        let (public, private) = key_pair();
        let mut config = Config::default();
        config.apply_env_overrides(lookup(&[
            ("VAPID_PUBLIC_KEY", public.as_str()),
            ("VAPID_PRIVATE_KEY", private.as_str()),
        ]));

        let dispatcher = config.build_dispatcher().unwrap();
        assert_eq!(dispatcher.signer().keys().public_key_base64url(), public);
        assert_eq!(dispatcher.signer().subject(), "mailto:admin@localhost");
    }

    #[test]
    fn test_mismatched_vapid_keys_rejected() {
        let (public, _) = key_pair();
        let (_, other_private) = key_pair();
        let mut config = Config::default();
        config.vapid_public_key = Some(public);
        config.vapid_private_key = Some(other_private);
        assert!(config.vapid_keys().is_err());
    }
}
