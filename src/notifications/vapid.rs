//! VAPID authentication for Web Push (RFC 8292).
//!
//! Builds the ES256-signed JWT a push service uses to identify this server
//! and assembles the `Authorization: vapid t=..., k=...` header value.
//! Keys are supplied through configuration; this module never generates
//! or rotates them.

// Rust guideline compliant 2026-02

use anyhow::{Context, Result};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use serde::Serialize;
use zeroize::Zeroizing;

use super::base64url;

/// Longest token lifetime RFC 8292 allows (24 hours).
pub const MAX_EXPIRY_SECS: u64 = 24 * 60 * 60;

/// Length of an uncompressed SEC1 P-256 point (`0x04 || X || Y`).
const PUBLIC_KEY_LEN: usize = 65;

/// Length of a raw P-256 private scalar.
const PRIVATE_KEY_LEN: usize = 32;

/// Length of one ECDSA P-256 signature component.
const SCALAR_LEN: usize = 32;

/// VAPID keypair for web push authentication.
///
/// The private key is imported from its raw 32-byte scalar (base64url).
/// The public key is the uncompressed SEC1 point (65 bytes) and must name
/// the same curve point as the scalar, otherwise every push service would
/// reject our signatures.
pub struct VapidKeys {
    signing_key: SigningKey,
    /// Uncompressed public key bytes (base64url, 65 bytes decoded).
    public_key_b64: String,
}

impl std::fmt::Debug for VapidKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidKeys")
            .field("public_key_b64", &self.public_key_b64)
            .finish_non_exhaustive()
    }
}

impl VapidKeys {
    /// Import a keypair from base64url-encoded strings.
    ///
    /// Validates the public key format, the private key scalar, and that the
    /// two belong together.
    pub fn from_base64url(public_key_b64: &str, private_key_b64: &str) -> Result<Self> {
        let pub_bytes =
            base64url::decode(public_key_b64).context("Invalid base64url for VAPID public key")?;
        anyhow::ensure!(
            pub_bytes.len() == PUBLIC_KEY_LEN && pub_bytes[0] == 0x04,
            "VAPID public key must be 65-byte uncompressed P-256 point"
        );

        let priv_bytes = Zeroizing::new(
            base64url::decode(private_key_b64)
                .context("Invalid base64url for VAPID private key")?,
        );
        anyhow::ensure!(
            priv_bytes.len() == PRIVATE_KEY_LEN,
            "VAPID private key must be 32-byte P-256 scalar, got {} bytes",
            priv_bytes.len()
        );
        let signing_key = SigningKey::from_slice(&priv_bytes)
            .context("VAPID private key is not a valid P-256 scalar")?;

        // X = bytes[1..33], Y = bytes[33..65] must match the scalar's point
        let derived = signing_key.verifying_key().to_encoded_point(false);
        anyhow::ensure!(
            derived.as_bytes() == pub_bytes.as_slice(),
            "VAPID public key does not match the private key"
        );

        Ok(Self {
            signing_key,
            public_key_b64: base64url::encode(&pub_bytes),
        })
    }

    /// Wrap an existing signing key, deriving the public half.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let public = signing_key.verifying_key().to_encoded_point(false);
        Self {
            public_key_b64: base64url::encode(public.as_bytes()),
            signing_key,
        }
    }

    /// Base64url-encoded uncompressed public key (65 bytes decoded).
    ///
    /// This is the `k=` parameter of the Authorization header and the
    /// `applicationServerKey` browsers subscribe with.
    pub fn public_key_base64url(&self) -> &str {
        &self.public_key_b64
    }

    /// The P-256 signing key.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

/// ECDSA P-256 / SHA-256 signing primitive.
///
/// Implementations may return either the raw 64-byte `r || s` form or a DER
/// `SEQUENCE { INTEGER r, INTEGER s }`; [`normalize_signature`] accepts both.
pub trait Es256Signer: Send + Sync {
    /// Sign `message` and return the signature bytes in either format.
    fn sign_es256(&self, message: &[u8]) -> Result<Vec<u8>>;
}

impl Es256Signer for SigningKey {
    fn sign_es256(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature: Signature = self
            .try_sign(message)
            .map_err(|e| anyhow::anyhow!("ECDSA signing failed: {e}"))?;
        Ok(signature.to_bytes().to_vec())
    }
}

/// Convert an ECDSA signature to the 64-byte `r || s` form JWS requires.
///
/// Exactly 64 bytes are taken as already raw. Anything else is parsed as
/// DER; each INTEGER loses its leading sign byte and is left-padded to 32
/// bytes. Push services reject DER-framed or unpadded signatures.
pub fn normalize_signature(signature: &[u8]) -> Result<[u8; 64]> {
    let mut raw = [0u8; 2 * SCALAR_LEN];

    if signature.len() == raw.len() {
        raw.copy_from_slice(signature);
        return Ok(raw);
    }

    // SEQUENCE tag, then a short-form length (P-256 signatures are <= 72 bytes)
    anyhow::ensure!(
        signature.first() == Some(&0x30),
        "Signature is neither 64-byte raw nor DER ({} bytes)",
        signature.len()
    );
    let seq_len = usize::from(*signature.get(1).context("Truncated DER signature")?);
    anyhow::ensure!(
        seq_len + 2 == signature.len(),
        "DER signature length {} does not match SEQUENCE length {}",
        signature.len(),
        seq_len
    );

    let (r, rest) = der_integer(&signature[2..]).context("Malformed DER INTEGER r")?;
    let (s, rest) = der_integer(rest).context("Malformed DER INTEGER s")?;
    anyhow::ensure!(rest.is_empty(), "Trailing bytes after DER signature");

    write_scalar(r, &mut raw[..SCALAR_LEN]).context("Invalid r component")?;
    write_scalar(s, &mut raw[SCALAR_LEN..]).context("Invalid s component")?;
    Ok(raw)
}

/// Split one `INTEGER` off the front of `input`, returning its content bytes.
fn der_integer(input: &[u8]) -> Result<(&[u8], &[u8])> {
    anyhow::ensure!(input.first() == Some(&0x02), "Expected INTEGER tag");
    let len = usize::from(*input.get(1).context("Missing INTEGER length")?);
    let end = 2 + len;
    let value = input.get(2..end).context("INTEGER runs past end of signature")?;
    Ok((value, &input[end..]))
}

/// Right-justify a big-endian integer into a 32-byte slot.
fn write_scalar(integer: &[u8], out: &mut [u8]) -> Result<()> {
    let first_significant = integer.iter().position(|&b| b != 0).unwrap_or(integer.len());
    let digits = &integer[first_significant..];
    anyhow::ensure!(
        digits.len() <= out.len(),
        "{}-byte integer does not fit a P-256 scalar",
        digits.len()
    );
    let pad = out.len() - digits.len();
    out[..pad].fill(0);
    out[pad..].copy_from_slice(digits);
    Ok(())
}

#[derive(Serialize)]
struct JwtHeader {
    typ: &'static str,
    alg: &'static str,
}

#[derive(Serialize)]
struct VapidClaims<'a> {
    aud: &'a str,
    exp: i64,
    sub: &'a str,
}

/// Produces VAPID Authorization headers for a fixed key, subject and lifetime.
pub struct VapidSigner {
    keys: VapidKeys,
    signer: Box<dyn Es256Signer>,
    subject: String,
    expiry_secs: u64,
}

impl std::fmt::Debug for VapidSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VapidSigner")
            .field("keys", &self.keys)
            .field("subject", &self.subject)
            .field("expiry_secs", &self.expiry_secs)
            .finish_non_exhaustive()
    }
}

impl VapidSigner {
    /// Create a signer that signs with the keypair's own private key.
    ///
    /// `subject` must be a `mailto:` or `https:` contact URI. Lifetimes above
    /// 24 hours are clamped.
    pub fn new(keys: VapidKeys, subject: &str, expiry_secs: u64) -> Result<Self> {
        let signer = Box::new(keys.signing_key().clone());
        Self::with_signer(keys, signer, subject, expiry_secs)
    }

    /// Create a signer backed by a custom signing primitive.
    pub fn with_signer(
        keys: VapidKeys,
        signer: Box<dyn Es256Signer>,
        subject: &str,
        expiry_secs: u64,
    ) -> Result<Self> {
        anyhow::ensure!(
            subject.starts_with("mailto:") || subject.starts_with("https:"),
            "VAPID subject must be a mailto: or https: URI, got {subject:?}"
        );
        anyhow::ensure!(expiry_secs > 0, "VAPID expiry must be positive");

        let expiry_secs = if expiry_secs > MAX_EXPIRY_SECS {
            log::warn!(
                "[WebPush] VAPID expiry {}s exceeds 24h, clamping to {}s",
                expiry_secs,
                MAX_EXPIRY_SECS
            );
            MAX_EXPIRY_SECS
        } else {
            expiry_secs
        };

        Ok(Self {
            keys,
            signer,
            subject: subject.to_string(),
            expiry_secs,
        })
    }

    /// The keypair this signer authenticates with.
    pub fn keys(&self) -> &VapidKeys {
        &self.keys
    }

    /// Contact URI placed in the `sub` claim.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Token lifetime in seconds.
    pub fn expiry_secs(&self) -> u64 {
        self.expiry_secs
    }

    /// Build a signed compact JWT for `audience`, expiring `expiry_secs` from now.
    pub fn sign_jwt(&self, audience: &str) -> Result<String> {
        self.sign_jwt_at(audience, chrono::Utc::now().timestamp())
    }

    /// Build a signed compact JWT with an explicit issue time (unix seconds).
    pub fn sign_jwt_at(&self, audience: &str, now: i64) -> Result<String> {
        let header = JwtHeader {
            typ: "JWT",
            alg: "ES256",
        };
        let claims = VapidClaims {
            aud: audience,
            exp: now + i64::try_from(self.expiry_secs).context("VAPID expiry overflow")?,
            sub: &self.subject,
        };

        let signing_input = format!(
            "{}.{}",
            base64url::encode(serde_json::to_vec(&header).context("Failed to encode JWT header")?),
            base64url::encode(serde_json::to_vec(&claims).context("Failed to encode JWT claims")?)
        );

        let signature = self
            .signer
            .sign_es256(signing_input.as_bytes())
            .context("Failed to sign VAPID JWT")?;
        let raw = normalize_signature(&signature)?;

        Ok(format!("{signing_input}.{}", base64url::encode(raw)))
    }

    /// `Authorization` header value: `vapid t=<jwt>, k=<public key>`.
    pub fn authorization(&self, audience: &str) -> Result<String> {
        let jwt = self.sign_jwt(audience)?;
        Ok(format!(
            "vapid t={}, k={}",
            jwt,
            self.keys.public_key_base64url()
        ))
    }
}
