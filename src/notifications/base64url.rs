//! Unpadded URL-safe base64 (RFC 4648 §5), as used by every Web Push field.
//!
//! Browsers are inconsistent about padding on `p256dh`/`auth`, so decoding
//! accepts both forms. Encoding never pads.

use anyhow::{Context, Result};
use base64::{
    alphabet,
    engine::{general_purpose::URL_SAFE_NO_PAD, DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};

/// URL-safe decoder that tolerates trailing `=` padding.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode bytes as unpadded base64url.
pub fn encode(bytes: impl AsRef<[u8]>) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode base64url, with or without padding.
///
/// Fails on any character outside the URL-safe alphabet, including the
/// standard alphabet's `+` and `/`.
pub fn decode(input: &str) -> Result<Vec<u8>> {
    LENIENT
        .decode(input)
        .context("Invalid base64url input")
}
