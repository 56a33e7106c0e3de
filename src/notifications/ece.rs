//! Message encryption for Web Push (RFC 8291) in the `aes128gcm` content
//! coding (RFC 8188).
//!
//! # Wire Format
//!
//! ```text
//! salt (16) | rs (u32 BE) | idlen (1) = 65 | keyid (65) = ephemeral public key
//! ciphertext = AES-128-GCM(plaintext || 0x02) || tag (16)
//! ```
//!
//! The whole message is a single record; `rs` is sized to it. Browsers
//! silently drop anything they cannot decrypt, so every literal below must
//! match the RFC byte for byte.

// Rust guideline compliant 2026-02

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use anyhow::{Context, Result};
use hkdf::Hkdf;
use p256::{elliptic_curve::sec1::ToEncodedPoint, PublicKey, SecretKey};
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::base64url;

/// Upper bound on the single record this encoder emits.
pub const MAX_RECORD_SIZE: usize = 4096;

/// Header length: salt (16) + rs (4) + idlen (1) + keyid (65).
pub const HEADER_LEN: usize = 86;

/// Largest plaintext that fits one record.
pub const MAX_PLAINTEXT_LEN: usize = MAX_RECORD_SIZE - HEADER_LEN - TAG_LEN - 1;

const SALT_LEN: usize = 16;
const AUTH_SECRET_LEN: usize = 16;
const PUBLIC_KEY_LEN: usize = 65;
const IKM_LEN: usize = 32;
const CEK_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Padding delimiter marking the last (and only) record.
const LAST_RECORD_DELIMITER: u8 = 0x02;

const WEBPUSH_INFO: &[u8] = b"WebPush: info\0";
const CEK_INFO: &[u8] = b"Content-Encoding: aes128gcm\0";
const NONCE_INFO: &[u8] = b"Content-Encoding: nonce\0";

/// A subscriber's decoded encryption keys (`p256dh` and `auth`).
#[derive(Clone)]
pub struct SubscriberKeys {
    public_key: PublicKey,
    auth_secret: [u8; AUTH_SECRET_LEN],
}

impl std::fmt::Debug for SubscriberKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberKeys")
            .field("public_key", &base64url::encode(self.public_key.to_encoded_point(false).as_bytes()))
            .finish_non_exhaustive()
    }
}

impl SubscriberKeys {
    /// Decode the base64url `p256dh` and `auth` fields of a subscription.
    pub fn from_base64url(p256dh: &str, auth: &str) -> Result<Self> {
        let public_bytes = base64url::decode(p256dh).context("Invalid base64url for p256dh")?;
        let auth_bytes = base64url::decode(auth).context("Invalid base64url for auth")?;
        Self::from_bytes(&public_bytes, &auth_bytes)
    }

    /// Build from raw bytes: a 65-byte uncompressed point and a 16-byte secret.
    pub fn from_bytes(public_key: &[u8], auth_secret: &[u8]) -> Result<Self> {
        anyhow::ensure!(
            public_key.len() == PUBLIC_KEY_LEN && public_key[0] == 0x04,
            "p256dh must be a 65-byte uncompressed P-256 point, got {} bytes",
            public_key.len()
        );
        let public_key =
            PublicKey::from_sec1_bytes(public_key).context("p256dh is not a point on P-256")?;
        let auth_secret = <[u8; AUTH_SECRET_LEN]>::try_from(auth_secret)
            .ok()
            .with_context(|| {
                format!(
                    "auth secret must be {} bytes, got {}",
                    AUTH_SECRET_LEN,
                    auth_secret.len()
                )
            })?;

        Ok(Self {
            public_key,
            auth_secret,
        })
    }

    /// Subscriber public key.
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Subscriber authentication secret.
    pub fn auth_secret(&self) -> &[u8; AUTH_SECRET_LEN] {
        &self.auth_secret
    }
}

/// Record size field for a plaintext of `plaintext_len` bytes.
///
/// Errors instead of capping: a header claiming a smaller record than the
/// ciphertext would be undecryptable.
pub fn record_size(plaintext_len: usize) -> Result<u32> {
    let size = plaintext_len + 1 + TAG_LEN + HEADER_LEN;
    anyhow::ensure!(
        size <= MAX_RECORD_SIZE,
        "Push payload of {} bytes exceeds the {}-byte limit",
        plaintext_len,
        MAX_PLAINTEXT_LEN
    );
    u32::try_from(size).context("Record size overflow")
}

/// Encrypt `plaintext` for a subscriber with a fresh ephemeral key and salt.
pub fn encrypt(keys: &SubscriberKeys, plaintext: &[u8]) -> Result<Vec<u8>> {
    let ephemeral = SecretKey::random(&mut p256::elliptic_curve::rand_core::OsRng);
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);
    encrypt_with(keys, plaintext, &ephemeral, salt)
}

/// Encrypt with a caller-supplied ephemeral key and salt.
///
/// Output is fully determined by the inputs. Production callers must go
/// through [`encrypt`]; reusing an ephemeral key across messages breaks the
/// protocol's forward secrecy.
pub fn encrypt_with(
    keys: &SubscriberKeys,
    plaintext: &[u8],
    ephemeral: &SecretKey,
    salt: [u8; SALT_LEN],
) -> Result<Vec<u8>> {
    let rs = record_size(plaintext.len())?;

    let ephemeral_public = ephemeral.public_key().to_encoded_point(false);
    let subscriber_public = keys.public_key.to_encoded_point(false);

    let shared = p256::ecdh::diffie_hellman(
        ephemeral.to_nonzero_scalar(),
        keys.public_key.as_affine(),
    );

    let ikm = derive_ikm(
        &keys.auth_secret,
        shared.raw_secret_bytes().as_slice(),
        subscriber_public.as_bytes(),
        ephemeral_public.as_bytes(),
    )?;
    let (cek, nonce) = derive_content_keys(&salt, ikm.as_slice())?;

    let mut padded = Zeroizing::new(Vec::with_capacity(plaintext.len() + 1));
    padded.extend_from_slice(plaintext);
    padded.push(LAST_RECORD_DELIMITER);

    let cipher = Aes128Gcm::new_from_slice(cek.as_slice())
        .map_err(|e| anyhow::anyhow!("Invalid content-encryption key: {e}"))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce.as_slice()), padded.as_slice())
        .map_err(|e| anyhow::anyhow!("AES-128-GCM encryption failed: {e}"))?;

    let mut body = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    body.extend_from_slice(&salt);
    body.extend_from_slice(&rs.to_be_bytes());
    body.push(PUBLIC_KEY_LEN as u8);
    body.extend_from_slice(ephemeral_public.as_bytes());
    body.extend_from_slice(&ciphertext);

    debug_assert_eq!(body.len(), plaintext.len() + 1 + TAG_LEN + HEADER_LEN);
    Ok(body)
}

/// `IKM = HKDF(salt = auth, ikm = ecdh_secret, info = "WebPush: info\0" || ua_public || as_public)`.
pub fn derive_ikm(
    auth_secret: &[u8],
    ecdh_secret: &[u8],
    subscriber_public: &[u8],
    ephemeral_public: &[u8],
) -> Result<Zeroizing<[u8; IKM_LEN]>> {
    let mut info = Vec::with_capacity(WEBPUSH_INFO.len() + 2 * PUBLIC_KEY_LEN);
    info.extend_from_slice(WEBPUSH_INFO);
    info.extend_from_slice(subscriber_public);
    info.extend_from_slice(ephemeral_public);

    let mut ikm = Zeroizing::new([0u8; IKM_LEN]);
    Hkdf::<Sha256>::new(Some(auth_secret), ecdh_secret)
        .expand(&info, ikm.as_mut_slice())
        .map_err(|e| anyhow::anyhow!("HKDF expand for IKM failed: {e}"))?;
    Ok(ikm)
}

/// Derive the content-encryption key and nonce from the record salt and IKM.
pub fn derive_content_keys(
    salt: &[u8],
    ikm: &[u8],
) -> Result<(Zeroizing<[u8; CEK_LEN]>, Zeroizing<[u8; NONCE_LEN]>)> {
    let hk = Hkdf::<Sha256>::new(Some(salt), ikm);

    let mut cek = Zeroizing::new([0u8; CEK_LEN]);
    hk.expand(CEK_INFO, cek.as_mut_slice())
        .map_err(|e| anyhow::anyhow!("HKDF expand for CEK failed: {e}"))?;

    let mut nonce = Zeroizing::new([0u8; NONCE_LEN]);
    hk.expand(NONCE_INFO, nonce.as_mut_slice())
        .map_err(|e| anyhow::anyhow!("HKDF expand for nonce failed: {e}"))?;

    Ok((cek, nonce))
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::elliptic_curve::rand_core::OsRng;

    fn subscriber() -> (SecretKey, SubscriberKeys) {
        let secret = SecretKey::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(false);
        let keys = SubscriberKeys::from_bytes(public.as_bytes(), &[7u8; 16]).unwrap();
        (secret, keys)
    }

    fn fixed_ephemeral() -> SecretKey {
        SecretKey::from_slice(&[0x42u8; 32]).unwrap()
    }

    #[test]
    fn test_encrypt_is_deterministic_with_fixed_randomness() {
        let (_, keys) = subscriber();
        let plaintext = br#"{"title":"New booking","body":"Check-in Friday"}"#;

        let a = encrypt_with(&keys, plaintext, &fixed_ephemeral(), [9u8; 16]).unwrap();
        let b = encrypt_with(&keys, plaintext, &fixed_ephemeral(), [9u8; 16]).unwrap();
        assert_eq!(a, b);

        let c = encrypt_with(&keys, plaintext, &fixed_ephemeral(), [8u8; 16]).unwrap();
        assert_ne!(a, c, "salt must influence the ciphertext");
    }

    #[test]
    fn test_encrypt_randomizes_salt_and_key() {
        let (_, keys) = subscriber();
        let a = encrypt(&keys, b"hello").unwrap();
        let b = encrypt(&keys, b"hello").unwrap();
        assert_ne!(a[..16], b[..16], "fresh salt per message");
        assert_ne!(a[21..86], b[21..86], "fresh ephemeral key per message");
    }

    #[test]
    fn test_header_layout() {
        let (_, keys) = subscriber();
        let ephemeral = fixed_ephemeral();
        let plaintext = b"payload";
        let body = encrypt_with(&keys, plaintext, &ephemeral, [3u8; 16]).unwrap();

        assert_eq!(&body[..16], &[3u8; 16]);
        let rs = u32::from_be_bytes(body[16..20].try_into().unwrap());
        assert_eq!(rs as usize, plaintext.len() + 1 + 16 + 86);
        assert_eq!(body[20], 65);
        assert_eq!(&body[21..86], ephemeral.public_key().to_encoded_point(false).as_bytes());
        assert_eq!(body.len(), 86 + plaintext.len() + 1 + 16);
    }

    #[test]
    fn test_record_size_limit() {
        assert_eq!(record_size(0).unwrap(), 103);
        assert_eq!(record_size(MAX_PLAINTEXT_LEN).unwrap() as usize, MAX_RECORD_SIZE);
        assert!(record_size(MAX_PLAINTEXT_LEN + 1).is_err());

        let (_, keys) = subscriber();
        let oversized = vec![b'x'; MAX_PLAINTEXT_LEN + 1];
        assert!(encrypt(&keys, &oversized).is_err());
    }

    #[test]
    fn test_subscriber_keys_validation() {
        let (secret, _) = subscriber();
        let public = secret.public_key().to_encoded_point(false);
        let compressed = secret.public_key().to_encoded_point(true);

        assert!(SubscriberKeys::from_bytes(public.as_bytes(), &[0u8; 15]).is_err());
        assert!(SubscriberKeys::from_bytes(compressed.as_bytes(), &[0u8; 16]).is_err());
        assert!(SubscriberKeys::from_bytes(&[0x04; 65], &[0u8; 16]).is_err());
        assert!(SubscriberKeys::from_base64url("not base64!", "AAAAAAAAAAAAAAAAAAAAAA").is_err());
    }

    fn b64(s: &str) -> Vec<u8> {
        base64url::decode(s).unwrap()
    }

    /// RFC 8291 Appendix A, except `rs`: the record is sized to the message
    /// (144) where the RFC example advertises 4096.
    #[test]
    fn test_rfc8291_known_answer() {
        let as_private = SecretKey::from_slice(&b64("yfWPiYE-n46HLnH0KqZOF1fJJU3MYrct3AELtAQ-oRw")).unwrap();
        let keys = SubscriberKeys::from_base64url(
            "BCVxsr7N_eNgVRqvHtD0zTZsEc6-VV-JvLexhqUzORcxaOzi6-AYWXvTBHm4bjyPjs7Vd8pZGH6SRpkNtoIAiw4",
            "BTBZMqHH6r4Tts7J_aSIgg",
        )
        .unwrap();
        let salt: [u8; 16] = b64("DGv6ra1nlYgDCS1FRnbzlw").try_into().unwrap();
        let expected = b64(
            "DGv6ra1nlYgDCS1FRnbzlwAAEABBBP4z9KsN6nGRTbVYI_c7VJSPQTBtkgcy27mlmlMoZIIgDll6e3vCYLocInmYWAmS6TlzAC8wEqKK6PBru3jl7A_yl95bQpu6cVPTpK4Mqgkf1CXztLVBSt2Ks3oZwbuwXPXLWyouBWLVWGNWQexSgSxsj_Qulcy4a-fN",
        );

        let body = encrypt_with(
            &keys,
            b"When I grow up, I want to be a watermelon",
            &as_private,
            salt,
        )
        .unwrap();

        assert_eq!(body.len(), expected.len());
        assert_eq!(&body[..16], &expected[..16], "salt");
        assert_eq!(&body[16..20], &[0, 0, 0, 144], "rs sized to the record");
        assert_eq!(&body[20..], &expected[20..], "idlen, keyid and ciphertext");
    }

    #[test]
    fn test_debug_omits_auth_secret() {
        let (_, keys) = subscriber();
        let debug = format!("{keys:?}");
        assert!(debug.contains("public_key"));
        assert!(!debug.contains("auth_secret"));
        assert!(!debug.contains("7, 7"));
    }

    #[test]
    fn test_decrypt_with_subscriber_secret() {
        let (secret, keys) = subscriber();
        let plaintext = b"When I grow up, I want to be a watermelon";
        let body = encrypt(&keys, plaintext).unwrap();

        // Reverse the derivation from the user agent's side
        let as_public = PublicKey::from_sec1_bytes(&body[21..86]).unwrap();
        let shared = p256::ecdh::diffie_hellman(secret.to_nonzero_scalar(), as_public.as_affine());
        let ikm = derive_ikm(
            keys.auth_secret(),
            shared.raw_secret_bytes().as_slice(),
            secret.public_key().to_encoded_point(false).as_bytes(),
            &body[21..86],
        )
        .unwrap();
        let (cek, nonce) = derive_content_keys(&body[..16], ikm.as_slice()).unwrap();

        let cipher = Aes128Gcm::new_from_slice(cek.as_slice()).unwrap();
        let padded = cipher
            .decrypt(Nonce::from_slice(nonce.as_slice()), &body[86..])
            .unwrap();
        assert_eq!(padded.last(), Some(&LAST_RECORD_DELIMITER));
        assert_eq!(&padded[..padded.len() - 1], plaintext);
    }
}
