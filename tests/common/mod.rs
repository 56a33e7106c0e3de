//! Shared helpers: a simulated browser (user agent) and a dispatcher with
//! throwaway VAPID keys.

#![allow(dead_code)]

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes128Gcm, Nonce,
};
use hkdf::Hkdf;
use host_push::notifications::base64url;
use host_push::{PushDispatcher, PushSubscription, VapidKeys, VapidSigner};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::{OsRng, RngCore};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::Sha256;

/// A browser's side of a push subscription.
pub struct Browser {
    pub secret: SecretKey,
    pub auth: [u8; 16],
}

impl Browser {
    pub fn new() -> Self {
        let mut auth = [0u8; 16];
        OsRng.fill_bytes(&mut auth);
        Self {
            secret: SecretKey::random(&mut OsRng),
            auth,
        }
    }

    pub fn subscription(&self, endpoint: &str) -> PushSubscription {
        PushSubscription {
            endpoint: endpoint.to_string(),
            p256dh: base64url::encode(self.secret.public_key().to_encoded_point(false).as_bytes()),
            auth: base64url::encode(self.auth),
        }
    }

    /// Decrypt an `aes128gcm` body the way a user agent does (RFC 8291 §3.4).
    pub fn decrypt(&self, body: &[u8]) -> Vec<u8> {
        self.try_decrypt(body).expect("authentication tag mismatch")
    }

    /// Like [`Browser::decrypt`], but `None` when the tag does not verify.
    pub fn try_decrypt(&self, body: &[u8]) -> Option<Vec<u8>> {
        let salt = &body[..16];
        let rs = u32::from_be_bytes(body[16..20].try_into().unwrap()) as usize;
        let idlen = body[20] as usize;
        let sender_public = &body[21..21 + idlen];
        let ciphertext = &body[21 + idlen..];
        assert!(ciphertext.len() + 21 + idlen <= rs, "record larger than rs");

        let sender = PublicKey::from_sec1_bytes(sender_public).unwrap();
        let shared = p256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), sender.as_affine());

        let mut key_info = b"WebPush: info\0".to_vec();
        key_info.extend_from_slice(self.secret.public_key().to_encoded_point(false).as_bytes());
        key_info.extend_from_slice(sender_public);
        let mut ikm = [0u8; 32];
        Hkdf::<Sha256>::new(Some(&self.auth), shared.raw_secret_bytes().as_slice())
            .expand(&key_info, &mut ikm)
            .unwrap();

        let hk = Hkdf::<Sha256>::new(Some(salt), &ikm);
        let mut cek = [0u8; 16];
        hk.expand(b"Content-Encoding: aes128gcm\0", &mut cek).unwrap();
        let mut nonce = [0u8; 12];
        hk.expand(b"Content-Encoding: nonce\0", &mut nonce).unwrap();

        let mut padded = Aes128Gcm::new_from_slice(&cek)
            .unwrap()
            .decrypt(Nonce::from_slice(&nonce), ciphertext)
            .ok()?;

        while padded.last() == Some(&0) {
            padded.pop();
        }
        assert_eq!(padded.pop(), Some(0x02), "last record delimiter");
        Some(padded)
    }
}

pub fn vapid_keys() -> VapidKeys {
    VapidKeys::from_signing_key(SigningKey::random(&mut OsRng))
}

pub fn dispatcher() -> PushDispatcher {
    let signer = VapidSigner::new(vapid_keys(), "mailto:ops@example.com", 3600).unwrap();
    PushDispatcher::new(reqwest::Client::new(), signer, 60)
}
