//! Challenge-response proof of possession for a shared secret.
//!
//! A credential proves it holds a secret by sending a keyed hash over a
//! fresh random nonce and the current timestamp, never the secret
//! itself. Verification recomputes the HMAC and compares in constant
//! time.
//!
//! No nonce history or freshness window is kept: every proof carries a
//! fresh nonce, but a captured proof value could in principle be
//! replayed within its originating connection. Known limitation of the
//! scheme.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::crypto::KeyData;

type HmacSha256 = Hmac<Sha256>;

/// Length of an authentication nonce in bytes.
pub const NONCE_SIZE: usize = 16;

/// Length of an authentication proof value in bytes.
pub const MAC_SIZE: usize = 32;

/// A random single-use challenge value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthNonce(#[serde(with = "serde_bytes")] pub [u8; NONCE_SIZE]);

impl AuthNonce {
    /// Generates a fresh random nonce.
    pub fn generate() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the raw bytes of this nonce.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// A proof of possession of a shared secret.
///
/// Constructed fresh per operation and never persisted. The proof value
/// is `HMAC-SHA256(secret, timestamp_seconds_be || nonce)`; the
/// timestamp is authenticated together with the nonce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    /// The fresh random nonce for this proof.
    pub nonce: AuthNonce,
    /// When the proof was constructed.
    #[serde(with = "chrono::serde::ts_seconds")]
    pub date: DateTime<Utc>,
    /// The keyed hash over the timestamp and nonce.
    #[serde(with = "serde_bytes")]
    pub mac: [u8; MAC_SIZE],
}

impl Authentication {
    /// Builds a proof for the given secret, stamped with the current time.
    pub fn new(secret: &KeyData) -> Self {
        Self::at(secret, Utc::now())
    }

    /// Builds a proof for the given secret at an explicit timestamp.
    ///
    /// The timestamp is truncated to whole seconds, the granularity the
    /// wire format carries.
    pub fn at(secret: &KeyData, date: DateTime<Utc>) -> Self {
        let date = DateTime::from_timestamp(date.timestamp(), 0).unwrap_or(date);
        let nonce = AuthNonce::generate();
        let mac = Self::compute(secret, &nonce, date);
        Self { nonce, date, mac }
    }

    /// Verifies this proof against the given secret.
    ///
    /// The comparison is constant-time; any mismatch yields `false`
    /// regardless of which part of the proof was wrong.
    pub fn is_authenticated(&self, secret: &KeyData) -> bool {
        let mut hmac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts any key length");
        hmac.update(&self.date.timestamp().to_be_bytes());
        hmac.update(self.nonce.as_bytes());
        hmac.verify_slice(&self.mac).is_ok()
    }

    fn compute(secret: &KeyData, nonce: &AuthNonce, date: DateTime<Utc>) -> [u8; MAC_SIZE] {
        let mut hmac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts any key length");
        hmac.update(&date.timestamp().to_be_bytes());
        hmac.update(nonce.as_bytes());
        hmac.finalize().into_bytes().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proof_verifies_with_same_secret() {
        let secret = KeyData::new();
        let proof = Authentication::new(&secret);
        assert!(proof.is_authenticated(&secret));
    }

    #[test]
    fn test_proof_fails_with_other_secret() {
        let secret = KeyData::new();
        let other = KeyData::new();
        let proof = Authentication::new(&secret);
        assert!(!proof.is_authenticated(&other));
    }

    #[test]
    fn test_fresh_nonce_per_proof() {
        let secret = KeyData::new();
        let a = Authentication::new(&secret);
        let b = Authentication::new(&secret);
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.mac, b.mac);
    }

    #[test]
    fn test_any_nonce_bit_flip_fails_verification() {
        let secret = KeyData::new();
        let proof = Authentication::new(&secret);

        for byte in 0..NONCE_SIZE {
            for bit in 0..8 {
                let mut tampered = proof.clone();
                tampered.nonce.0[byte] ^= 1 << bit;
                assert!(
                    !tampered.is_authenticated(&secret),
                    "nonce bit {}:{} accepted",
                    byte,
                    bit
                );
            }
        }
    }

    #[test]
    fn test_any_mac_bit_flip_fails_verification() {
        let secret = KeyData::new();
        let proof = Authentication::new(&secret);

        for byte in 0..MAC_SIZE {
            let mut tampered = proof.clone();
            tampered.mac[byte] ^= 0x01;
            assert!(!tampered.is_authenticated(&secret), "mac byte {} accepted", byte);
        }
    }

    #[test]
    fn test_tampered_timestamp_fails_verification() {
        let secret = KeyData::new();
        let mut proof = Authentication::new(&secret);
        proof.date = proof.date + chrono::Duration::seconds(1);
        assert!(!proof.is_authenticated(&secret));
    }

    #[test]
    fn test_proof_survives_wire_roundtrip() {
        let secret = KeyData::new();
        let proof = Authentication::new(&secret);

        let bytes = rmp_serde::to_vec(&proof).unwrap();
        let restored: Authentication = rmp_serde::from_slice(&bytes).unwrap();

        assert_eq!(proof, restored);
        assert!(restored.is_authenticated(&secret));
    }

    #[test]
    fn test_explicit_timestamp_is_recorded() {
        let secret = KeyData::new();
        let date = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let proof = Authentication::at(&secret, date);
        assert_eq!(proof.date, date);
        assert!(proof.is_authenticated(&secret));
    }
}
