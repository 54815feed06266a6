//! Shared-secret key material and the authenticated-encryption envelope.
//!
//! Every paired credential owns a 32-byte shared secret. Payloads that
//! cross the wireless link are sealed under that secret with
//! ChaCha20-Poly1305: a fresh random initialization vector per seal, and
//! a detached integrity tag over the ciphertext. Opening an envelope
//! either yields the original plaintext or fails as a whole.

use chacha20poly1305::aead::AeadInPlace;
use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{ProtocolError, Result};

/// Length of a shared secret in bytes.
pub const KEY_SIZE: usize = 32;

/// Length of an envelope initialization vector in bytes.
pub const IV_SIZE: usize = 12;

/// Length of an envelope integrity tag in bytes.
pub const TAG_SIZE: usize = 16;

/// A 32-byte shared secret.
///
/// Key material is zeroized on drop and redacted from `Debug` output.
/// Serialized forms use base64 in human-readable formats and raw bytes
/// otherwise; a secret must only ever be serialized into a sealed
/// payload or a secure store.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct KeyData([u8; KEY_SIZE]);

impl KeyData {
    /// Generates a fresh random secret from the operating system RNG.
    pub fn new() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Creates a secret from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Returns the raw bytes of this secret.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    /// Returns this secret encoded as base64.
    pub fn to_base64(&self) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(self.0)
    }

    /// Parses a secret from its base64 encoding.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        use base64::Engine;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| ProtocolError::Validation(format!("invalid base64 secret: {}", e)))?;
        let array: [u8; KEY_SIZE] = bytes.try_into().map_err(|bytes: Vec<u8>| {
            ProtocolError::Validation(format!(
                "invalid secret length: expected {}, got {}",
                KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }
}

impl Default for KeyData {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyData").field(&"[REDACTED]").finish()
    }
}

impl Serialize for KeyData {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if serializer.is_human_readable() {
            self.to_base64().serialize(serializer)
        } else {
            serde_bytes::Bytes::new(&self.0).serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for KeyData {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        if deserializer.is_human_readable() {
            let encoded = String::deserialize(deserializer)?;
            KeyData::from_base64(&encoded).map_err(serde::de::Error::custom)
        } else {
            let bytes: serde_bytes::ByteBuf = Deserialize::deserialize(deserializer)?;
            if bytes.len() != KEY_SIZE {
                return Err(serde::de::Error::custom(format!(
                    "invalid secret length: expected {}, got {}",
                    KEY_SIZE,
                    bytes.len()
                )));
            }
            let mut array = [0u8; KEY_SIZE];
            array.copy_from_slice(&bytes);
            Ok(KeyData(array))
        }
    }
}

/// A random per-envelope initialization vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializationVector(#[serde(with = "serde_bytes")] pub [u8; IV_SIZE]);

impl InitializationVector {
    /// Generates a fresh random initialization vector.
    pub fn generate() -> Self {
        let mut bytes = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the raw bytes of this initialization vector.
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

/// An encrypted, integrity-protected payload.
///
/// The tag covers the ciphertext; opening with the wrong secret, or with
/// any byte of the vector, ciphertext, or tag altered, fails uniformly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    /// The initialization vector used for this envelope.
    pub iv: InitializationVector,
    /// The encrypted payload bytes.
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
    /// The Poly1305 integrity tag.
    #[serde(with = "serde_bytes")]
    pub tag: [u8; TAG_SIZE],
}

impl SealedPayload {
    /// Seals a plaintext under the given secret.
    ///
    /// A fresh initialization vector is drawn per call; sealing the same
    /// plaintext twice never produces the same envelope.
    pub fn seal(plaintext: &[u8], secret: &KeyData) -> Result<Self> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(secret.as_bytes()));
        let iv = InitializationVector::generate();

        let mut ciphertext = plaintext.to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(iv.as_bytes()), &[], &mut ciphertext)
            .map_err(|e| ProtocolError::Encryption(e.to_string()))?;

        Ok(Self {
            iv,
            ciphertext,
            tag: tag.into(),
        })
    }

    /// Opens this envelope with the given secret.
    ///
    /// Returns the original plaintext, or a uniform decryption error on
    /// any tag mismatch. Never yields partially decrypted data.
    pub fn open(&self, secret: &KeyData) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(secret.as_bytes()));

        let mut plaintext = self.ciphertext.clone();
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(self.iv.as_bytes()),
                &[],
                &mut plaintext,
                Tag::from_slice(&self.tag),
            )
            .map_err(|_| ProtocolError::Decryption)?;

        Ok(plaintext)
    }

    /// Serializes this envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec(self).map_err(ProtocolError::from)
    }

    /// Deserializes an envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes).map_err(ProtocolError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_generation_produces_unique_secrets() {
        let a = KeyData::new();
        let b = KeyData::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_key_base64_roundtrip() {
        let key = KeyData::new();
        let restored = KeyData::from_base64(&key.to_base64()).unwrap();
        assert_eq!(key, restored);
    }

    #[test]
    fn test_key_base64_rejects_wrong_length() {
        use base64::Engine;
        let short = base64::engine::general_purpose::STANDARD.encode([0u8; 16]);
        assert!(matches!(
            KeyData::from_base64(&short),
            Err(ProtocolError::Validation(_))
        ));
    }

    #[test]
    fn test_key_debug_redacts_material() {
        let key = KeyData::from_bytes([0x42; KEY_SIZE]);
        let debug = format!("{:?}", key);
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));
    }

    #[test]
    fn test_key_json_serializes_as_base64() {
        let key = KeyData::from_bytes([0x01; KEY_SIZE]);
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, format!("\"{}\"", key.to_base64()));
        let restored: KeyData = serde_json::from_str(&json).unwrap();
        assert_eq!(key, restored);
    }

    #[test]
    fn test_key_msgpack_roundtrip() {
        let key = KeyData::new();
        let bytes = rmp_serde::to_vec(&key).unwrap();
        let restored: KeyData = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(key, restored);
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let secret = KeyData::new();
        let plaintext = b"unlock the front door";

        let sealed = SealedPayload::seal(plaintext, &secret).unwrap();
        assert_ne!(sealed.ciphertext, plaintext);

        let opened = sealed.open(&secret).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_seal_open_roundtrip_empty_plaintext() {
        let secret = KeyData::new();
        let sealed = SealedPayload::seal(&[], &secret).unwrap();
        assert_eq!(sealed.open(&secret).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_open_with_wrong_secret_fails() {
        let secret = KeyData::new();
        let other = KeyData::new();
        let sealed = SealedPayload::seal(b"secret message", &secret).unwrap();

        let result = sealed.open(&other);
        assert!(matches!(result, Err(ProtocolError::Decryption)));
    }

    #[test]
    fn test_open_with_corrupted_ciphertext_fails() {
        let secret = KeyData::new();
        let mut sealed = SealedPayload::seal(b"secret message", &secret).unwrap();
        sealed.ciphertext[0] ^= 0xFF;

        assert!(matches!(sealed.open(&secret), Err(ProtocolError::Decryption)));
    }

    #[test]
    fn test_open_with_corrupted_iv_fails() {
        let secret = KeyData::new();
        let mut sealed = SealedPayload::seal(b"secret message", &secret).unwrap();
        sealed.iv.0[0] ^= 0x01;

        assert!(matches!(sealed.open(&secret), Err(ProtocolError::Decryption)));
    }

    #[test]
    fn test_open_with_corrupted_tag_fails() {
        let secret = KeyData::new();
        let mut sealed = SealedPayload::seal(b"secret message", &secret).unwrap();
        sealed.tag[TAG_SIZE - 1] ^= 0x80;

        assert!(matches!(sealed.open(&secret), Err(ProtocolError::Decryption)));
    }

    #[test]
    fn test_open_truncated_ciphertext_fails() {
        let secret = KeyData::new();
        let mut sealed = SealedPayload::seal(b"secret message", &secret).unwrap();
        sealed.ciphertext.pop();

        assert!(matches!(sealed.open(&secret), Err(ProtocolError::Decryption)));
    }

    #[test]
    fn test_fresh_iv_per_seal() {
        let secret = KeyData::new();
        let a = SealedPayload::seal(b"same plaintext", &secret).unwrap();
        let b = SealedPayload::seal(b"same plaintext", &secret).unwrap();
        assert_ne!(a.iv, b.iv);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_sealed_payload_wire_roundtrip() {
        let secret = KeyData::new();
        let sealed = SealedPayload::seal(b"wire format", &secret).unwrap();

        let bytes = sealed.to_bytes().unwrap();
        let restored = SealedPayload::from_bytes(&bytes).unwrap();

        assert_eq!(sealed, restored);
        assert_eq!(restored.open(&secret).unwrap(), b"wire format");
    }

    #[test]
    fn test_sealed_payload_from_garbage_fails() {
        let result = SealedPayload::from_bytes(&[0xFF, 0x00, 0x13]);
        assert!(matches!(result, Err(ProtocolError::Deserialization(_))));
    }
}
