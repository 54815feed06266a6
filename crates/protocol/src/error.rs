//! Error types for the protocol crate.

use thiserror::Error;

/// Protocol error type covering all possible failure modes.
///
/// Authentication and decryption failures deliberately carry no detail:
/// a verifier must not reveal whether the key was wrong or the data was
/// corrupted, so each category collapses to a single uniform value.
#[derive(Debug, Error)]
pub enum ProtocolError {
    // Cryptographic errors
    /// Proof-of-possession verification failed.
    #[error("invalid authentication")]
    InvalidAuthentication,

    /// Envelope could not be opened.
    #[error("decryption failed")]
    Decryption,

    /// Envelope could not be sealed.
    #[error("encryption failed: {0}")]
    Encryption(String),

    // Frame errors
    /// Malformed or inconsistent chunk.
    #[error("framing error: {0}")]
    Framing(String),

    // Credential errors
    /// The presented invitation has passed its expiration date.
    #[error("invitation expired")]
    InvitationExpired,

    /// The credential's schedule does not permit the action at this time.
    #[error("permission denied")]
    PermissionDenied,

    /// A field failed validation during construction.
    #[error("invalid value: {0}")]
    Validation(String),

    // Serialization errors
    /// Failed to serialize a record.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Failed to deserialize a record.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    // Connection errors
    /// The external transport failed (disconnect, unknown peer).
    #[error("transport failure: {0}")]
    Transport(String),
}

/// Result type alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

// Conversions from underlying crate errors

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_eof() || err.is_syntax() {
            ProtocolError::Deserialization(err.to_string())
        } else {
            ProtocolError::Serialization(err.to_string())
        }
    }
}

impl From<rmp_serde::encode::Error> for ProtocolError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ProtocolError::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for ProtocolError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ProtocolError::Deserialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_authentication_display() {
        let err = ProtocolError::InvalidAuthentication;
        assert_eq!(err.to_string(), "invalid authentication");
    }

    #[test]
    fn test_decryption_display_carries_no_detail() {
        let err = ProtocolError::Decryption;
        assert_eq!(err.to_string(), "decryption failed");
    }

    #[test]
    fn test_framing_error_display() {
        let err = ProtocolError::Framing("declared length exceeded".to_string());
        assert_eq!(err.to_string(), "framing error: declared length exceeded");
    }

    #[test]
    fn test_invitation_expired_display() {
        let err = ProtocolError::InvitationExpired;
        assert_eq!(err.to_string(), "invitation expired");
    }

    #[test]
    fn test_permission_denied_display() {
        let err = ProtocolError::PermissionDenied;
        assert_eq!(err.to_string(), "permission denied");
    }

    #[test]
    fn test_transport_error_display() {
        let err = ProtocolError::Transport("peer disconnected".to_string());
        assert_eq!(err.to_string(), "transport failure: peer disconnected");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let protocol_err: ProtocolError = json_err.into();
        assert!(matches!(protocol_err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_from_rmp_serde_decode_error() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct TestStruct {
            field: String,
        }
        let msgpack_err = rmp_serde::from_slice::<TestStruct>(&[0x00]).unwrap_err();
        let protocol_err: ProtocolError = msgpack_err.into();
        assert!(matches!(protocol_err, ProtocolError::Deserialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProtocolError>();
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_result() -> Result<()> {
            Ok(())
        }
        assert!(returns_result().is_ok());
    }
}
