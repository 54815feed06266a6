//! Out-of-band invitation documents for new keys.
//!
//! An owner or admin exports an invitation as a self-contained JSON
//! document carrying the lock identifier, the pending key, and the
//! invitation secret. The document travels outside the wireless link
//! (as a file, a QR code, or a share sheet) and is consumed by the
//! redemption flow.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::KeyData;
use crate::error::{ProtocolError, Result};
use crate::keys::NewKey;

/// Conventional file extension for exported invitations.
pub const FILE_EXTENSION: &str = "skey";

/// A self-contained invitation to redeem a pending key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKeyInvitation {
    /// Identifier of the lock the key belongs to.
    pub lock: Uuid,
    /// The pending key being offered.
    pub key: NewKey,
    /// The invitation secret; proves the holder was invited.
    pub secret: KeyData,
}

impl NewKeyInvitation {
    /// Creates an invitation document.
    pub fn new(lock: Uuid, key: NewKey, secret: KeyData) -> Self {
        Self { lock, key, secret }
    }

    /// Serializes this invitation to a portable JSON document.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(ProtocolError::from)
    }

    /// Parses an invitation from its JSON document form.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(ProtocolError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::Permission;
    use chrono::{Duration, Utc};

    fn invitation() -> NewKeyInvitation {
        NewKeyInvitation::new(
            Uuid::new_v4(),
            NewKey::new(
                "House sitter",
                Permission::Anytime,
                Utc::now() + Duration::days(1),
            ),
            KeyData::new(),
        )
    }

    #[test]
    fn test_json_roundtrip() {
        let original = invitation();
        let json = original.to_json().unwrap();
        let restored = NewKeyInvitation::from_json(&json).unwrap();
        assert_eq!(original, restored);
    }

    #[test]
    fn test_document_embeds_secret_as_base64() {
        let original = invitation();
        let json = original.to_json().unwrap();
        assert!(json.contains(&original.secret.to_base64()));
    }

    #[test]
    fn test_from_json_rejects_malformed_document() {
        assert!(NewKeyInvitation::from_json("{\"lock\": 7}").is_err());
        assert!(NewKeyInvitation::from_json("not json at all").is_err());
    }
}
