//! Structured records carried over the lock's characteristics.
//!
//! Each characteristic carries exactly one record type: setup requests,
//! unlock requests, key management requests, key-list entries, and
//! event-log items. Records are serialized with MessagePack, then sealed
//! and framed as the flow requires.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::Authentication;
use crate::crypto::{KeyData, SealedPayload};
use crate::error::{ProtocolError, Result};
use crate::keys::{Key, KeyType, NewKey};

/// Serializes a record to MessagePack bytes.
pub fn to_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec(value).map_err(ProtocolError::from)
}

/// Deserializes a record from MessagePack bytes.
pub fn from_bytes<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    rmp_serde::from_slice(bytes).map_err(ProtocolError::from)
}

// ============================================================================
// Lock Information
// ============================================================================

/// Operating status of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockStatus {
    /// Factory state; awaiting initial setup.
    Setup,
    /// Paired and ready to unlock.
    Unlock,
}

/// Publicly readable lock identity and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInformation {
    /// Unique identifier of the lock.
    pub id: Uuid,
    /// Current operating status.
    pub status: LockStatus,
}

// ============================================================================
// Setup
// ============================================================================

/// Initial pairing request, sealed under the lock's factory secret.
///
/// Carries the owner key's identifier and the secret the initiating
/// device chose for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupRequest {
    /// Identifier of the owner key being installed.
    pub id: Uuid,
    /// The shared secret chosen for the owner key.
    pub secret: KeyData,
}

impl SetupRequest {
    /// Creates a setup request with a fresh identifier and secret.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            secret: KeyData::new(),
        }
    }
}

impl Default for SetupRequest {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Unlock
// ============================================================================

/// How an unlock was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UnlockAction {
    /// Requested over the wireless link.
    #[default]
    Default,
    /// Triggered by the physical button on the lock.
    Button,
}

/// Request to actuate the lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockRequest {
    /// Identifier of the acting key.
    pub key: Uuid,
    /// How the unlock was requested.
    pub action: UnlockAction,
    /// Proof of possession of the acting key's secret.
    pub authentication: Authentication,
}

impl UnlockRequest {
    /// Builds an unlock request proving possession of `secret`.
    pub fn new(key: Uuid, secret: &KeyData) -> Self {
        Self {
            key,
            action: UnlockAction::Default,
            authentication: Authentication::new(secret),
        }
    }
}

// ============================================================================
// Key Management
// ============================================================================

/// The sealed interior of a create-new-key request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKeyPayload {
    /// The pending key being offered.
    pub new_key: NewKey,
    /// The invitation secret the redeemer must prove possession of.
    pub secret: KeyData,
}

/// Request to offer a new key, issued by an owner or admin.
///
/// The payload travels sealed under the issuing key's secret; the
/// issuer additionally proves possession of that secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNewKeyRequest {
    /// Identifier of the issuing key.
    pub key: Uuid,
    /// Proof of possession of the issuing key's secret.
    pub authentication: Authentication,
    /// The sealed `NewKeyPayload`.
    pub sealed: SealedPayload,
}

impl CreateNewKeyRequest {
    /// Builds a request offering `payload`, sealed under `issuer_secret`.
    pub fn new(issuer: Uuid, issuer_secret: &KeyData, payload: &NewKeyPayload) -> Result<Self> {
        let plaintext = to_bytes(payload)?;
        Ok(Self {
            key: issuer,
            authentication: Authentication::new(issuer_secret),
            sealed: SealedPayload::seal(&plaintext, issuer_secret)?,
        })
    }

    /// Opens the sealed payload with the issuing key's secret.
    pub fn open(&self, issuer_secret: &KeyData) -> Result<NewKeyPayload> {
        let plaintext = self.sealed.open(issuer_secret)?;
        from_bytes(&plaintext)
    }
}

/// Redemption request for a pending key.
///
/// The redeemer proves possession of the invitation secret; it never
/// transmits the secret itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmNewKeyRequest {
    /// Identifier of the pending key being redeemed.
    pub key: Uuid,
    /// Proof of possession of the invitation secret.
    pub authentication: Authentication,
}

/// Redemption response: the ongoing secret for the confirmed key.
///
/// Travels sealed under the invitation secret. The issued secret is
/// always freshly generated, never the invitation secret itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmNewKeyResponse {
    /// The shared secret the confirmed key will use from now on.
    pub secret: KeyData,
}

/// Request to remove an issued or pending key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveKeyRequest {
    /// Identifier of the acting key.
    pub key: Uuid,
    /// Proof of possession of the acting key's secret.
    pub authentication: Authentication,
    /// Identifier of the key to remove.
    pub remove: Uuid,
    /// Whether the target is an issued or a pending key.
    pub kind: KeyType,
}

impl RemoveKeyRequest {
    /// Builds a removal request proving possession of `secret`.
    pub fn new(key: Uuid, secret: &KeyData, remove: Uuid, kind: KeyType) -> Self {
        Self {
            key,
            authentication: Authentication::new(secret),
            remove,
            kind,
        }
    }
}

// ============================================================================
// Key Listing
// ============================================================================

/// Request to read back the credential list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListKeysRequest {
    /// Identifier of the acting key.
    pub key: Uuid,
    /// Proof of possession of the acting key's secret.
    pub authentication: Authentication,
}

impl ListKeysRequest {
    /// Builds a listing request proving possession of `secret`.
    pub fn new(key: Uuid, secret: &KeyData) -> Self {
        Self {
            key,
            authentication: Authentication::new(secret),
        }
    }
}

/// One entry of the credential list. Secrets are never listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "entry", rename_all = "lowercase")]
pub enum KeyEntry {
    /// An issued key.
    Key(Key),
    /// A pending key awaiting redemption.
    NewKey(NewKey),
}

impl KeyEntry {
    /// Returns the identifier of the listed key.
    pub fn id(&self) -> Uuid {
        match self {
            KeyEntry::Key(key) => key.id,
            KeyEntry::NewKey(new_key) => new_key.id,
        }
    }
}

/// One item of a streamed credential list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyListNotification {
    /// The listed entry.
    pub entry: KeyEntry,
    /// Set on the final item of the transfer.
    pub is_last: bool,
}

// ============================================================================
// Events
// ============================================================================

/// What happened, as recorded in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum EventAction {
    /// The lock was set up and its owner key installed.
    Setup,
    /// The lock was unlocked.
    Unlock {
        /// How the unlock was requested.
        action: UnlockAction,
    },
    /// A new key was offered.
    CreateNewKey {
        /// Identifier of the offered key.
        new_key: Uuid,
    },
    /// A pending key was redeemed and confirmed.
    ConfirmNewKey {
        /// Identifier of the confirmed key.
        new_key: Uuid,
    },
    /// A key was removed.
    RemoveKey {
        /// Identifier of the removed key.
        removed: Uuid,
        /// Whether the removed key was issued or pending.
        kind: KeyType,
    },
}

/// An immutable entry of the lock's event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockEvent {
    /// Unique identifier of the event.
    pub id: Uuid,
    /// When the event occurred.
    pub date: DateTime<Utc>,
    /// Identifier of the key that performed the action.
    pub key: Uuid,
    /// What happened.
    pub action: EventAction,
}

impl LockEvent {
    /// Records an action performed by `key`, stamped now.
    pub fn new(key: Uuid, action: EventAction) -> Self {
        Self {
            id: Uuid::new_v4(),
            date: Utc::now(),
            key,
            action,
        }
    }
}

/// Pagination window for reading back the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventsFilter {
    /// Number of events to skip from the start of the log.
    pub offset: u32,
    /// Maximum number of events to return; `None` reads to the end.
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Request to read back the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEventsRequest {
    /// Identifier of the acting key.
    pub key: Uuid,
    /// Proof of possession of the acting key's secret.
    pub authentication: Authentication,
    /// Pagination window.
    pub filter: EventsFilter,
}

impl ListEventsRequest {
    /// Builds an event-log request proving possession of `secret`.
    pub fn new(key: Uuid, secret: &KeyData, filter: EventsFilter) -> Self {
        Self {
            key,
            authentication: Authentication::new(secret),
            filter,
        }
    }
}

/// One item of a streamed event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventNotification {
    /// The logged event.
    pub event: LockEvent,
    /// Set on the final item of the transfer.
    pub is_last: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{Permission, Schedule};

    #[test]
    fn test_lock_information_roundtrip() {
        let info = LockInformation {
            id: Uuid::new_v4(),
            status: LockStatus::Setup,
        };
        let bytes = to_bytes(&info).unwrap();
        let restored: LockInformation = from_bytes(&bytes).unwrap();
        assert_eq!(info, restored);
    }

    #[test]
    fn test_setup_request_roundtrip() {
        let request = SetupRequest::new();
        let bytes = to_bytes(&request).unwrap();
        let restored: SetupRequest = from_bytes(&bytes).unwrap();
        assert_eq!(request, restored);
        assert_eq!(request.id, restored.id);
        assert_eq!(request.secret, restored.secret);
    }

    #[test]
    fn test_unlock_request_authenticates() {
        let secret = KeyData::new();
        let key = Uuid::new_v4();
        let request = UnlockRequest::new(key, &secret);

        let bytes = to_bytes(&request).unwrap();
        let restored: UnlockRequest = from_bytes(&bytes).unwrap();

        assert_eq!(request, restored);
        assert!(restored.authentication.is_authenticated(&secret));
        assert!(!restored.authentication.is_authenticated(&KeyData::new()));
    }

    #[test]
    fn test_create_new_key_request_seal_open() {
        let issuer_secret = KeyData::new();
        let issuer = Uuid::new_v4();
        let payload = NewKeyPayload {
            new_key: NewKey::new(
                "Dog walker",
                Permission::Scheduled(Schedule::default()),
                Utc::now() + chrono::Duration::days(2),
            ),
            secret: KeyData::new(),
        };

        let request = CreateNewKeyRequest::new(issuer, &issuer_secret, &payload).unwrap();
        assert!(request.authentication.is_authenticated(&issuer_secret));

        let opened = request.open(&issuer_secret).unwrap();
        assert_eq!(opened, payload);

        // The payload is unreadable without the issuing key's secret.
        assert!(request.open(&KeyData::new()).is_err());
    }

    #[test]
    fn test_key_entry_id() {
        let key = Key::new("A", crate::keys::Permission::Anytime);
        let new_key = NewKey::new(
            "B",
            crate::keys::Permission::Anytime,
            Utc::now() + chrono::Duration::hours(1),
        );
        assert_eq!(KeyEntry::Key(key.clone()).id(), key.id);
        assert_eq!(KeyEntry::NewKey(new_key.clone()).id(), new_key.id);
    }

    #[test]
    fn test_event_action_roundtrip() {
        let actions = [
            EventAction::Setup,
            EventAction::Unlock {
                action: UnlockAction::Button,
            },
            EventAction::CreateNewKey {
                new_key: Uuid::new_v4(),
            },
            EventAction::ConfirmNewKey {
                new_key: Uuid::new_v4(),
            },
            EventAction::RemoveKey {
                removed: Uuid::new_v4(),
                kind: KeyType::NewKey,
            },
        ];
        for action in actions {
            let event = LockEvent::new(Uuid::new_v4(), action);
            let bytes = to_bytes(&event).unwrap();
            let restored: LockEvent = from_bytes(&bytes).unwrap();
            assert_eq!(event, restored);
        }
    }

    #[test]
    fn test_events_filter_defaults() {
        let filter = EventsFilter::default();
        assert_eq!(filter.offset, 0);
        assert_eq!(filter.limit, None);
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let result: Result<LockEvent> = from_bytes(&[0xC1, 0xC1, 0xC1]);
        assert!(result.is_err());
    }
}
