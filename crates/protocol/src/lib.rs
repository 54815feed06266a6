//! # Shackle Protocol Library
//!
//! This crate provides protocol definitions and cryptographic primitives
//! for the Shackle smart-lock system.
//!
//! ## Overview
//!
//! The protocol crate is the foundation of Shackle's access-control
//! layer, providing:
//!
//! - **Credentials**: keys, pending keys, permission tiers, schedules
//! - **Crypto Envelope**: ChaCha20-Poly1305 sealing under a shared secret
//! - **Challenge-Response**: HMAC proof of possession of a secret
//! - **Framing**: chunked transfers sized to the transport's unit limit
//! - **Pairing**: initial setup and invitation redemption flows
//! - **Event Streaming**: sealed, is-last-terminated notification lists
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Characteristic Records           │  MessagePack-encoded
//! ├─────────────────────────────────────────┤
//! │          Sealed Envelope                │  ChaCha20-Poly1305
//! ├─────────────────────────────────────────┤
//! │         Chunked Framing                 │  Length-prefixed
//! ├─────────────────────────────────────────┤
//! │    Transport (BLE characteristics)      │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust
//! use protocol::{encode_setup_request, KeyData, SetupRequest, SetupSession};
//! use protocol::framing::DEFAULT_MAX_UNIT_SIZE;
//!
//! // The lock's factory secret, shared out of band.
//! let factory_secret = KeyData::new();
//!
//! // The initiating device chooses the owner credential.
//! let request = SetupRequest::new();
//! let chunks =
//!     encode_setup_request(&request, &factory_secret, DEFAULT_MAX_UNIT_SIZE).unwrap();
//!
//! // The lock reassembles and opens the transfer.
//! let mut session = SetupSession::new(factory_secret);
//! let mut received = None;
//! for chunk in &chunks {
//!     received = session.push_chunk(chunk.as_bytes()).unwrap();
//! }
//! assert_eq!(received, Some(request));
//! ```
//!
//! ## Modules
//!
//! - [`keys`]: credentials, permissions, and schedules
//! - [`crypto`]: shared secrets and the sealed envelope
//! - [`auth`]: challenge-response proofs
//! - [`framing`]: chunked transfer framing
//! - [`messages`]: characteristic record definitions
//! - [`invitation`]: out-of-band invitation documents
//! - [`pairing`]: setup and redemption flows
//! - [`events`]: sealed notification streaming
//! - [`error`]: error types

pub mod auth;
pub mod crypto;
pub mod error;
pub mod events;
pub mod framing;
pub mod invitation;
pub mod keys;
pub mod messages;
pub mod pairing;

pub use auth::{AuthNonce, Authentication, MAC_SIZE, NONCE_SIZE};
pub use crypto::{InitializationVector, KeyData, SealedPayload, IV_SIZE, KEY_SIZE, TAG_SIZE};
pub use error::{ProtocolError, Result};
pub use events::{
    key_notifications, notifications, StreamItem, StreamReader, StreamWriter,
};
pub use framing::{split, Assembler, Chunk, CHUNK_HEADER_SIZE, DEFAULT_MAX_UNIT_SIZE};
pub use invitation::NewKeyInvitation;
pub use keys::{Key, KeyType, NewKey, Permission, Schedule, TimeInterval, Weekdays};
pub use messages::{
    ConfirmNewKeyRequest, ConfirmNewKeyResponse, CreateNewKeyRequest, EventAction,
    EventNotification, EventsFilter, KeyEntry, KeyListNotification, ListEventsRequest,
    ListKeysRequest, LockEvent, LockInformation, LockStatus, NewKeyPayload, RemoveKeyRequest,
    SetupRequest, UnlockAction, UnlockRequest,
};
pub use pairing::{
    encode_setup_request, redeem, ProvisioningState, RedemptionOutcome, RedemptionSession,
    RedemptionState, SetupSession,
};
