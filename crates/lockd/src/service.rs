//! Lock-side orchestration of the access-control protocol.
//!
//! `LockService` binds protocol flows to the stores and the hardware:
//! it receives setup transfers, verifies unlock proofs against issued
//! keys and their schedules, offers and redeems new keys, and streams
//! the credential list and event log back to authorized readers.
//!
//! Every handler is one synchronous request/response exchange; no two
//! operations are in flight concurrently on one connection.

use std::sync::mpsc::Receiver;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Utc};
use protocol::pairing::{self, RedemptionOutcome, SetupSession};
use protocol::{
    key_notifications, notifications, Chunk, ConfirmNewKeyRequest, CreateNewKeyRequest,
    EventAction, Key, KeyData, ListEventsRequest, ListKeysRequest, LockEvent, LockInformation,
    LockStatus, NewKey, ProtocolError, RemoveKeyRequest, StreamWriter, UnlockAction,
    UnlockRequest,
};
use thiserror::Error;
use uuid::Uuid;

use crate::hardware::{ButtonPress, HardwareError, LockActuator, RelayState};
use crate::store::{EventStore, KeyStore};

/// Failures surfaced by the lock service.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A protocol-level failure: authentication, decryption, framing,
    /// expiry, or permission.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The actuator could not be driven.
    #[error(transparent)]
    Hardware(#[from] HardwareError),

    /// A store could not be read or written.
    #[error("storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// The lock-side service: protocol flows bound to stores and hardware.
pub struct LockService {
    id: Uuid,
    setup: SetupSession,
    keys: KeyStore,
    events: EventStore,
    actuator: Box<dyn LockActuator>,
    unlock_pulse: Duration,
}

impl LockService {
    /// Assembles the service from its parts.
    pub fn new(
        id: Uuid,
        factory_secret: KeyData,
        keys: KeyStore,
        events: EventStore,
        actuator: Box<dyn LockActuator>,
        unlock_pulse: Duration,
    ) -> Self {
        Self {
            id,
            setup: SetupSession::new(factory_secret),
            keys,
            events,
            actuator,
            unlock_pulse,
        }
    }

    /// Returns the lock's identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the publicly readable lock information record.
    pub fn information(&self) -> LockInformation {
        LockInformation {
            id: self.id,
            status: if self.keys.is_paired() {
                LockStatus::Unlock
            } else {
                LockStatus::Setup
            },
        }
    }

    /// Registers a listener for physical button presses.
    pub fn subscribe_button(&mut self) -> Receiver<ButtonPress> {
        self.actuator.subscribe()
    }

    /// Returns the credential store.
    pub fn keys(&self) -> &KeyStore {
        &self.keys
    }

    /// Returns the event log.
    pub fn events(&self) -> &EventStore {
        &self.events
    }

    /// Feeds one chunk of a setup transfer.
    ///
    /// Once the transfer completes and the envelope opens under the
    /// factory secret, the owner key is installed and returned. A lock
    /// that is already paired refuses further setup.
    pub fn handle_setup_chunk(&mut self, chunk: &[u8]) -> Result<Option<Key>> {
        if self.keys.is_paired() {
            return Err(ProtocolError::PermissionDenied.into());
        }

        let request = match self.setup.push_chunk(chunk)? {
            Some(request) => request,
            None => return Ok(None),
        };

        let owner = Key {
            id: request.id,
            name: "Owner".to_string(),
            created: Utc::now(),
            permission: protocol::Permission::Owner,
        };
        self.keys.install_owner(owner.clone(), request.secret)?;
        self.keys.save()?;
        self.log_event(LockEvent::new(owner.id, EventAction::Setup))?;

        tracing::info!("Lock paired; owner key {}", owner.id);
        Ok(Some(owner))
    }

    /// Verifies an unlock request and pulses the relay.
    pub fn handle_unlock(&mut self, request: &UnlockRequest) -> Result<()> {
        self.handle_unlock_at(request, Utc::now())
    }

    /// Verifies an unlock request at an explicit instant.
    ///
    /// The proof is checked first, then the key's schedule; only then
    /// is the relay engaged and the event logged.
    pub fn handle_unlock_at(&mut self, request: &UnlockRequest, now: DateTime<Utc>) -> Result<()> {
        let key = self.keys.authenticate(request.key, &request.authentication)?;
        self.keys.save()?;

        if !key.permission.is_allowed(now) {
            tracing::warn!("Key {} denied by schedule", key.id);
            return Err(ProtocolError::PermissionDenied.into());
        }

        self.engage_lock()?;
        self.log_event(LockEvent::new(
            key.id,
            EventAction::Unlock {
                action: request.action,
            },
        ))?;
        tracing::info!("Unlocked by key {} ({:?})", key.id, request.action);
        Ok(())
    }

    /// Accepts a new-key offer from an owner or admin.
    pub fn handle_create_key(&mut self, request: &CreateNewKeyRequest) -> Result<NewKey> {
        self.handle_create_key_at(request, Utc::now())
    }

    /// Accepts a new-key offer at an explicit instant.
    pub fn handle_create_key_at(
        &mut self,
        request: &CreateNewKeyRequest,
        now: DateTime<Utc>,
    ) -> Result<NewKey> {
        let issuer = self.keys.authenticate(request.key, &request.authentication)?;
        if !issuer.permission.can_administrate() || !issuer.permission.is_allowed(now) {
            return Err(ProtocolError::PermissionDenied.into());
        }

        let issuer_secret = self
            .keys
            .secret(issuer.id)
            .ok_or(ProtocolError::InvalidAuthentication)?;
        let payload = request.open(&issuer_secret)?;

        self.keys
            .insert_pending(payload.new_key.clone(), payload.secret)?;
        self.keys.save()?;
        self.log_event(LockEvent::new(
            issuer.id,
            EventAction::CreateNewKey {
                new_key: payload.new_key.id,
            },
        ))?;
        Ok(payload.new_key)
    }

    /// Evaluates one redemption attempt.
    ///
    /// Returns the sealed response chunks carrying the freshly issued
    /// secret. Expiry beats proof validity; attempts stay idempotent
    /// until the invitation expires or the issued key is first used.
    pub fn handle_confirm_key(
        &mut self,
        request: &ConfirmNewKeyRequest,
        max_unit_size: usize,
    ) -> Result<Vec<Chunk>> {
        self.handle_confirm_key_at(request, Utc::now(), max_unit_size)
    }

    /// Evaluates one redemption attempt at an explicit instant.
    pub fn handle_confirm_key_at(
        &mut self,
        request: &ConfirmNewKeyRequest,
        now: DateTime<Utc>,
        max_unit_size: usize,
    ) -> Result<Vec<Chunk>> {
        let (pending, invitation_secret) = self
            .keys
            .pending(request.key)
            .ok_or(ProtocolError::InvalidAuthentication)?;

        match pairing::redeem(&pending, &invitation_secret, request, now, max_unit_size)? {
            RedemptionOutcome::Expired => {
                self.keys.purge_expired(now)?;
                self.keys.save()?;
                tracing::info!("Redemption of {} refused: invitation expired", request.key);
                Err(ProtocolError::InvitationExpired.into())
            }
            RedemptionOutcome::Rejected => {
                tracing::warn!("Redemption of {} refused: invalid proof", request.key);
                Err(ProtocolError::InvalidAuthentication.into())
            }
            RedemptionOutcome::Issued {
                key,
                secret,
                response,
            } => {
                self.keys.install_issued(key.clone(), secret)?;
                self.keys.save()?;
                self.log_event(LockEvent::new(
                    key.id,
                    EventAction::ConfirmNewKey { new_key: key.id },
                ))?;
                tracing::info!("Issued secret for key {} ({})", key.id, key.name);
                Ok(response)
            }
        }
    }

    /// Removes an issued or pending key on behalf of an owner or admin.
    pub fn handle_remove_key(&mut self, request: &RemoveKeyRequest) -> Result<()> {
        self.handle_remove_key_at(request, Utc::now())
    }

    /// Removes a key at an explicit instant.
    pub fn handle_remove_key_at(
        &mut self,
        request: &RemoveKeyRequest,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let actor = self.keys.authenticate(request.key, &request.authentication)?;
        if !actor.permission.can_administrate() || !actor.permission.is_allowed(now) {
            return Err(ProtocolError::PermissionDenied.into());
        }

        if !self.keys.remove(request.remove, request.kind)? {
            return Err(ProtocolError::Validation(format!(
                "no such key: {}",
                request.remove
            ))
            .into());
        }
        self.keys.save()?;
        self.log_event(LockEvent::new(
            actor.id,
            EventAction::RemoveKey {
                removed: request.remove,
                kind: request.kind,
            },
        ))?;
        Ok(())
    }

    /// Streams the credential list back to an owner or admin.
    ///
    /// Returns one chunked transfer per list item, sealed under the
    /// requesting key's secret.
    pub fn handle_list_keys(
        &mut self,
        request: &ListKeysRequest,
        max_unit_size: usize,
    ) -> Result<Vec<Vec<Chunk>>> {
        let actor = self.keys.authenticate(request.key, &request.authentication)?;
        if !actor.permission.can_administrate() {
            return Err(ProtocolError::PermissionDenied.into());
        }
        let secret = self
            .keys
            .secret(actor.id)
            .ok_or(ProtocolError::InvalidAuthentication)?;
        self.keys.save()?;

        let items = key_notifications(&self.keys.entries());
        let writer = StreamWriter::new(secret, max_unit_size);
        Ok(writer.encode(&items)?)
    }

    /// Streams the event log back to a reader.
    ///
    /// Owners and admins see the whole log; other keys see only their
    /// own events. Returns one chunked transfer per event, sealed under
    /// the requesting key's secret. An empty window produces zero
    /// transfers and no terminal marker.
    pub fn handle_list_events(
        &mut self,
        request: &ListEventsRequest,
        max_unit_size: usize,
    ) -> Result<Vec<Vec<Chunk>>> {
        let actor = self.keys.authenticate(request.key, &request.authentication)?;
        let secret = self
            .keys
            .secret(actor.id)
            .ok_or(ProtocolError::InvalidAuthentication)?;
        self.keys.save()?;

        let mut visible = self.events.all();
        if !actor.permission.can_administrate() {
            visible.retain(|event| event.key == actor.id);
        }

        let offset = request.filter.offset as usize;
        let mut window: Vec<LockEvent> = visible.into_iter().skip(offset).collect();
        if let Some(limit) = request.filter.limit {
            window.truncate(limit as usize);
        }

        let items = notifications(&window);
        let writer = StreamWriter::new(secret, max_unit_size);
        Ok(writer.encode(&items)?)
    }

    /// Handles a physical button press: unlocks without a wireless
    /// proof, attributing the event to the owner key.
    ///
    /// Physical presence is the authorization; an unpaired lock ignores
    /// the button.
    pub fn press_button(&mut self) -> Result<()> {
        let owner = match self.keys.owner() {
            Some(owner) => owner,
            None => {
                tracing::debug!("Button press ignored: lock not paired");
                return Ok(());
            }
        };

        self.engage_lock()?;
        self.log_event(LockEvent::new(
            owner.id,
            EventAction::Unlock {
                action: UnlockAction::Button,
            },
        ))?;
        tracing::info!("Unlocked by button press");
        Ok(())
    }

    /// Pulses the relay for the configured duration.
    fn engage_lock(&mut self) -> Result<()> {
        self.actuator.set_relay(RelayState::On)?;
        thread::sleep(self.unlock_pulse);
        self.actuator.set_relay(RelayState::Off)?;
        Ok(())
    }

    fn log_event(&mut self, event: LockEvent) -> Result<()> {
        self.events.append(event)?;
        self.events.save()?;
        Ok(())
    }
}
