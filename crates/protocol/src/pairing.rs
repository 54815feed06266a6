//! Pairing flows: initial lock setup and new-key redemption.
//!
//! Both flows compose the envelope and framing layers. Setup installs
//! the owner credential under the lock's factory secret; redemption
//! turns an out-of-band invitation into a confirmed credential with a
//! freshly issued secret. Each side of a flow is a small state machine,
//! one per role.
//!
//! ```text
//! Setup (lock):        Unconfigured -> SetupInProgress -> Paired
//! Redemption (device): Invited -> ConfirmationSent -> Confirmed
//!                                                  \-> Rejected
//!                                                  \-> Expired
//! ```

use chrono::{DateTime, Utc};

use crate::auth::Authentication;
use crate::crypto::{KeyData, SealedPayload};
use crate::error::{ProtocolError, Result};
use crate::framing::{split, Assembler, Chunk};
use crate::invitation::NewKeyInvitation;
use crate::keys::{Key, NewKey};
use crate::messages::{self, ConfirmNewKeyRequest, ConfirmNewKeyResponse, SetupRequest};

/// Provisioning state of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    /// Factory state; no owner credential installed.
    Unconfigured,
    /// A setup transfer is being received.
    SetupInProgress,
    /// An owner credential is installed.
    Paired,
}

/// Seals and frames a setup request for transmission to the lock.
///
/// The request is sealed under the lock's factory secret, obtained out
/// of band (printed on the device or scanned from its label).
pub fn encode_setup_request(
    request: &SetupRequest,
    factory_secret: &KeyData,
    max_unit_size: usize,
) -> Result<Vec<Chunk>> {
    let plaintext = messages::to_bytes(request)?;
    let sealed = SealedPayload::seal(&plaintext, factory_secret)?;
    split(&sealed.to_bytes()?, max_unit_size)
}

/// Lock-side setup flow.
///
/// Receives the chunked, sealed setup request. A decryption failure
/// leaves the lock `Unconfigured` with clean reassembly state, ready
/// for another attempt.
#[derive(Debug)]
pub struct SetupSession {
    factory_secret: KeyData,
    assembler: Assembler,
    state: ProvisioningState,
}

impl SetupSession {
    /// Creates a setup session around the lock's factory secret.
    pub fn new(factory_secret: KeyData) -> Self {
        Self {
            factory_secret,
            assembler: Assembler::new(),
            state: ProvisioningState::Unconfigured,
        }
    }

    /// Returns the current provisioning state.
    pub fn state(&self) -> ProvisioningState {
        self.state
    }

    /// Feeds the next chunk of the setup transfer.
    ///
    /// Returns the decoded request once the transfer completes and the
    /// envelope opens, transitioning to `Paired`. Any framing or
    /// decryption failure resets the session to `Unconfigured`.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Option<SetupRequest>> {
        if self.state == ProvisioningState::Paired {
            return Err(ProtocolError::PermissionDenied);
        }
        self.state = ProvisioningState::SetupInProgress;

        let buffer = match self.assembler.push(chunk) {
            Ok(Some(buffer)) => buffer,
            Ok(None) => return Ok(None),
            Err(err) => {
                self.reset();
                return Err(err);
            }
        };

        let request = SealedPayload::from_bytes(&buffer)
            .and_then(|sealed| sealed.open(&self.factory_secret))
            .and_then(|plaintext| messages::from_bytes::<SetupRequest>(&plaintext));

        match request {
            Ok(request) => {
                self.state = ProvisioningState::Paired;
                Ok(Some(request))
            }
            Err(err) => {
                self.reset();
                Err(err)
            }
        }
    }

    fn reset(&mut self) {
        self.assembler = Assembler::new();
        self.state = ProvisioningState::Unconfigured;
    }
}

/// Redemption state, as seen by the invited device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedemptionState {
    /// Holding an invitation; no request sent yet.
    Invited,
    /// Redemption request sent; awaiting the sealed response.
    ConfirmationSent,
    /// The issued credential has been received.
    Confirmed,
    /// The lock rejected the proof, or the response did not open.
    Rejected,
    /// The invitation expired before redemption.
    Expired,
}

/// Device-side redemption flow over an invitation.
///
/// A failed or aborted attempt is retried with a fresh session built
/// from the same invitation; the lock issues idempotently until the
/// invitation expires.
#[derive(Debug)]
pub struct RedemptionSession {
    invitation: NewKeyInvitation,
    assembler: Assembler,
    state: RedemptionState,
}

impl RedemptionSession {
    /// Creates a redemption session from an invitation document.
    pub fn new(invitation: NewKeyInvitation) -> Self {
        Self {
            invitation,
            assembler: Assembler::new(),
            state: RedemptionState::Invited,
        }
    }

    /// Returns the current redemption state.
    pub fn state(&self) -> RedemptionState {
        self.state
    }

    /// Returns the invitation this session redeems.
    pub fn invitation(&self) -> &NewKeyInvitation {
        &self.invitation
    }

    /// Builds the redemption request, proving possession of the
    /// invitation secret.
    pub fn request(&mut self) -> Result<ConfirmNewKeyRequest> {
        self.request_at(Utc::now())
    }

    /// Builds the redemption request at an explicit instant.
    pub fn request_at(&mut self, now: DateTime<Utc>) -> Result<ConfirmNewKeyRequest> {
        match self.state {
            RedemptionState::Invited => {}
            _ => {
                return Err(ProtocolError::Validation(
                    "redemption request already sent".to_string(),
                ))
            }
        }
        if self.invitation.key.is_expired(now) {
            self.state = RedemptionState::Expired;
            return Err(ProtocolError::InvitationExpired);
        }

        let request = ConfirmNewKeyRequest {
            key: self.invitation.key.id,
            authentication: Authentication::at(&self.invitation.secret, now),
        };
        self.state = RedemptionState::ConfirmationSent;
        Ok(request)
    }

    /// Feeds the next chunk of the sealed redemption response.
    ///
    /// Returns the confirmed credential and its freshly issued secret
    /// once the response opens. The caller must persist both atomically
    /// before treating the redemption as done; on any failure before
    /// that, discard this session and retry from a new one.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Option<(Key, KeyData)>> {
        if self.state != RedemptionState::ConfirmationSent {
            return Err(ProtocolError::Validation(
                "no redemption response expected in this state".to_string(),
            ));
        }

        let buffer = match self.assembler.push(chunk) {
            Ok(Some(buffer)) => buffer,
            Ok(None) => return Ok(None),
            Err(err) => {
                self.state = RedemptionState::Rejected;
                return Err(err);
            }
        };

        let response = SealedPayload::from_bytes(&buffer)
            .and_then(|sealed| sealed.open(&self.invitation.secret))
            .and_then(|plaintext| messages::from_bytes::<ConfirmNewKeyResponse>(&plaintext));

        match response {
            Ok(response) => {
                self.state = RedemptionState::Confirmed;
                let key = self.invitation.key.clone().confirm();
                Ok(Some((key, response.secret)))
            }
            Err(err) => {
                self.state = RedemptionState::Rejected;
                Err(err)
            }
        }
    }
}

/// Lock-side verdict on a redemption attempt.
#[derive(Debug)]
pub enum RedemptionOutcome {
    /// The invitation expired; checked before proof validity.
    Expired,
    /// The proof did not verify against the invitation secret.
    Rejected,
    /// A fresh secret was issued for the confirmed credential.
    Issued {
        /// The confirmed credential.
        key: Key,
        /// The freshly issued ongoing secret.
        secret: KeyData,
        /// The sealed response to return to the redeemer.
        response: Vec<Chunk>,
    },
}

/// Evaluates one redemption attempt on the lock.
///
/// Expiry is checked first: an expired invitation yields `Expired` even
/// when the presented proof is valid. On success a fresh secret is
/// generated, never the invitation secret itself, and sealed back to
/// the redeemer under the invitation secret. Calling again for the same
/// pending key issues another fresh secret; attempts stay idempotent
/// until the invitation expires or the credential is confirmed.
pub fn redeem(
    pending: &NewKey,
    invitation_secret: &KeyData,
    request: &ConfirmNewKeyRequest,
    now: DateTime<Utc>,
    max_unit_size: usize,
) -> Result<RedemptionOutcome> {
    if pending.is_expired(now) {
        return Ok(RedemptionOutcome::Expired);
    }
    if request.key != pending.id || !request.authentication.is_authenticated(invitation_secret) {
        return Ok(RedemptionOutcome::Rejected);
    }

    let secret = KeyData::new();
    let response = ConfirmNewKeyResponse {
        secret: secret.clone(),
    };
    let sealed = SealedPayload::seal(&messages::to_bytes(&response)?, invitation_secret)?;
    let chunks = split(&sealed.to_bytes()?, max_unit_size)?;

    Ok(RedemptionOutcome::Issued {
        key: pending.clone().confirm(),
        secret,
        response: chunks,
    })
}
