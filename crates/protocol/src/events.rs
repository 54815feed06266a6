//! Streamed delivery of the event log and the credential list.
//!
//! A list of records is delivered over a one-way notification channel
//! as a sequence of items, every item but the last carrying
//! `is_last = false`. Each item is serialized, sealed under the
//! reader's secret, and framed as its own chunked transfer; the reader
//! reassembles and opens items independently and stops at the terminal
//! marker.
//!
//! An empty list produces zero items and no terminal marker. Readers
//! must treat the end of the notification subscription as completion in
//! that case; there is no in-band signal for it.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::crypto::{KeyData, SealedPayload};
use crate::error::{ProtocolError, Result};
use crate::framing::{split, Assembler, Chunk};
use crate::messages::{
    self, EventNotification, KeyEntry, KeyListNotification, LockEvent,
};

/// An item of a streamed list, carrying its own terminal marker.
pub trait StreamItem: Serialize + DeserializeOwned {
    /// Returns true on the final item of a transfer.
    fn is_last(&self) -> bool;
}

impl StreamItem for EventNotification {
    fn is_last(&self) -> bool {
        self.is_last
    }
}

impl StreamItem for KeyListNotification {
    fn is_last(&self) -> bool {
        self.is_last
    }
}

/// Marks up an event list for streaming.
///
/// Every item but the last carries `is_last = false`; an empty list
/// yields no items at all.
pub fn notifications(events: &[LockEvent]) -> Vec<EventNotification> {
    let last = events.len().saturating_sub(1);
    events
        .iter()
        .enumerate()
        .map(|(index, event)| EventNotification {
            event: event.clone(),
            is_last: index == last,
        })
        .collect()
}

/// Marks up a credential list for streaming.
pub fn key_notifications(entries: &[KeyEntry]) -> Vec<KeyListNotification> {
    let last = entries.len().saturating_sub(1);
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| KeyListNotification {
            entry: entry.clone(),
            is_last: index == last,
        })
        .collect()
}

/// Seals and frames stream items for notification delivery.
pub struct StreamWriter {
    secret: KeyData,
    max_unit_size: usize,
}

impl StreamWriter {
    /// Creates a writer sealing under `secret` for the given unit size.
    pub fn new(secret: KeyData, max_unit_size: usize) -> Self {
        Self {
            secret,
            max_unit_size,
        }
    }

    /// Encodes one item as its own chunked transfer.
    pub fn encode_item<T: StreamItem>(&self, item: &T) -> Result<Vec<Chunk>> {
        let plaintext = messages::to_bytes(item)?;
        let sealed = SealedPayload::seal(&plaintext, &self.secret)?;
        split(&sealed.to_bytes()?, self.max_unit_size)
    }

    /// Encodes a sequence of items, one transfer per item.
    pub fn encode<T: StreamItem>(&self, items: &[T]) -> Result<Vec<Vec<Chunk>>> {
        items.iter().map(|item| self.encode_item(item)).collect()
    }
}

/// Reassembles, opens, and decodes a stream of items.
///
/// Each completed transfer yields one item; the reader refuses further
/// input after the terminal marker. Reader state is scoped to one
/// subscription and must be discarded on disconnect.
pub struct StreamReader<T: StreamItem> {
    secret: KeyData,
    assembler: Assembler,
    finished: bool,
    _marker: PhantomData<T>,
}

impl<T: StreamItem> StreamReader<T> {
    /// Creates a reader opening items with `secret`.
    pub fn new(secret: KeyData) -> Self {
        Self {
            secret,
            assembler: Assembler::new(),
            finished: false,
            _marker: PhantomData,
        }
    }

    /// Feeds the next notification chunk.
    ///
    /// Returns an item whenever a transfer completes. After the item
    /// carrying the terminal marker, any further chunk is an error.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Option<T>> {
        if self.finished {
            return Err(ProtocolError::Framing(
                "notification received after the final stream item".to_string(),
            ));
        }

        let buffer = match self.assembler.push(chunk)? {
            Some(buffer) => buffer,
            None => return Ok(None),
        };
        self.assembler = Assembler::new();

        let sealed = SealedPayload::from_bytes(&buffer)?;
        let plaintext = sealed.open(&self.secret)?;
        let item: T = messages::from_bytes(&plaintext)?;

        if item.is_last() {
            self.finished = true;
        }
        Ok(Some(item))
    }

    /// Returns true once the terminal item has been received.
    pub fn is_complete(&self) -> bool {
        self.finished
    }
}
