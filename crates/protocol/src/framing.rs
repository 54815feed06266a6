//! Chunked framing for transports with small fixed transfer units.
//!
//! # Transfer Format
//!
//! A logical payload of arbitrary size is carried as an ordered sequence
//! of chunks, each no larger than the transport's maximum unit size:
//!
//! - first chunk: 4 bytes total payload length (big-endian), then payload
//! - subsequent chunks: payload bytes only
//!
//! A transfer is complete when the accumulated payload length equals the
//! declared total. The codec neither reorders nor deduplicates; the
//! transport must deliver chunks in order within one logical transfer.

use crate::error::{ProtocolError, Result};

/// Size of the total-length header carried by the first chunk.
pub const CHUNK_HEADER_SIZE: usize = 4;

/// Smallest usable maximum unit size: the header plus one payload byte.
pub const CHUNK_MIN_SIZE: usize = CHUNK_HEADER_SIZE + 1;

/// Default maximum unit size, matching the smallest BLE ATT payload.
pub const DEFAULT_MAX_UNIT_SIZE: usize = 20;

/// Maximum total payload length a transfer may declare (512 KB).
pub const MAX_TRANSFER_SIZE: usize = 512 * 1024;

/// One transport-sized slice of a logical payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    bytes: Vec<u8>,
}

impl Chunk {
    /// Wraps raw bytes received from the transport.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Returns the wire bytes of this chunk.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Consumes the chunk, returning its wire bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Returns the wire length of this chunk.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns true if the chunk carries no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Splits a payload into ordered chunks for the given maximum unit size.
///
/// The first chunk carries the 4-byte total-length header; every chunk
/// carries as much payload as fits under `max_unit_size`. A zero-length
/// payload yields exactly one chunk containing only the header.
pub fn split(payload: &[u8], max_unit_size: usize) -> Result<Vec<Chunk>> {
    if max_unit_size < CHUNK_MIN_SIZE {
        return Err(ProtocolError::Framing(format!(
            "maximum unit size {} is below the minimum of {}",
            max_unit_size, CHUNK_MIN_SIZE
        )));
    }
    if payload.len() > MAX_TRANSFER_SIZE {
        return Err(ProtocolError::Framing(format!(
            "payload of {} bytes exceeds the transfer limit of {} bytes",
            payload.len(),
            MAX_TRANSFER_SIZE
        )));
    }

    let total = payload.len() as u32;
    let mut chunks = Vec::new();

    let first_capacity = max_unit_size - CHUNK_HEADER_SIZE;
    let first_len = payload.len().min(first_capacity);
    let mut first = Vec::with_capacity(CHUNK_HEADER_SIZE + first_len);
    first.extend_from_slice(&total.to_be_bytes());
    first.extend_from_slice(&payload[..first_len]);
    chunks.push(Chunk::from_bytes(first));

    let mut offset = first_len;
    while offset < payload.len() {
        let end = (offset + max_unit_size).min(payload.len());
        chunks.push(Chunk::from_bytes(payload[offset..end].to_vec()));
        offset = end;
    }

    Ok(chunks)
}

/// Reassembly state for a single pending transfer.
///
/// An assembler must not be reused across transfers or connections:
/// discard it on disconnect, abort, or deadline and start fresh.
#[derive(Debug, Default)]
pub struct Assembler {
    /// Declared total payload length, known after the first chunk.
    total: Option<usize>,
    /// Payload accumulated so far, in arrival order.
    buffer: Vec<u8>,
    /// Set once the transfer has completed.
    finished: bool,
}

impl Assembler {
    /// Creates an empty assembler for one transfer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the next chunk, returning the full payload upon completion.
    ///
    /// Returns `Ok(None)` while the transfer is still partial. Malformed
    /// input (an undersized first chunk, a declared total above the
    /// transfer limit, accumulation past the declared total, or a push
    /// after completion) fails with a framing error.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Err(ProtocolError::Framing(
                "chunk received after transfer completed".to_string(),
            ));
        }

        let total = match self.total {
            Some(total) => {
                self.buffer.extend_from_slice(chunk);
                total
            }
            None => {
                if chunk.len() < CHUNK_HEADER_SIZE {
                    return Err(ProtocolError::Framing(format!(
                        "first chunk of {} bytes is shorter than the {}-byte header",
                        chunk.len(),
                        CHUNK_HEADER_SIZE
                    )));
                }
                let header: [u8; CHUNK_HEADER_SIZE] =
                    chunk[..CHUNK_HEADER_SIZE].try_into().unwrap();
                let total = u32::from_be_bytes(header) as usize;
                if total > MAX_TRANSFER_SIZE {
                    return Err(ProtocolError::Framing(format!(
                        "declared total of {} bytes exceeds the transfer limit of {} bytes",
                        total, MAX_TRANSFER_SIZE
                    )));
                }
                self.total = Some(total);
                self.buffer.reserve(total);
                self.buffer.extend_from_slice(&chunk[CHUNK_HEADER_SIZE..]);
                total
            }
        };

        if self.buffer.len() > total {
            return Err(ProtocolError::Framing(format!(
                "accumulated {} bytes exceeds the declared total of {}",
                self.buffer.len(),
                total
            )));
        }

        if self.buffer.len() == total {
            self.finished = true;
            return Ok(Some(std::mem::take(&mut self.buffer)));
        }

        Ok(None)
    }

    /// Returns the declared total, if the first chunk has arrived.
    pub fn total(&self) -> Option<usize> {
        self.total
    }

    /// Returns the number of payload bytes accumulated so far.
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true once the transfer has completed.
    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
