//! Decoder for the kernel's binary notification record stream
//!
//! A read from an inotify descriptor returns zero or more back-to-back
//! records, each laid out as `struct inotify_event`:
//!
//! ```text
//! +--------+--------+--------+--------+----------------------+
//! | wd i32 | mask   | cookie | len    | name[len] (NUL-padded)|
//! +--------+--------+--------+--------+----------------------+
//!  <----------- HEADER_SIZE ---------->
//! ```
//!
//! All header fields use native byte order. `len` already includes the
//! terminating NUL and any alignment padding, so a record always occupies
//! exactly `HEADER_SIZE + len` bytes.

use crate::event::{Event, WatchDescriptor};
use crate::mask::EventMask;
use thiserror::Error;
use tracing::trace;

/// Size of the fixed record header in bytes
pub const HEADER_SIZE: usize = 16;

/// Byte stream could not be split into whole records
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed event stream at byte {offset} of {available}: {reason}")]
pub struct MalformedStream {
    /// Offset of the record that failed to frame
    pub offset: usize,
    /// Total bytes handed to the decoder
    pub available: usize,
    pub reason: MalformedReason,
}

/// Why framing failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MalformedReason {
    #[error("{remaining} trailing bytes cannot hold a record header")]
    TruncatedHeader { remaining: usize },

    #[error("record needs {needed} bytes but only {remaining} remain")]
    TruncatedRecord { needed: usize, remaining: usize },

    #[error("decoder consumed {consumed} bytes")]
    ConsumedMismatch { consumed: usize },
}

/// Result of decoding one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    /// Events in record order
    pub events: Vec<Event>,
    /// Bytes consumed; always the full buffer length
    pub consumed: usize,
}

/// Decode a buffer holding only whole records
pub fn decode(buf: &[u8]) -> Result<Decoded, MalformedStream> {
    let mut records = records(buf);
    let events = records.by_ref().collect::<Result<Vec<_>, _>>()?;

    let consumed = records.consumed();
    if consumed != buf.len() {
        return Err(MalformedStream {
            offset: consumed,
            available: buf.len(),
            reason: MalformedReason::ConsumedMismatch { consumed },
        });
    }

    trace!(bytes = consumed, events = events.len(), "decoded batch");
    Ok(Decoded { events, consumed })
}

/// Iterate the records of a buffer lazily
pub fn records(buf: &[u8]) -> Records<'_> {
    Records { buf, offset: 0 }
}

/// Iterator over the records of one batch
///
/// Yields an error once and then stops if the buffer ends mid-record.
#[derive(Debug, Clone)]
pub struct Records<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Records<'a> {
    /// Bytes framed so far
    pub fn consumed(&self) -> usize {
        self.offset
    }

    fn fail(&mut self, reason: MalformedReason) -> MalformedStream {
        let err = MalformedStream {
            offset: self.offset,
            available: self.buf.len(),
            reason,
        };
        // Fuse: nothing after a framing error can be trusted
        self.buf = &[];
        self.offset = 0;
        err
    }
}

impl<'a> Iterator for Records<'a> {
    type Item = Result<Event, MalformedStream>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.offset..];
        if rest.is_empty() {
            return None;
        }
        if rest.len() < HEADER_SIZE {
            let reason = MalformedReason::TruncatedHeader { remaining: rest.len() };
            return Some(Err(self.fail(reason)));
        }

        let wd = i32::from_ne_bytes(field(rest, 0));
        let mask = u32::from_ne_bytes(field(rest, 4));
        let cookie = u32::from_ne_bytes(field(rest, 8));
        let len = u32::from_ne_bytes(field(rest, 12)) as usize;

        // A length past the address space can never fit either
        let record_size = HEADER_SIZE.checked_add(len).unwrap_or(usize::MAX);
        if rest.len() < record_size {
            let reason = MalformedReason::TruncatedRecord {
                needed: record_size,
                remaining: rest.len(),
            };
            return Some(Err(self.fail(reason)));
        }

        let name = decode_name(&rest[HEADER_SIZE..record_size], wd);
        self.offset += record_size;

        Some(Ok(Event::new(
            WatchDescriptor::from_raw(wd),
            EventMask::from_bits_retain(mask),
            cookie,
            name,
        )))
    }
}

fn field(record: &[u8], at: usize) -> [u8; 4] {
    [record[at], record[at + 1], record[at + 2], record[at + 3]]
}

/// Name payload up to its first NUL
///
/// Invalid UTF-8 degrades to a nameless event rather than failing the batch.
fn decode_name(region: &[u8], wd: i32) -> Option<String> {
    let end = region.iter().position(|&b| b == 0).unwrap_or(region.len());
    let raw = &region[..end];
    if raw.is_empty() {
        return None;
    }

    match std::str::from_utf8(raw) {
        Ok(name) => Some(name.to_owned()),
        Err(e) => {
            trace!(wd, error = %e, "name is not valid UTF-8, emitting nameless event");
            None
        }
    }
}
