//! Decoder for the kernel's `struct input_event`
//!
//! Layout on the wire, in host byte order:
//!
//! ```text
//! | tv_sec (long) | tv_usec (long) | type u16 | code u16 | value i32 |
//! ```
//!
//! `long` is 4 bytes on 32-bit kernels and 8 bytes on 64-bit kernels, so the
//! record width is 16 or 24 bytes. The width must match the kernel that wrote
//! the buffer, otherwise every record after the first is misaligned.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

use super::{AxisId, EV_ABS};

/// Width of the kernel's `long`, which sizes the timestamp fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum WordSize {
    Four,
    Eight,
}

impl WordSize {
    /// Word size of the host this binary was built for
    pub fn native() -> Self {
        if std::mem::size_of::<libc::c_long>() == 8 {
            WordSize::Eight
        } else {
            WordSize::Four
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            WordSize::Four => 4,
            WordSize::Eight => 8,
        }
    }
}

impl TryFrom<u8> for WordSize {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(WordSize::Four),
            8 => Ok(WordSize::Eight),
            other => Err(format!("word size must be 4 or 8, got {}", other)),
        }
    }
}

impl From<WordSize> for u8 {
    fn from(value: WordSize) -> Self {
        value.bytes() as u8
    }
}

impl fmt::Display for WordSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-byte", self.bytes())
    }
}

/// Field layout of one event record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
    pub word_size: WordSize,
}

impl RecordLayout {
    pub fn new(word_size: WordSize) -> Self {
        Self { word_size }
    }

    pub fn native() -> Self {
        Self::new(WordSize::native())
    }

    /// Bytes per record: two words of timestamp, then 2 + 2 + 4
    pub fn record_size(&self) -> usize {
        2 * self.word_size.bytes() + 8
    }

    /// Decode one record from the front of `bytes`.
    ///
    /// Returns `None` if fewer than [`record_size`](Self::record_size) bytes
    /// are available.
    pub fn decode_record(&self, bytes: &[u8]) -> Option<RawEvent> {
        let record = bytes.get(..self.record_size())?;
        let word = self.word_size.bytes();

        let sec = self.read_word(&record[..word]);
        let usec = self.read_word(&record[word..2 * word]);
        let rest = &record[2 * word..];

        Some(RawEvent {
            time: EventTime { sec, usec },
            kind: u16::from_ne_bytes([rest[0], rest[1]]),
            code: u16::from_ne_bytes([rest[2], rest[3]]),
            value: i32::from_ne_bytes([rest[4], rest[5], rest[6], rest[7]]),
        })
    }

    fn read_word(&self, bytes: &[u8]) -> i64 {
        match self.word_size {
            WordSize::Four => i32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as i64,
            WordSize::Eight => i64::from_ne_bytes([
                bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
            ]),
        }
    }

    #[cfg(test)]
    pub(crate) fn encode(&self, event: &RawEvent) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.record_size());
        match self.word_size {
            WordSize::Four => {
                out.extend_from_slice(&(event.time.sec as i32).to_ne_bytes());
                out.extend_from_slice(&(event.time.usec as i32).to_ne_bytes());
            }
            WordSize::Eight => {
                out.extend_from_slice(&event.time.sec.to_ne_bytes());
                out.extend_from_slice(&event.time.usec.to_ne_bytes());
            }
        }
        out.extend_from_slice(&event.kind.to_ne_bytes());
        out.extend_from_slice(&event.code.to_ne_bytes());
        out.extend_from_slice(&event.value.to_ne_bytes());
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EventTime {
    pub sec: i64,
    pub usec: i64,
}

/// One decoded `input_event`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    pub time: EventTime,
    pub kind: u16,
    pub code: u16,
    pub value: i32,
}

impl RawEvent {
    /// The tracked axis and its value, if this is an `EV_ABS` report for one
    pub fn axis_reading(&self) -> Option<(AxisId, i32)> {
        if self.kind != EV_ABS {
            return None;
        }
        AxisId::from_code(self.code).map(|axis| (axis, self.value))
    }
}

/// Streaming decoder that carries partial records across reads
#[derive(Debug)]
pub struct EventDecoder {
    layout: RecordLayout,
    pending: Vec<u8>,
}

impl EventDecoder {
    pub fn new(layout: RecordLayout) -> Self {
        Self {
            layout,
            pending: Vec::with_capacity(layout.record_size()),
        }
    }

    /// Bytes of an incomplete record waiting for the next chunk
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Decode every complete record in `pending ++ chunk`.
    ///
    /// A trailing partial record stays buffered for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawEvent> {
        let size = self.layout.record_size();
        let mut events = Vec::with_capacity((self.pending.len() + chunk.len()) / size);
        let mut input = chunk;

        if !self.pending.is_empty() {
            let missing = size - self.pending.len();
            let take = missing.min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];

            if self.pending.len() < size {
                return events;
            }
            if let Some(event) = self.layout.decode_record(&self.pending) {
                events.push(event);
            }
            self.pending.clear();
        }

        let mut records = input.chunks_exact(size);
        for record in records.by_ref() {
            if let Some(event) = self.layout.decode_record(record) {
                events.push(event);
            }
        }

        let tail = records.remainder();
        if !tail.is_empty() {
            trace!("Deferring {} bytes of a partial record", tail.len());
            self.pending.extend_from_slice(tail);
        }

        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abs(code: u16, value: i32) -> RawEvent {
        RawEvent {
            time: EventTime { sec: 1_700_000_000, usec: 123_456 },
            kind: EV_ABS,
            code,
            value,
        }
    }

    #[test]
    fn record_width_follows_word_size() {
        assert_eq!(RecordLayout::new(WordSize::Eight).record_size(), 24);
        assert_eq!(RecordLayout::new(WordSize::Four).record_size(), 16);
    }

    #[test]
    fn native_layout_matches_c_long() {
        let expected = std::mem::size_of::<libc::c_long>();
        assert_eq!(WordSize::native().bytes(), expected);
    }

    #[test]
    fn decodes_both_layouts() {
        for layout in [RecordLayout::new(WordSize::Four), RecordLayout::new(WordSize::Eight)] {
            let event = abs(0x03, -1234);
            let bytes = layout.encode(&event);
            assert_eq!(bytes.len(), layout.record_size());
            assert_eq!(layout.decode_record(&bytes), Some(event));
        }
    }

    #[test]
    fn short_buffer_decodes_nothing() {
        let layout = RecordLayout::new(WordSize::Eight);
        let bytes = layout.encode(&abs(0, 1));
        assert_eq!(layout.decode_record(&bytes[..23]), None);
    }

    #[test]
    fn partial_record_is_carried_to_next_read() {
        let layout = RecordLayout::new(WordSize::Eight);
        let first = abs(0x00, 17);
        let second = abs(0x01, -9);
        let second_bytes = layout.encode(&second);

        let mut chunk = layout.encode(&first);
        chunk.extend_from_slice(&second_bytes[..3]);

        let mut decoder = EventDecoder::new(layout);
        assert_eq!(decoder.feed(&chunk), vec![first]);
        assert_eq!(decoder.pending_len(), 3);

        let third = abs(0x05, 400);
        let mut next = second_bytes[3..].to_vec();
        next.extend_from_slice(&layout.encode(&third));

        assert_eq!(decoder.feed(&next), vec![second, third]);
        assert_eq!(decoder.pending_len(), 0);
    }

    #[test]
    fn pending_record_can_span_several_reads() {
        let layout = RecordLayout::new(WordSize::Four);
        let event = abs(0x02, 77);
        let bytes = layout.encode(&event);

        let mut decoder = EventDecoder::new(layout);
        assert!(decoder.feed(&bytes[..5]).is_empty());
        assert!(decoder.feed(&bytes[5..9]).is_empty());
        assert_eq!(decoder.feed(&bytes[9..]), vec![event]);
    }

    #[test]
    fn only_tracked_abs_events_yield_readings() {
        assert_eq!(abs(0x04, 12).axis_reading(), Some((AxisId::Ry, 12)));
        // ABS_HAT0X is not tracked
        assert_eq!(abs(0x10, 1).axis_reading(), None);

        let key = RawEvent {
            kind: 0x01,
            ..abs(0x00, 1)
        };
        assert_eq!(key.axis_reading(), None);
    }

    #[test]
    fn word_size_rejects_other_widths() {
        assert_eq!(WordSize::try_from(4), Ok(WordSize::Four));
        assert_eq!(WordSize::try_from(8), Ok(WordSize::Eight));
        assert!(WordSize::try_from(2).is_err());
    }
}
