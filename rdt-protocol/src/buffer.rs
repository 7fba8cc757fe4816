//! Receive buffer for out-of-order reassembly
//!
//! A byte ring of `Wr` slots indexed by absolute offset modulo `Wr`. Each
//! slot carries a filled flag, so overlapping or duplicated frames are
//! stored idempotently. Two cursors describe the contents:
//!
//! * `r_last` - bytes below it were handed to the application
//! * `r_next` - bytes below it are contiguous and validated
//!
//! with `r_last <= r_next <= r_last + Wr` at all times.

use crate::sequence::{SeqNumber, SeqSpace};
use bytes::Bytes;
use thiserror::Error;

/// Buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Sequence {seq} (+{len} bytes) outside receive window starting at {window_start}")]
    SequenceOutOfWindow {
        seq: SeqNumber,
        len: usize,
        window_start: SeqNumber,
    },
}

/// Result of storing one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InsertOutcome {
    /// Bytes that were not already buffered
    pub new_bytes: usize,
    /// How far `r_next` moved
    pub advanced: usize,
}

impl InsertOutcome {
    /// Check if the frame only repeated buffered bytes
    pub fn is_duplicate(&self) -> bool {
        self.new_bytes == 0
    }
}

/// Circular receive buffer
pub struct ReceiveBuffer {
    space: SeqSpace,
    /// Byte storage (circular)
    slots: Vec<u8>,
    /// Whether each slot holds a received byte
    filled: Vec<bool>,
    /// Delivered to the application up to here
    r_last: u64,
    /// Contiguous and validated up to here
    r_next: u64,
}

impl ReceiveBuffer {
    /// Create a new receive buffer of `capacity` bytes
    ///
    /// `capacity` plus the sender's span must not exceed the sequence space.
    pub fn new(capacity: usize, space: SeqSpace) -> Self {
        ReceiveBuffer {
            space,
            slots: vec![0; capacity],
            filled: vec![false; capacity],
            r_last: 0,
            r_next: 0,
        }
    }

    /// Buffer capacity (Wr)
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Absolute offset delivered to the application
    pub fn r_last(&self) -> u64 {
        self.r_last
    }

    /// Absolute offset of the end of the contiguous run
    pub fn r_next(&self) -> u64 {
        self.r_next
    }

    /// Cumulative ack to report: wire sequence of `r_next`
    pub fn cumulative_ack(&self) -> SeqNumber {
        self.space.wrap(self.r_next)
    }

    /// Bytes ready for [`consume`](Self::consume)
    pub fn available(&self) -> usize {
        (self.r_next - self.r_last) as usize
    }

    /// Free space to advertise: `Wr - (r_next - r_last)`
    pub fn window(&self) -> usize {
        self.capacity() - self.available()
    }

    #[inline]
    fn index(&self, offset: u64) -> usize {
        (offset % self.slots.len() as u64) as usize
    }

    /// Store a frame's payload
    ///
    /// The frame must lie entirely inside `[r_last, r_last + Wr)`; anything
    /// else is rejected without touching the buffer.
    pub fn insert(&mut self, seq: SeqNumber, payload: &[u8]) -> Result<InsertOutcome, BufferError> {
        let capacity = self.capacity();
        let distance = self.space.distance(self.space.wrap(self.r_last), seq) as usize;

        if distance >= capacity || distance + payload.len() > capacity {
            return Err(BufferError::SequenceOutOfWindow {
                seq,
                len: payload.len(),
                window_start: self.space.wrap(self.r_last),
            });
        }

        let start = self.r_last + distance as u64;
        let mut outcome = InsertOutcome::default();

        for (i, &byte) in payload.iter().enumerate() {
            let idx = self.index(start + i as u64);
            if !self.filled[idx] {
                self.slots[idx] = byte;
                self.filled[idx] = true;
                outcome.new_bytes += 1;
            }
        }

        let before = self.r_next;
        let limit = self.r_last + capacity as u64;
        while self.r_next < limit {
            let idx = self.index(self.r_next);
            if !self.filled[idx] {
                break;
            }
            self.r_next += 1;
        }
        outcome.advanced = (self.r_next - before) as usize;

        Ok(outcome)
    }

    /// Take up to `max_bytes` contiguous bytes starting at `r_last`
    ///
    /// Advances `r_last` and frees the slots.
    pub fn consume(&mut self, max_bytes: usize) -> Bytes {
        let n = max_bytes.min(self.available());
        let mut out = Vec::with_capacity(n);

        for offset in self.r_last..self.r_last + n as u64 {
            let idx = self.index(offset);
            out.push(self.slots[idx]);
            self.filled[idx] = false;
        }
        self.r_last += n as u64;

        Bytes::from(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> ReceiveBuffer {
        ReceiveBuffer::new(20, SeqSpace::new(256))
    }

    #[test]
    fn test_in_order() {
        let mut buf = buffer();

        let outcome = buf.insert(SeqNumber::new(0), b"0123456789").unwrap();
        assert_eq!(outcome.new_bytes, 10);
        assert_eq!(outcome.advanced, 10);
        assert_eq!(buf.r_next(), 10);
        assert_eq!(buf.window(), 10);
        assert_eq!(buf.cumulative_ack(), SeqNumber::new(10));
    }

    #[test]
    fn test_out_of_order_reassembly() {
        let mut buf = buffer();

        let outcome = buf.insert(SeqNumber::new(10), b"abcde").unwrap();
        assert_eq!(outcome.advanced, 0);
        assert_eq!(buf.r_next(), 0);

        let outcome = buf.insert(SeqNumber::new(0), b"0123456789").unwrap();
        assert_eq!(outcome.advanced, 15);
        assert_eq!(&buf.consume(100)[..], b"0123456789abcde");
    }

    #[test]
    fn test_duplicate_is_idempotent() {
        let mut buf = buffer();
        buf.insert(SeqNumber::new(0), b"hello").unwrap();

        let outcome = buf.insert(SeqNumber::new(0), b"hello").unwrap();
        assert!(outcome.is_duplicate());
        assert_eq!(buf.r_next(), 5);
        assert_eq!(&buf.consume(5)[..], b"hello");
    }

    #[test]
    fn test_out_of_window_rejected() {
        let mut buf = buffer();

        // Starts beyond r_last + Wr
        assert!(buf.insert(SeqNumber::new(20), b"x").is_err());
        // Starts inside but overruns the buffer
        assert!(buf.insert(SeqNumber::new(15), b"0123456789").is_err());
        assert_eq!(buf.r_next(), 0);

        buf.insert(SeqNumber::new(0), b"0123456789").unwrap();
        buf.consume(10);
        // Already delivered: behind r_last
        assert!(matches!(
            buf.insert(SeqNumber::new(0), b"0123456789"),
            Err(BufferError::SequenceOutOfWindow { .. })
        ));
    }

    #[test]
    fn test_full_buffer_zero_window() {
        let mut buf = buffer();
        buf.insert(SeqNumber::new(0), b"0123456789").unwrap();
        buf.insert(SeqNumber::new(10), b"0123456789").unwrap();
        assert_eq!(buf.window(), 0);

        buf.consume(5);
        assert_eq!(buf.window(), 5);
        assert_eq!(buf.r_last(), 5);
    }

    #[test]
    fn test_wraparound() {
        let mut buf = ReceiveBuffer::new(20, SeqSpace::new(32));

        buf.insert(SeqNumber::new(0), &[1u8; 10]).unwrap();
        buf.insert(SeqNumber::new(10), &[2u8; 10]).unwrap();
        buf.consume(20);

        // Offset 20..30 maps to wire 20..30, then 30..40 wraps to 30, 31, 0..
        buf.insert(SeqNumber::new(30), &[4u8; 10]).unwrap();
        assert_eq!(buf.r_next(), 20);
        buf.insert(SeqNumber::new(20), &[3u8; 10]).unwrap();
        assert_eq!(buf.r_next(), 40);
        assert_eq!(buf.cumulative_ack(), SeqNumber::new(8));

        let out = buf.consume(20);
        assert_eq!(&out[..10], &[3u8; 10]);
        assert_eq!(&out[10..], &[4u8; 10]);
    }
}
