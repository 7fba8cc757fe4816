//! Sender-side window of unacknowledged frames
//!
//! Entries are kept in transmission order, keyed by absolute byte offset.
//! A cumulative ack removes every entry whose bytes all lie below it.

use crate::sequence::SeqNumber;
use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Instant;

/// Transmission state of a window entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Read from the source, never sent
    Unsent,
    /// Sent and waiting for an ack
    InFlight,
    /// Covered by a cumulative ack
    Acknowledged,
    /// Retransmission timer fired; resend on the next pass
    TimedOut,
}

impl EntryStatus {
    /// Check if the entry must be (re)sent
    #[inline]
    pub fn needs_transmit(self) -> bool {
        matches!(self, EntryStatus::Unsent | EntryStatus::TimedOut)
    }
}

/// One frame held by the sender
#[derive(Debug, Clone)]
pub struct InFlightEntry {
    /// Absolute offset of the first payload byte
    pub offset: u64,
    /// Wire sequence number of the first payload byte
    pub seq: SeqNumber,
    /// Payload data
    pub payload: Bytes,
    /// Time of the last transmission
    pub send_time: Option<Instant>,
    /// Transmission state
    pub status: EntryStatus,
    /// Number of times this frame has been sent
    pub transmissions: u32,
    /// Timeouts since the frame was last acknowledged
    pub consecutive_timeouts: u32,
}

impl InFlightEntry {
    /// Absolute offset one past the last payload byte
    #[inline]
    pub fn end(&self) -> u64 {
        self.offset + self.payload.len() as u64
    }

    /// Payload length
    #[inline]
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Ordered window of frames awaiting acknowledgement
#[derive(Debug, Default)]
pub struct SendWindow {
    entries: VecDeque<InFlightEntry>,
    /// Offset of the oldest unacknowledged byte
    base: u64,
    /// Offset the next pushed frame starts at
    next_offset: u64,
}

impl SendWindow {
    /// Create an empty window starting at offset 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Offset of the oldest unacknowledged byte
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Offset the next pushed frame starts at
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Bytes held by the window, sent or not
    pub fn bytes_in_flight(&self) -> usize {
        (self.next_offset - self.base) as usize
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the window holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Append a frame as [`EntryStatus::Unsent`]
    pub fn push(&mut self, seq: SeqNumber, payload: Bytes) -> &InFlightEntry {
        let offset = self.next_offset;
        self.next_offset += payload.len() as u64;

        self.entries.push_back(InFlightEntry {
            offset,
            seq,
            payload,
            send_time: None,
            status: EntryStatus::Unsent,
            transmissions: 0,
            consecutive_timeouts: 0,
        });
        &self.entries[self.entries.len() - 1]
    }

    /// Iterate over entries in transmission order
    pub fn iter(&self) -> impl Iterator<Item = &InFlightEntry> {
        self.entries.iter()
    }

    /// Iterate mutably over entries in transmission order
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut InFlightEntry> {
        self.entries.iter_mut()
    }

    /// Check if any entry must be (re)sent
    pub fn has_pending_transmit(&self) -> bool {
        self.entries.iter().any(|e| e.status.needs_transmit())
    }

    /// Check if any entry is waiting for an ack
    pub fn has_in_flight(&self) -> bool {
        self.entries
            .iter()
            .any(|e| e.status == EntryStatus::InFlight)
    }

    /// The earliest entry still waiting for an ack
    pub fn oldest_in_flight_mut(&mut self) -> Option<&mut InFlightEntry> {
        self.entries
            .iter_mut()
            .find(|e| e.status == EntryStatus::InFlight)
    }

    /// Remove every entry lying entirely below `ack_offset`
    ///
    /// Returns the removed entries, marked acknowledged, oldest first.
    pub fn acknowledge(&mut self, ack_offset: u64) -> Vec<InFlightEntry> {
        let mut acked = Vec::new();

        while let Some(front) = self.entries.front() {
            if front.end() > ack_offset {
                break;
            }
            if let Some(mut entry) = self.entries.pop_front() {
                entry.status = EntryStatus::Acknowledged;
                self.base = entry.end();
                acked.push(entry);
            }
        }

        acked
    }
}
