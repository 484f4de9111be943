//! Jitter buffer and reassembler
//!
//! Decouples network arrival order from consumption order. Validated packets
//! are held sorted by sequence and released in order; a high-water mark
//! forces early out-of-order release so a lost packet bounds latency instead
//! of stalling playback, and FIFO eviction bounds memory.
//!
//! Per-packet state machine:
//! `received → validated → buffered → released`, or `buffered → evicted`
//! (overflow), or `received → discarded` (late/duplicate).

use bytes::Bytes;
use std::time::Instant;

use crate::protocol::{seq_distance, seq_newer, seq_older, Compression, PacketFlags};

/// One buffered packet; owned by the buffer until released or evicted
#[derive(Debug, Clone)]
pub struct JitterEntry {
    pub sequence: u32,
    pub timestamp_ms: u32,
    /// Wire payload, still compressed if the flags say so
    pub payload: Bytes,
    pub flags: PacketFlags,
    /// Variant the payload was compressed with, pinned at validation time so
    /// a later profile switch cannot mix decoder variants
    pub compression: Compression,
    pub received_at: Instant,
}

/// Result of inserting a validated packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Accepted; `gap_lost` sequences before it are newly presumed lost
    Buffered { gap_lost: u32 },
    /// Arrived after its slot was passed; discarded
    Late,
    /// Already buffered; discarded
    Duplicate,
}

/// Sequence-sorted, bounded packet buffer
pub struct JitterBuffer {
    /// Sorted by wraparound distance from `expected_sequence`
    entries: Vec<JitterEntry>,
    capacity: usize,
    /// Occupancy that triggers early out-of-order release
    high_water: usize,
    /// Next sequence the consumer is owed; advances, never retreats
    expected_sequence: u32,
    /// First sequence not yet covered by gap-loss accounting; ensures each
    /// missing sequence is counted lost exactly once
    loss_horizon: u32,
    received: u64,
    lost: u64,
    late: u64,
    duplicate: u64,
    overflow: u64,
    underruns: u64,
    released: u64,
}

impl JitterBuffer {
    pub fn new(capacity: usize, high_water: f32) -> Self {
        assert!(capacity >= 2, "capacity too small to reorder anything");
        let high_water = ((capacity as f32 * high_water) as usize).clamp(1, capacity);

        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            high_water,
            expected_sequence: 0,
            loss_horizon: 0,
            received: 0,
            lost: 0,
            late: 0,
            duplicate: 0,
            overflow: 0,
            underruns: 0,
            released: 0,
        }
    }

    /// Reset all state for a new stream, expecting `first_sequence` next
    pub fn reset(&mut self, first_sequence: u32) {
        self.entries.clear();
        self.expected_sequence = first_sequence;
        self.loss_horizon = first_sequence;
        self.received = 0;
        self.lost = 0;
        self.late = 0;
        self.duplicate = 0;
        self.overflow = 0;
        self.underruns = 0;
        self.released = 0;
    }

    /// Insert a validated packet
    ///
    /// Late and duplicate packets are discarded without touching
    /// `expected_sequence`. A sequence gap ahead of everything seen so far is
    /// presumed lost and counted once.
    pub fn insert(&mut self, entry: JitterEntry) -> InsertOutcome {
        let seq = entry.sequence;

        if seq_older(seq, self.expected_sequence) {
            self.late += 1;
            tracing::trace!(sequence = seq, expected = self.expected_sequence, "late packet discarded");
            return InsertOutcome::Late;
        }

        let expected = self.expected_sequence;
        let offset = seq_distance(seq, expected) as u32;
        let pos = match self
            .entries
            .binary_search_by_key(&offset, |e| seq_distance(e.sequence, expected) as u32)
        {
            Ok(_) => {
                self.duplicate += 1;
                return InsertOutcome::Duplicate;
            }
            Err(pos) => pos,
        };

        let gap_lost = if seq_newer(seq, self.loss_horizon) {
            seq_distance(seq, self.loss_horizon) as u32
        } else {
            0
        };
        if !seq_older(seq, self.loss_horizon) {
            self.loss_horizon = seq.wrapping_add(1);
        }
        self.lost += gap_lost as u64;

        self.entries.insert(pos, entry);
        self.received += 1;

        // Bounded memory: evict oldest entries past capacity
        while self.entries.len() > self.capacity {
            let evicted = self.entries.remove(0);
            self.overflow += 1;
            tracing::warn!(sequence = evicted.sequence, "jitter buffer overflow, oldest entry evicted");
        }

        InsertOutcome::Buffered { gap_lost }
    }

    /// Release every packet that is ready for the consumer
    ///
    /// A packet is ready when it is the next expected sequence, or when
    /// occupancy has crossed the high-water mark, in which case the oldest
    /// entry is released out of strict order to bound latency. After each
    /// release `expected_sequence` advances to released + 1.
    pub fn release_ready(&mut self) -> Vec<JitterEntry> {
        let mut out = Vec::new();

        loop {
            let Some(front) = self.entries.first() else {
                break;
            };

            let in_order = front.sequence == self.expected_sequence;
            if !in_order && self.entries.len() < self.high_water {
                break;
            }

            let entry = self.entries.remove(0);
            self.expected_sequence = entry.sequence.wrapping_add(1);
            self.released += 1;
            out.push(entry);
        }

        out
    }

    /// Release everything still buffered, in order (stream stop / flush)
    pub fn drain(&mut self) -> Vec<JitterEntry> {
        let mut out = std::mem::take(&mut self.entries);
        if let Some(last) = out.last() {
            self.expected_sequence = last.sequence.wrapping_add(1);
            self.released += out.len() as u64;
        }
        out
    }

    /// Record a consumer poll that found no data ready
    pub fn record_underrun(&mut self) {
        self.underruns += 1;
    }

    /// Next sequence the consumer is owed
    pub fn expected_sequence(&self) -> u32 {
        self.expected_sequence
    }

    /// Current number of buffered packets
    pub fn occupancy(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Statistics snapshot
    pub fn stats(&self) -> JitterStats {
        JitterStats {
            occupancy: self.entries.len(),
            capacity: self.capacity,
            expected_sequence: self.expected_sequence,
            received: self.received,
            lost: self.lost,
            late: self.late,
            duplicate: self.duplicate,
            overflow: self.overflow,
            underruns: self.underruns,
            released: self.released,
        }
    }
}

/// Jitter buffer statistics
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct JitterStats {
    pub occupancy: usize,
    pub capacity: usize,
    pub expected_sequence: u32,
    pub received: u64,
    pub lost: u64,
    pub late: u64,
    pub duplicate: u64,
    pub overflow: u64,
    pub underruns: u64,
    pub released: u64,
}

impl JitterStats {
    /// Loss rate as `lost / (received + lost)`
    pub fn loss_rate(&self) -> f64 {
        let total = self.received + self.lost;
        if total == 0 {
            0.0
        } else {
            self.lost as f64 / total as f64
        }
    }
}
