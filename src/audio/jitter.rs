//! Jitter buffer for reordering and pacing RTP packets
//!
//! Converts bursty network arrivals into a steady playout stream:
//! packets are kept ordered by RTP timestamp (wrap-safe), the head must
//! dwell long enough to absorb jitter, and a bounded size prefers fresh
//! audio over backlog.

use std::collections::VecDeque;
use std::time::Instant;

use bytes::Bytes;

use crate::rtp::{seq_before, timestamp_before};

/// Packets required before the first drain after a reset
const PRIME_DEPTH: usize = 3;

/// Jitter buffer configuration
#[derive(Debug, Clone, Copy)]
pub struct JitterBufferConfig {
    /// Target playout delay in milliseconds
    pub target_delay_ms: u32,
    /// Minimum playout delay in milliseconds
    pub min_delay_ms: u32,
    /// Maximum tolerated lateness in milliseconds
    pub max_delay_ms: u32,
    /// Maximum buffered packets; excess evicts the oldest
    pub max_packets: usize,
    /// Stream sample rate, used to size the late-packet window
    pub sample_rate: u32,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        Self {
            target_delay_ms: 10,
            min_delay_ms: 5,
            max_delay_ms: 50,
            max_packets: 256,
            sample_rate: 48000,
        }
    }
}

/// A buffered packet awaiting playout
#[derive(Debug, Clone)]
pub struct BufferedPacket {
    /// PCM payload bytes
    pub payload: Bytes,
    /// RTP sequence number
    pub sequence: u16,
    /// RTP timestamp in sample units
    pub timestamp: u32,
    /// Wall-clock arrival time
    pub arrival: Instant,
}

/// Jitter buffer statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct JitterStats {
    /// Packets evicted on overflow
    pub overruns: u64,
    /// Packets dropped as too late to play
    pub dropped_late: u64,
    /// Duplicate-sequence packets replaced
    pub duplicates: u64,
}

/// Reordering and pacing queue between network receive and playout
pub struct JitterBuffer {
    config: JitterBufferConfig,
    packets: VecDeque<BufferedPacket>,
    /// Set once the buffer has held `PRIME_DEPTH` packets since reset
    primed: bool,
    last_popped_timestamp: Option<u32>,
    stats: JitterStats,
}

impl JitterBuffer {
    /// Create a buffer with the given configuration
    #[must_use]
    pub fn new(config: JitterBufferConfig) -> Self {
        Self {
            config,
            packets: VecDeque::with_capacity(config.max_packets.min(1024)),
            primed: false,
            last_popped_timestamp: None,
            stats: JitterStats::default(),
        }
    }

    /// Insert a packet, keeping timestamp order
    ///
    /// Returns false when the packet was dropped as late. Duplicate
    /// sequence numbers replace the existing entry: AES67 senders never
    /// retransmit, so a duplicate is middle-box replication and the
    /// newest copy wins.
    pub fn push(&mut self, payload: Bytes, sequence: u16, timestamp: u32, arrival: Instant) -> bool {
        if self.is_late(timestamp) {
            self.stats.dropped_late += 1;
            return false;
        }

        if let Some(existing) = self.packets.iter_mut().find(|p| p.sequence == sequence) {
            existing.payload = payload;
            existing.timestamp = timestamp;
            existing.arrival = arrival;
            self.stats.duplicates += 1;
            return true;
        }

        if self.packets.len() >= self.config.max_packets {
            // Full: evict the packet about to be played, keeping fresh
            // audio over backlog.
            self.packets.pop_front();
            self.stats.overruns += 1;
        }

        let entry = BufferedPacket {
            payload,
            sequence,
            timestamp,
            arrival,
        };

        let mut idx = self.packets.len();
        while idx > 0 && entry_before(&entry, &self.packets[idx - 1]) {
            idx -= 1;
        }
        self.packets.insert(idx, entry);

        if self.packets.len() >= PRIME_DEPTH {
            self.primed = true;
        }

        true
    }

    /// Pop the head packet if the drain policy allows
    ///
    /// The first drain after a reset requires `PRIME_DEPTH` queued
    /// packets; afterwards the head is released once it has dwelt
    /// min(target, min) milliseconds, or immediately while the buffer
    /// holds a full priming depth.
    pub fn pop(&mut self, now: Instant) -> Option<BufferedPacket> {
        let head = self.packets.front()?;

        if !self.primed {
            return None;
        }

        if self.packets.len() < PRIME_DEPTH {
            let gate = u64::from(self.config.target_delay_ms.min(self.config.min_delay_ms));
            let dwell_ms = now.saturating_duration_since(head.arrival).as_millis() as u64;
            if dwell_ms < gate {
                return None;
            }
        }

        let packet = self.packets.pop_front()?;
        self.last_popped_timestamp = Some(packet.timestamp);
        Some(packet)
    }

    /// Fill level in [0, 1]
    #[must_use]
    pub fn level(&self) -> f64 {
        if self.config.max_packets == 0 {
            return 0.0;
        }
        self.packets.len() as f64 / self.config.max_packets as f64
    }

    /// Wall-clock dwell time of the current head, in milliseconds
    #[must_use]
    pub fn latency_ms(&self) -> f64 {
        self.packets
            .front()
            .map_or(0.0, |p| p.arrival.elapsed().as_secs_f64() * 1000.0)
    }

    /// Number of buffered packets
    #[must_use]
    pub fn len(&self) -> usize {
        self.packets.len()
    }

    /// Whether the buffer is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> JitterStats {
        self.stats
    }

    /// Clear all packets and return to the unprimed state
    pub fn reset(&mut self) {
        self.packets.clear();
        self.primed = false;
        self.last_popped_timestamp = None;
    }

    /// A packet is late when its timestamp predates the last-popped
    /// timestamp by more than the configured maximum delay
    fn is_late(&self, timestamp: u32) -> bool {
        let Some(last) = self.last_popped_timestamp else {
            return false;
        };
        let window =
            (u64::from(self.config.max_delay_ms) * u64::from(self.config.sample_rate) / 1000) as u32;
        timestamp_before(timestamp, last.wrapping_sub(window))
    }
}

/// Ordering by RTP timestamp with lexicographic sequence tie-break
fn entry_before(a: &BufferedPacket, b: &BufferedPacket) -> bool {
    if a.timestamp == b.timestamp {
        seq_before(a.sequence, b.sequence)
    } else {
        timestamp_before(a.timestamp, b.timestamp)
    }
}
