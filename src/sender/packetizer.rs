//! Capture-buffer slicing into fixed-cadence RTP packets

use bytes::{BufMut, Bytes, BytesMut};

use crate::audio::format::AudioFormat;
use crate::audio::source::CaptureBuffer;
use crate::clock::MediaClock;
use crate::rtp::RtpHeader;

/// Slices capture buffers into RTP packets at a fixed packet time
///
/// Owned exclusively by the capture callback thread: no locks on the
/// hot path. Counters wrap per RTP rules (16-bit sequence, 32-bit
/// timestamp).
pub(crate) struct Packetizer {
    payload_type: u8,
    ssrc: u32,
    sample_rate: u32,
    samples_per_packet: u32,
    bytes_per_packet: usize,
    sequence: u16,
    timestamp: u32,
    clock: Option<MediaClock>,
    encode_buffer: BytesMut,
}

impl Packetizer {
    pub(crate) fn new(
        format: AudioFormat,
        packet_time_us: u32,
        payload_type: u8,
        ssrc: u32,
        clock: Option<MediaClock>,
    ) -> Self {
        let samples_per_packet = format.samples_per_packet(packet_time_us);
        let bytes_per_packet = format.bytes_per_packet(packet_time_us);

        Self {
            payload_type,
            ssrc,
            sample_rate: format.sample_rate.as_u32(),
            samples_per_packet,
            bytes_per_packet,
            sequence: rand::random(),
            timestamp: 0,
            clock,
            encode_buffer: BytesMut::with_capacity(RtpHeader::SIZE + bytes_per_packet),
        }
    }

    /// Current sequence counter
    pub(crate) fn sequence(&self) -> u16 {
        self.sequence
    }

    /// Current timestamp counter
    pub(crate) fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Samples carried by one packet
    pub(crate) fn samples_per_packet(&self) -> u32 {
        self.samples_per_packet
    }

    /// Slice a capture buffer into packets, invoking `emit` per packet
    ///
    /// Returns the number of packets emitted. Residual bytes smaller
    /// than one packet are dropped: AES67 mandates a fixed cadence and
    /// the host source delivers frame-aligned buffers.
    pub(crate) fn packetize(
        &mut self,
        buffer: &CaptureBuffer,
        mut emit: impl FnMut(Bytes),
    ) -> u32 {
        if self.bytes_per_packet == 0 {
            return 0;
        }

        // Re-anchor on the PTP-derived timestamp while synchronized;
        // otherwise continue the previous counter free-running.
        if let Some(clock) = &self.clock {
            if clock.is_synchronized() {
                self.timestamp = clock.rtp_timestamp(self.sample_rate);
            }
        }

        let mut emitted = 0u32;
        for chunk in buffer.data.chunks_exact(self.bytes_per_packet) {
            let header =
                RtpHeader::new_audio(self.payload_type, self.sequence, self.timestamp, self.ssrc);

            self.encode_buffer.reserve(RtpHeader::SIZE + chunk.len());
            self.encode_buffer.put_slice(&header.encode());
            self.encode_buffer.put_slice(chunk);
            emit(self.encode_buffer.split().freeze());

            self.sequence = self.sequence.wrapping_add(1);
            self.timestamp = self.timestamp.wrapping_add(self.samples_per_packet);
            emitted += 1;
        }

        emitted
    }
}
