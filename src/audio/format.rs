//! Audio format definitions for the AES67 profile

use serde::{Deserialize, Serialize};

/// Sample rate in Hz
///
/// AES67 interop requires 48 kHz; 44.1 and 96 kHz are also permitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleRate {
    /// 44.1 kHz (CD rate)
    Hz44100,
    /// 48 kHz (AES67 mandatory rate)
    #[default]
    Hz48000,
    /// 96 kHz (high resolution)
    Hz96000,
}

impl SampleRate {
    /// Get the rate as u32
    #[must_use]
    pub fn as_u32(self) -> u32 {
        match self {
            SampleRate::Hz44100 => 44100,
            SampleRate::Hz48000 => 48000,
            SampleRate::Hz96000 => 96000,
        }
    }

    /// Create from Hz value
    #[must_use]
    pub fn from_hz(hz: u32) -> Option<Self> {
        match hz {
            44100 => Some(SampleRate::Hz44100),
            48000 => Some(SampleRate::Hz48000),
            96000 => Some(SampleRate::Hz96000),
            _ => None,
        }
    }
}

/// Linear PCM bit depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BitDepth {
    /// 16-bit signed integer (L16)
    B16,
    /// 24-bit signed integer, packed (L24)
    #[default]
    B24,
    /// 32-bit signed integer (L32)
    B32,
}

impl BitDepth {
    /// Get bits per sample
    #[must_use]
    pub fn bits(self) -> u8 {
        match self {
            BitDepth::B16 => 16,
            BitDepth::B24 => 24,
            BitDepth::B32 => 32,
        }
    }

    /// Get bytes per sample
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            BitDepth::B16 => 2,
            BitDepth::B24 => 3,
            BitDepth::B32 => 4,
        }
    }

    /// Create from bit count
    #[must_use]
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            16 => Some(BitDepth::B16),
            24 => Some(BitDepth::B24),
            32 => Some(BitDepth::B32),
            _ => None,
        }
    }

    /// RTP encoding name for this depth (L16, L24, L32)
    #[must_use]
    pub fn encoding_name(self) -> &'static str {
        match self {
            BitDepth::B16 => "L16",
            BitDepth::B24 => "L24",
            BitDepth::B32 => "L32",
        }
    }

    /// Resolve an RTP encoding name back to a depth
    #[must_use]
    pub fn from_encoding_name(name: &str) -> Option<Self> {
        match name {
            "L16" => Some(BitDepth::B16),
            "L24" => Some(BitDepth::B24),
            "L32" => Some(BitDepth::B32),
            _ => None,
        }
    }
}

/// Maximum channel count permitted in a single stream
pub const MAX_CHANNELS: u8 = 64;

/// Complete audio format specification
///
/// Immutable once a sender or receiver session is connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate
    pub sample_rate: SampleRate,
    /// Channel count (1..=64), interleaved in declaration order
    pub channels: u8,
    /// Linear PCM bit depth
    pub bit_depth: BitDepth,
}

impl AudioFormat {
    /// Create a new audio format
    #[must_use]
    pub fn new(sample_rate: SampleRate, channels: u8, bit_depth: BitDepth) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
        }
    }

    /// Check the format against the AES67 profile limits
    #[must_use]
    pub fn is_valid(self) -> bool {
        self.channels >= 1 && self.channels <= MAX_CHANNELS
    }

    /// RTP encoding name (L16, L24, L32)
    #[must_use]
    pub fn encoding_name(self) -> &'static str {
        self.bit_depth.encoding_name()
    }

    /// Get bytes per frame (one sample across all channels)
    #[must_use]
    pub fn bytes_per_frame(self) -> usize {
        self.bit_depth.bytes_per_sample() * usize::from(self.channels)
    }

    /// Get bytes per second of the uncompressed stream
    #[must_use]
    pub fn bytes_per_second(self) -> usize {
        self.bytes_per_frame() * self.sample_rate.as_u32() as usize
    }

    /// Frames carried by one RTP packet at the given packet time
    ///
    /// 48 kHz at 1 ms gives 48; 96 kHz gives 96.
    #[must_use]
    pub fn samples_per_packet(self, packet_time_us: u32) -> u32 {
        (u64::from(self.sample_rate.as_u32()) * u64::from(packet_time_us) / 1_000_000) as u32
    }

    /// Payload bytes carried by one RTP packet at the given packet time
    #[must_use]
    pub fn bytes_per_packet(self, packet_time_us: u32) -> usize {
        self.samples_per_packet(packet_time_us) as usize * self.bytes_per_frame()
    }
}

impl Default for AudioFormat {
    /// The AES67 baseline format: L24/48000/2
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            channels: 2,
            bit_depth: BitDepth::B24,
        }
    }
}
