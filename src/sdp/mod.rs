//! SDP session descriptions for the AES67 profile
//!
//! AES67 streams are declared with a small, fixed SDP shape: one audio
//! media section with an L16/L24/L32 rtpmap, a ptime attribute, and a
//! PTP reference clock. The parser is tolerant of unknown lines; the
//! generator emits the canonical document.

mod builder;
mod parser;

#[cfg(test)]
mod tests;

pub use builder::{generate, SdpSessionParams};
pub use parser::SdpParser;

use crate::audio::format::{AudioFormat, BitDepth, SampleRate};

/// Parsed AES67 session description
#[derive(Debug, Clone, Default)]
pub struct SdpInfo {
    /// Session name (s=)
    pub session_name: String,
    /// Decimal session id from the origin line
    pub session_id: String,
    /// Origin address (o=)
    pub origin_address: String,
    /// Connection / source address (c=), slash suffix stripped
    pub source_ip: String,
    /// UDP port from the media line
    pub port: u16,
    /// RTP payload type from the media line
    pub payload_type: u8,
    /// Encoding name from rtpmap (L16, L24, L32)
    pub encoding: String,
    /// Sample rate from rtpmap
    pub sample_rate: u32,
    /// Channel count from rtpmap
    pub channels: u8,
    /// Bit depth inferred from the encoding name
    pub bit_depth: u8,
    /// Packet time in microseconds (a=ptime, milliseconds on the wire)
    pub packet_time_us: u32,
    /// Whether a PTP reference clock was declared
    pub ptp_reference: bool,
    /// PTP grandmaster clock id, when the ts-refclk line carries one
    pub ptp_clock_id: Option<String>,
    /// Minimum fields present: source IP, port, sample rate, channels
    pub is_valid: bool,
}

impl SdpInfo {
    /// Packet times accepted by the AES67 profile, in microseconds
    pub const VALID_PACKET_TIMES_US: [u32; 5] = [125, 250, 333, 1000, 4000];

    /// Convert the parsed rtpmap fields into a typed audio format
    ///
    /// Returns `None` when the declared rate or depth is outside the
    /// AES67 profile.
    #[must_use]
    pub fn audio_format(&self) -> Option<AudioFormat> {
        let sample_rate = SampleRate::from_hz(self.sample_rate)?;
        let bit_depth = BitDepth::from_bits(self.bit_depth)?;
        let format = AudioFormat::new(sample_rate, self.channels, bit_depth);
        format.is_valid().then_some(format)
    }

    /// Validate against the AES67 profile
    ///
    /// Requires a profile sample rate and bit depth, an encoding name
    /// matching the depth, and a profile packet time.
    #[must_use]
    pub fn validate_aes67(&self) -> bool {
        if !self.is_valid {
            return false;
        }

        let Some(format) = self.audio_format() else {
            return false;
        };

        if self.encoding != format.encoding_name() {
            return false;
        }

        Self::VALID_PACKET_TIMES_US.contains(&self.packet_time_us)
    }
}
