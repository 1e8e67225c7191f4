use thiserror::Error;

/// RTP header (12 bytes, network byte order)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtpHeader {
    /// Version (2 bits, always 2)
    pub version: u8,
    /// Padding flag
    pub padding: bool,
    /// Extension flag
    pub extension: bool,
    /// CSRC count (4 bits)
    pub csrc_count: u8,
    /// Marker bit (always 0 for linear PCM)
    pub marker: bool,
    /// Payload type (7 bits, dynamic for AES67)
    pub payload_type: u8,
    /// Sequence number (16 bits, wraps)
    pub sequence: u16,
    /// Timestamp in sample units (32 bits, wraps)
    pub timestamp: u32,
    /// Synchronization source ID
    pub ssrc: u32,
}

impl RtpHeader {
    /// Fixed RTP header size
    pub const SIZE: usize = 12;

    /// Create an audio packet header
    ///
    /// Marker, extension, and CSRC count are zero for linear PCM streams.
    #[must_use]
    pub fn new_audio(payload_type: u8, sequence: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            version: 2,
            padding: false,
            extension: false,
            csrc_count: 0,
            marker: false,
            payload_type: payload_type & 0x7F,
            sequence,
            timestamp,
            ssrc,
        }
    }

    /// Encode header to bytes
    #[must_use]
    pub fn encode(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];

        // Byte 0: V(2) | P(1) | X(1) | CC(4)
        buf[0] = (self.version << 6)
            | (u8::from(self.padding) << 5)
            | (u8::from(self.extension) << 4)
            | (self.csrc_count & 0x0F);

        // Byte 1: M(1) | PT(7)
        buf[1] = (u8::from(self.marker) << 7) | (self.payload_type & 0x7F);

        buf[2..4].copy_from_slice(&self.sequence.to_be_bytes());
        buf[4..8].copy_from_slice(&self.timestamp.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ssrc.to_be_bytes());

        buf
    }

    /// Decode the fixed header from bytes
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the buffer is too small or the version
    /// is not 2.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        if buf.len() < Self::SIZE {
            return Err(RtpDecodeError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }

        let version = (buf[0] >> 6) & 0x03;
        if version != 2 {
            return Err(RtpDecodeError::InvalidVersion(version));
        }

        Ok(Self {
            version,
            padding: (buf[0] >> 5) & 0x01 != 0,
            extension: (buf[0] >> 4) & 0x01 != 0,
            csrc_count: buf[0] & 0x0F,
            marker: (buf[1] >> 7) & 0x01 != 0,
            payload_type: buf[1] & 0x7F,
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
        })
    }

    /// Total header length including CSRC list and extension, if declared
    ///
    /// Reads the extension length from the 4-byte extension preamble.
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError::HeaderTruncated` when the declared header
    /// would exceed the received length.
    pub fn wire_length(&self, buf: &[u8]) -> Result<usize, RtpDecodeError> {
        let mut len = Self::SIZE + usize::from(self.csrc_count) * 4;

        if self.extension {
            // Extension preamble: 16-bit profile id, 16-bit word count.
            if buf.len() < len + 4 {
                return Err(RtpDecodeError::HeaderTruncated {
                    declared: len + 4,
                    have: buf.len(),
                });
            }
            let ext_words = u16::from_be_bytes([buf[len + 2], buf[len + 3]]);
            len += 4 + usize::from(ext_words) * 4;
        }

        if buf.len() < len {
            return Err(RtpDecodeError::HeaderTruncated {
                declared: len,
                have: buf.len(),
            });
        }

        Ok(len)
    }
}

/// RTP decode errors
///
/// All decode failures are soft: the caller drops the packet and keeps
/// receiving.
#[derive(Debug, Error)]
pub enum RtpDecodeError {
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    #[error("invalid RTP version: {0}")]
    InvalidVersion(u8),

    #[error("declared header length {declared} exceeds packet length {have}")]
    HeaderTruncated { declared: usize, have: usize },

    #[error("empty payload")]
    EmptyPayload,
}

/// Complete RTP packet with header and payload
#[derive(Debug, Clone)]
pub struct RtpPacket {
    /// Packet header
    pub header: RtpHeader,
    /// PCM payload, big-endian sample bytes
    pub payload: Vec<u8>,
}

impl RtpPacket {
    /// Create an audio packet
    #[must_use]
    pub fn audio(
        payload_type: u8,
        sequence: u16,
        timestamp: u32,
        ssrc: u32,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            header: RtpHeader::new_audio(payload_type, sequence, timestamp, ssrc),
            payload,
        }
    }

    /// Encode packet to bytes
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(RtpHeader::SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        buf
    }

    /// Decode packet from bytes
    ///
    /// Skips the CSRC list and any header extension before extracting the
    /// payload.
    ///
    /// # Errors
    ///
    /// Returns `RtpDecodeError` if the header is invalid, truncated, or
    /// leaves no payload.
    pub fn decode(buf: &[u8]) -> Result<Self, RtpDecodeError> {
        let header = RtpHeader::decode(buf)?;
        let header_len = header.wire_length(buf)?;

        if buf.len() <= header_len {
            return Err(RtpDecodeError::EmptyPayload);
        }

        Ok(Self {
            header,
            payload: buf[header_len..].to_vec(),
        })
    }
}
