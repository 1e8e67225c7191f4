//! Audio capture abstraction
//!
//! The host audio subsystem delivers capture frames through a push
//! callback; the callback may run on a realtime thread and must not be
//! blocked by the consumer.

use std::time::Instant;

use bytes::Bytes;

use crate::audio::format::AudioFormat;

/// Errors from an audio source
#[derive(Debug, thiserror::Error)]
pub enum AudioSourceError {
    /// Device not found
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Format not supported by the device
    #[error("format not supported: {0:?}")]
    FormatNotSupported(AudioFormat),

    /// Stream error from the backend
    #[error("stream error: {0}")]
    StreamError(String),

    /// Source already started
    #[error("source already started")]
    AlreadyStarted,
}

/// One capture delivery from the host audio subsystem
///
/// Buffers are expected to be frame-aligned; the sender drops any
/// residual smaller than one packet.
#[derive(Debug, Clone)]
pub struct CaptureBuffer {
    /// Interleaved PCM bytes, big-endian samples
    pub data: Bytes,
    /// Frame count in this delivery
    pub frames: usize,
    /// Channel count
    pub channels: u8,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Bits per sample
    pub bits: u8,
    /// Capture wall-clock time
    pub captured_at: Instant,
}

/// Callback receiving capture buffers
pub type CaptureCallback = Box<dyn FnMut(&CaptureBuffer) + Send + 'static>;

/// Audio capture source
///
/// Implementations wrap a host audio backend and push frame-aligned
/// buffers into the registered callback.
pub trait AudioSource: Send {
    /// Open the source for the given format
    ///
    /// # Errors
    ///
    /// Returns `AudioSourceError` if the device rejects the format.
    fn open(&mut self, format: AudioFormat) -> Result<(), AudioSourceError>;

    /// Start capture, delivering buffers to the callback
    ///
    /// # Errors
    ///
    /// Returns `AudioSourceError` if capture cannot start.
    fn start(&mut self, callback: CaptureCallback) -> Result<(), AudioSourceError>;

    /// Stop capture
    ///
    /// # Errors
    ///
    /// Returns `AudioSourceError` if the backend fails to stop cleanly.
    fn stop(&mut self) -> Result<(), AudioSourceError>;
}
