//! Audio playback abstraction

use crate::audio::format::AudioFormat;

/// Errors from an audio sink
#[derive(Debug, thiserror::Error)]
pub enum AudioSinkError {
    /// Device not found
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Format not supported by the device
    #[error("format not supported: {0:?}")]
    FormatNotSupported(AudioFormat),

    /// Stream error from the backend
    #[error("stream error: {0}")]
    StreamError(String),
}

/// Audio playback sink
///
/// `write` may accept fewer bytes than offered; partial accepts impose
/// back-pressure on the playout path, which stalls until space frees.
/// Silence insertion when no data is available is the sink's concern.
pub trait AudioSink: Send {
    /// Open the sink for the given format
    ///
    /// # Errors
    ///
    /// Returns `AudioSinkError` if the device rejects the format.
    fn open(&mut self, format: AudioFormat) -> Result<(), AudioSinkError>;

    /// Start playback
    ///
    /// # Errors
    ///
    /// Returns `AudioSinkError` if playback cannot start.
    fn start(&mut self) -> Result<(), AudioSinkError>;

    /// Stop playback
    ///
    /// # Errors
    ///
    /// Returns `AudioSinkError` if the backend fails to stop cleanly.
    fn stop(&mut self) -> Result<(), AudioSinkError>;

    /// Write PCM bytes, returning the number accepted
    fn write(&mut self, data: &[u8]) -> usize;

    /// Frames of free space currently available
    fn available_frames(&self) -> usize;
}
