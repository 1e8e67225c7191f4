//! Audio formats, buffering, and host audio seams

pub mod format;
pub mod jitter;
pub mod sink;
pub mod source;

#[cfg(test)]
mod tests;

pub use format::{AudioFormat, BitDepth, SampleRate};
pub use jitter::{BufferedPacket, JitterBuffer, JitterBufferConfig, JitterStats};
pub use sink::{AudioSink, AudioSinkError};
pub use source::{AudioSource, AudioSourceError, CaptureBuffer, CaptureCallback};
