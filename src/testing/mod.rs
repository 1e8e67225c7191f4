//! Test doubles for external collaborators
//!
//! The PTP follower, audio source, and audio sink are host concerns;
//! these in-memory stand-ins let unit and integration tests drive the
//! engines deterministically.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytes::Bytes;

use crate::audio::format::AudioFormat;
use crate::audio::sink::{AudioSink, AudioSinkError};
use crate::audio::source::{AudioSource, AudioSourceError, CaptureBuffer, CaptureCallback};
use crate::clock::{PtpFollower, PtpState};

/// PTP follower with test-settable state and time
pub struct MockFollower {
    time_ns: AtomicI64,
    offset_ns: AtomicI64,
    state: Mutex<PtpState>,
}

impl MockFollower {
    /// Create a follower in the `Initializing` state at time zero
    #[must_use]
    pub fn new() -> Self {
        Self {
            time_ns: AtomicI64::new(0),
            offset_ns: AtomicI64::new(0),
            state: Mutex::new(PtpState::Initializing),
        }
    }

    /// Set the reported master-aligned time
    pub fn set_time_ns(&self, ns: i64) {
        self.time_ns.store(ns, Ordering::Release);
    }

    /// Advance the reported time
    pub fn advance_ns(&self, delta: i64) {
        self.time_ns.fetch_add(delta, Ordering::AcqRel);
    }

    /// Set the reported offset from master
    pub fn set_offset_ns(&self, ns: i64) {
        self.offset_ns.store(ns, Ordering::Release);
    }

    /// Set the port state
    pub fn set_state(&self, state: PtpState) {
        *self.state.lock().unwrap() = state;
    }
}

impl Default for MockFollower {
    fn default() -> Self {
        Self::new()
    }
}

impl PtpFollower for MockFollower {
    fn is_synchronized(&self) -> bool {
        *self.state.lock().unwrap() == PtpState::Slave
    }

    fn current_time_ns(&self) -> i64 {
        self.time_ns.load(Ordering::Acquire)
    }

    fn offset_from_master_ns(&self) -> i64 {
        self.offset_ns.load(Ordering::Acquire)
    }

    fn state(&self) -> PtpState {
        *self.state.lock().unwrap()
    }
}

/// Audio source driven directly by the test
///
/// `PushSource` is handed to the sender; the paired `PushHandle` feeds
/// capture buffers into whatever callback the sender registered.
pub struct PushSource {
    callback: Arc<Mutex<Option<CaptureCallback>>>,
    format: Option<AudioFormat>,
}

/// Driving handle for a [`PushSource`]
#[derive(Clone)]
pub struct PushHandle {
    callback: Arc<Mutex<Option<CaptureCallback>>>,
}

impl PushSource {
    /// Create a source and its driving handle
    #[must_use]
    pub fn new() -> (Self, PushHandle) {
        let callback = Arc::new(Mutex::new(None));
        (
            Self {
                callback: callback.clone(),
                format: None,
            },
            PushHandle { callback },
        )
    }
}

impl AudioSource for PushSource {
    fn open(&mut self, format: AudioFormat) -> Result<(), AudioSourceError> {
        self.format = Some(format);
        Ok(())
    }

    fn start(&mut self, callback: CaptureCallback) -> Result<(), AudioSourceError> {
        let mut slot = self.callback.lock().unwrap();
        if slot.is_some() {
            return Err(AudioSourceError::AlreadyStarted);
        }
        *slot = Some(callback);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioSourceError> {
        *self.callback.lock().unwrap() = None;
        Ok(())
    }
}

impl PushHandle {
    /// Push a capture buffer into the registered callback
    ///
    /// Silently dropped while the source is stopped, like a real
    /// backend draining after stop.
    pub fn push(&self, buffer: &CaptureBuffer) {
        if let Some(callback) = self.callback.lock().unwrap().as_mut() {
            callback(buffer);
        }
    }

    /// Push `frames` zeroed frames in the given format
    pub fn push_silence(&self, format: AudioFormat, frames: usize) {
        self.push(&CaptureBuffer {
            data: Bytes::from(vec![0u8; frames * format.bytes_per_frame()]),
            frames,
            channels: format.channels,
            sample_rate: format.sample_rate.as_u32(),
            bits: format.bit_depth.bits(),
            captured_at: Instant::now(),
        });
    }

    /// Whether a callback is currently registered
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.callback.lock().unwrap().is_some()
    }
}

struct MemorySinkState {
    data: Vec<u8>,
    capacity: Option<usize>,
    bytes_per_frame: usize,
    started: bool,
}

/// Collecting audio sink with optional bounded capacity
///
/// With a capacity set, `write` accepts only what fits, exercising the
/// playout path's back-pressure handling. Clones share storage so the
/// test can inspect what the receiver played out.
#[derive(Clone)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
}

impl MemorySink {
    /// Create an unbounded collecting sink
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    /// Create a sink that accepts at most `capacity` bytes
    #[must_use]
    pub fn bounded(capacity: usize) -> Self {
        Self::with_capacity(Some(capacity))
    }

    fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemorySinkState {
                data: Vec::new(),
                capacity,
                bytes_per_frame: 1,
                started: false,
            })),
        }
    }

    /// Total bytes accepted so far
    #[must_use]
    pub fn bytes_written(&self) -> usize {
        self.state.lock().unwrap().data.len()
    }

    /// Drain and return everything accepted so far
    #[must_use]
    pub fn take_data(&self) -> Vec<u8> {
        std::mem::take(&mut self.state.lock().unwrap().data)
    }

    /// Free space to simulate the device consuming audio
    pub fn consume(&self, bytes: usize) {
        let mut state = self.state.lock().unwrap();
        let n = bytes.min(state.data.len());
        state.data.drain(..n);
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSink for MemorySink {
    fn open(&mut self, format: AudioFormat) -> Result<(), AudioSinkError> {
        self.state.lock().unwrap().bytes_per_frame = format.bytes_per_frame();
        Ok(())
    }

    fn start(&mut self) -> Result<(), AudioSinkError> {
        self.state.lock().unwrap().started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioSinkError> {
        self.state.lock().unwrap().started = false;
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> usize {
        let mut state = self.state.lock().unwrap();
        let accept = match state.capacity {
            Some(cap) => data.len().min(cap.saturating_sub(state.data.len())),
            None => data.len(),
        };
        state.data.extend_from_slice(&data[..accept]);
        accept
    }

    fn available_frames(&self) -> usize {
        let state = self.state.lock().unwrap();
        let free = match state.capacity {
            Some(cap) => cap.saturating_sub(state.data.len()),
            None => usize::MAX / 2,
        };
        free / state.bytes_per_frame.max(1)
    }
}
