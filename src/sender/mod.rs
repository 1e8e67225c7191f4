//! AES67 sender engine
//!
//! Packetizes locally-captured PCM into RTP and transmits it to a
//! multicast group. The capture callback drives the hot path: it owns
//! the packetizer exclusively and publishes statistics through atomics,
//! so no lock is taken while a realtime thread is delivering audio.

mod packetizer;


use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::audio::format::AudioFormat;
use crate::audio::source::{AudioSource, CaptureBuffer};
use crate::clock::MediaClock;
use crate::error::{Aes67Error, Result};
use crate::sdp::{self, SdpSessionParams};
use crate::sender::packetizer::Packetizer;

/// Packet times accepted by the AES67 profile, in microseconds
const VALID_PACKET_TIMES_US: [u32; 5] = [125, 250, 333, 1000, 4000];

/// Sessions are unhealthy after this long without traffic
const STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Sender configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Stable identifier (UUID); minted on NMOS registration when empty
    pub id: String,
    /// Human label
    pub label: String,
    /// Free-form description
    pub description: String,
    /// Stream audio format
    pub format: AudioFormat,
    /// Multicast destination group
    pub multicast_ip: Ipv4Addr,
    /// Destination UDP port
    pub port: u16,
    /// RTP payload type (dynamic range)
    pub payload_type: u8,
    /// Packet time in microseconds; AES67 interop mandates 1000
    pub packet_time_us: u32,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            label: "AES67 Sender".to_string(),
            description: String::new(),
            format: AudioFormat::default(),
            multicast_ip: Ipv4Addr::new(239, 69, 1, 1),
            port: 5004,
            payload_type: 97,
            packet_time_us: 1000,
        }
    }
}

impl SenderConfig {
    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `Aes67Error::InvalidConfig` naming the offending
    /// parameter.
    pub fn validate(&self) -> Result<()> {
        if !self.format.is_valid() {
            return Err(Aes67Error::InvalidConfig {
                parameter: "format",
                message: format!("channel count {} out of range", self.format.channels),
            });
        }
        if self.port == 0 {
            return Err(Aes67Error::InvalidConfig {
                parameter: "port",
                message: "port must be nonzero".to_string(),
            });
        }
        if self.payload_type > 127 {
            return Err(Aes67Error::InvalidConfig {
                parameter: "payload_type",
                message: format!("{} exceeds 7 bits", self.payload_type),
            });
        }
        if !VALID_PACKET_TIMES_US.contains(&self.packet_time_us) {
            return Err(Aes67Error::InvalidConfig {
                parameter: "packet_time_us",
                message: format!("{} us is outside the AES67 profile", self.packet_time_us),
            });
        }
        Ok(())
    }
}

/// Sender state machine
///
/// A transition to `Stopped` is permitted from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Not transmitting
    Stopped,
    /// Opening the socket and source
    Initializing,
    /// Transmitting packets
    Running,
    /// Failed; recoverable via stop/start
    Error,
}

impl SenderState {
    /// Human-readable state name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SenderState::Stopped => "Stopped",
            SenderState::Initializing => "Initializing",
            SenderState::Running => "Running",
            SenderState::Error => "Error",
        }
    }
}

/// Events emitted by a sender
#[derive(Debug, Clone)]
pub enum SenderEvent {
    /// State machine transition
    StateChanged {
        /// New state
        state: SenderState,
    },
}

/// Sender statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct SenderStatistics {
    /// Packets transmitted
    pub packets_sent: u64,
    /// Bytes transmitted (including RTP headers)
    pub bytes_sent: u64,
    /// Send failures, counted as underruns
    pub underruns: u64,
    /// Current 16-bit sequence counter
    pub sequence_number: u16,
    /// Current 32-bit RTP timestamp counter
    pub rtp_timestamp: u32,
    /// Derived transmit bitrate
    pub bitrate_kbps: f64,
    /// Age of the last transmitted packet
    pub last_packet_age: Option<Duration>,
}

/// Shared counters written from the capture callback
struct SenderCounters {
    packets_sent: AtomicU64,
    bytes_sent: AtomicU64,
    underruns: AtomicU64,
    sequence: AtomicU32,
    rtp_timestamp: AtomicU32,
    /// Nanoseconds since the session epoch; 0 = never
    last_packet_ns: AtomicU64,
    last_callback_ns: AtomicU64,
}

impl SenderCounters {
    fn new() -> Self {
        Self {
            packets_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            underruns: AtomicU64::new(0),
            sequence: AtomicU32::new(0),
            rtp_timestamp: AtomicU32::new(0),
            last_packet_ns: AtomicU64::new(0),
            last_callback_ns: AtomicU64::new(0),
        }
    }
}

struct SenderInner {
    config: SenderConfig,
    ssrc: u32,
    session_id: u64,
    origin_address: Mutex<Ipv4Addr>,
    state: Mutex<SenderState>,
    running: Arc<AtomicBool>,
    clock: Mutex<Option<MediaClock>>,
    source: Mutex<Option<Box<dyn AudioSource>>>,
    socket: Mutex<Option<Arc<UdpSocket>>>,
    counters: Arc<SenderCounters>,
    epoch: Instant,
    started_at: Mutex<Option<Instant>>,
    events: broadcast::Sender<SenderEvent>,
}

/// AES67 sender session
///
/// Owns exactly one outbound stream. Cheap to clone; clones share the
/// session.
#[derive(Clone)]
pub struct Aes67Sender {
    inner: Arc<SenderInner>,
}

impl Aes67Sender {
    /// Create a sender from a validated configuration
    ///
    /// The SSRC is random and fixed for the session lifetime.
    ///
    /// # Errors
    ///
    /// Returns `Aes67Error::InvalidConfig` for out-of-profile values.
    pub fn new(config: SenderConfig) -> Result<Self> {
        config.validate()?;

        let ssrc: u32 = rand::random();
        tracing::info!(
            id = %config.id,
            channels = config.format.channels,
            sample_rate = config.format.sample_rate.as_u32(),
            bits = config.format.bit_depth.bits(),
            dest = %format!("{}:{}", config.multicast_ip, config.port),
            "sender configured"
        );

        let (events, _) = broadcast::channel(16);

        Ok(Self {
            inner: Arc::new(SenderInner {
                config,
                ssrc,
                session_id: u64::from(rand::random::<u32>()),
                origin_address: Mutex::new(Ipv4Addr::UNSPECIFIED),
                state: Mutex::new(SenderState::Stopped),
                running: Arc::new(AtomicBool::new(false)),
                clock: Mutex::new(None),
                source: Mutex::new(None),
                socket: Mutex::new(None),
                counters: Arc::new(SenderCounters::new()),
                epoch: Instant::now(),
                started_at: Mutex::new(None),
                events,
            }),
        })
    }

    /// Attach the media clock used for RTP timestamp anchoring
    pub fn set_clock(&self, clock: MediaClock) {
        *self.inner.clock.lock().unwrap() = Some(clock);
    }

    /// Attach the audio capture source
    pub fn set_source(&self, source: Box<dyn AudioSource>) {
        *self.inner.source.lock().unwrap() = Some(source);
    }

    /// Set the origin address advertised in generated SDP
    pub fn set_origin_address(&self, address: Ipv4Addr) {
        *self.inner.origin_address.lock().unwrap() = address;
    }

    /// Subscribe to state-change events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SenderEvent> {
        self.inner.events.subscribe()
    }

    /// Stable identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    /// Human label
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.config.label
    }

    /// Session configuration
    #[must_use]
    pub fn config(&self) -> &SenderConfig {
        &self.inner.config
    }

    /// Session SSRC
    #[must_use]
    pub fn ssrc(&self) -> u32 {
        self.inner.ssrc
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SenderState {
        *self.inner.state.lock().unwrap()
    }

    /// Whether the sender is transmitting
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SenderState::Running
    }

    /// Start transmitting
    ///
    /// Opens the UDP socket with multicast TTL 32 and starts the audio
    /// source; each delivered capture buffer is sliced into packets and
    /// sent at cadence.
    ///
    /// # Errors
    ///
    /// Returns a transport error if socket setup fails, or a source
    /// error if the capture backend refuses to start. Either failure
    /// leaves the sender in `Error`.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.inner.state.lock().unwrap();
            if *state == SenderState::Running {
                return Ok(());
            }
            *state = SenderState::Initializing;
        }

        match self.start_inner() {
            Ok(()) => {
                self.set_state(SenderState::Running);
                tracing::info!(id = %self.inner.config.id, "sender started");
                Ok(())
            }
            Err(e) => {
                self.set_state(SenderState::Error);
                Err(e)
            }
        }
    }

    fn start_inner(&self) -> Result<()> {
        let config = &self.inner.config;

        let socket = UdpSocket::bind("0.0.0.0:0")
            .map_err(|e| Aes67Error::transport("failed to create sender socket", e))?;
        socket
            .set_multicast_ttl_v4(32)
            .map_err(|e| Aes67Error::transport("failed to set multicast TTL", e))?;
        socket
            .connect((config.multicast_ip, config.port))
            .map_err(|e| Aes67Error::transport("failed to set destination", e))?;
        let socket = Arc::new(socket);
        *self.inner.socket.lock().unwrap() = Some(socket.clone());

        let clock = self.inner.clock.lock().unwrap().clone();
        let mut packetizer = Packetizer::new(
            config.format,
            config.packet_time_us,
            config.payload_type,
            self.inner.ssrc,
            clock,
        );

        self.inner.running.store(true, Ordering::Release);
        *self.inner.started_at.lock().unwrap() = Some(Instant::now());

        let running = self.inner.running.clone();
        let counters = self.inner.counters.clone();
        let epoch = self.inner.epoch;
        let expected_frame_bytes = config.format.bytes_per_frame();

        let callback = Box::new(move |buffer: &CaptureBuffer| {
            if !running.load(Ordering::Acquire) {
                return;
            }

            let now_ns = epoch.elapsed().as_nanos() as u64;
            counters.last_callback_ns.store(now_ns, Ordering::Relaxed);

            if buffer.data.len() != buffer.frames * expected_frame_bytes {
                tracing::warn!(
                    bytes = buffer.data.len(),
                    frames = buffer.frames,
                    "capture buffer not frame-aligned"
                );
            }

            packetizer.packetize(buffer, |packet| {
                match socket.send(&packet) {
                    Ok(sent) => {
                        counters.packets_sent.fetch_add(1, Ordering::Relaxed);
                        counters.bytes_sent.fetch_add(sent as u64, Ordering::Relaxed);
                        counters.last_packet_ns.store(now_ns, Ordering::Relaxed);
                    }
                    Err(e) => {
                        // UDP semantics: no retry, count and move on.
                        counters.underruns.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(error = %e, "packet send failed");
                    }
                }
            });

            counters
                .sequence
                .store(u32::from(packetizer.sequence()), Ordering::Relaxed);
            counters
                .rtp_timestamp
                .store(packetizer.timestamp(), Ordering::Relaxed);
        });

        if let Some(source) = self.inner.source.lock().unwrap().as_mut() {
            source.open(config.format).map_err(|e| Aes67Error::InvalidConfig {
                parameter: "source",
                message: e.to_string(),
            })?;
            source.start(callback).map_err(|e| Aes67Error::InvalidConfig {
                parameter: "source",
                message: e.to_string(),
            })?;
        }

        Ok(())
    }

    /// Stop transmitting
    ///
    /// Permitted from any state; idempotent.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);

        if let Some(source) = self.inner.source.lock().unwrap().as_mut() {
            if let Err(e) = source.stop() {
                tracing::warn!(error = %e, "audio source failed to stop");
            }
        }

        *self.inner.socket.lock().unwrap() = None;
        *self.inner.started_at.lock().unwrap() = None;

        if self.state() != SenderState::Stopped {
            self.set_state(SenderState::Stopped);
            tracing::info!(id = %self.inner.config.id, "sender stopped");
        }
    }

    /// Generate the session description for this stream
    #[must_use]
    pub fn generate_sdp(&self) -> String {
        let config = &self.inner.config;
        let origin = self.inner.origin_address.lock().unwrap().to_string();
        let multicast = config.multicast_ip.to_string();

        sdp::generate(&SdpSessionParams {
            multicast_ip: &multicast,
            port: config.port,
            payload_type: config.payload_type,
            format: config.format,
            session_name: &config.label,
            session_id: self.inner.session_id,
            origin_address: &origin,
            packet_time_us: config.packet_time_us,
        })
    }

    /// Statistics snapshot
    #[must_use]
    pub fn statistics(&self) -> SenderStatistics {
        let counters = &self.inner.counters;
        let bytes_sent = counters.bytes_sent.load(Ordering::Relaxed);
        let last_packet_ns = counters.last_packet_ns.load(Ordering::Relaxed);

        let bitrate_kbps = self
            .inner
            .started_at
            .lock()
            .unwrap()
            .map_or(0.0, |started| {
                let elapsed = started.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    bytes_sent as f64 * 8.0 / elapsed / 1000.0
                } else {
                    0.0
                }
            });

        let last_packet_age = (last_packet_ns > 0).then(|| {
            let now_ns = self.inner.epoch.elapsed().as_nanos() as u64;
            Duration::from_nanos(now_ns.saturating_sub(last_packet_ns))
        });

        SenderStatistics {
            packets_sent: counters.packets_sent.load(Ordering::Relaxed),
            bytes_sent,
            underruns: counters.underruns.load(Ordering::Relaxed),
            sequence_number: counters.sequence.load(Ordering::Relaxed) as u16,
            rtp_timestamp: counters.rtp_timestamp.load(Ordering::Relaxed),
            bitrate_kbps,
            last_packet_age,
        }
    }

    /// Health check
    ///
    /// A stopped sender is healthy; a running sender is healthy while
    /// traffic flowed within the stall timeout.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        if self.state() != SenderState::Running {
            return true;
        }

        let last_ns = self
            .inner
            .counters
            .last_packet_ns
            .load(Ordering::Relaxed)
            .max(self.inner.counters.last_callback_ns.load(Ordering::Relaxed));
        if last_ns == 0 {
            // No traffic yet: fall back to time since start.
            return self
                .inner
                .started_at
                .lock()
                .unwrap()
                .is_some_and(|s| s.elapsed() < STALL_TIMEOUT);
        }

        let now_ns = self.inner.epoch.elapsed().as_nanos() as u64;
        Duration::from_nanos(now_ns.saturating_sub(last_ns)) < STALL_TIMEOUT
    }

    /// Stop/start recovery cycle with a short settle delay
    ///
    /// # Errors
    ///
    /// Returns the error from the restart attempt.
    pub fn recover(&self) -> Result<()> {
        tracing::info!(id = %self.inner.config.id, "attempting sender recovery");
        self.stop();
        std::thread::sleep(Duration::from_millis(100));
        self.start()
    }

    fn set_state(&self, state: SenderState) {
        *self.inner.state.lock().unwrap() = state;
        let _ = self.inner.events.send(SenderEvent::StateChanged { state });
    }
}

/// Non-owning handle to a sender, used by the control surface
///
/// The NMOS registry holds weak handles so engine lifetime stays with
/// the application; a dropped engine simply disappears from the API.
#[derive(Clone)]
pub struct WeakSender {
    inner: std::sync::Weak<SenderInner>,
}

impl Aes67Sender {
    /// Downgrade to a non-owning handle
    #[must_use]
    pub fn downgrade(&self) -> WeakSender {
        WeakSender {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl WeakSender {
    /// Recover the owning handle if the engine is still alive
    #[must_use]
    pub fn upgrade(&self) -> Option<Aes67Sender> {
        self.inner.upgrade().map(|inner| Aes67Sender { inner })
    }
}

impl std::fmt::Debug for Aes67Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aes67Sender")
            .field("id", &self.inner.config.id)
            .field("state", &self.state())
            .field("ssrc", &format_args!("0x{:08X}", self.inner.ssrc))
            .finish_non_exhaustive()
    }
}
