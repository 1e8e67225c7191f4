//! AES67 receiver engine
//!
//! Joins the stream's multicast group, accepts RTP packets into the
//! jitter buffer, and drains them into the audio sink in timestamp
//! order. One task owns the network side, one the playout side; the
//! jitter buffer between them is the ordering authority.

mod socket;


use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::audio::format::AudioFormat;
use crate::audio::jitter::{JitterBuffer, JitterBufferConfig};
use crate::audio::sink::AudioSink;
use crate::clock::MediaClock;
use crate::error::{Aes67Error, Result};
use crate::rtp::RtpPacket;
use crate::sdp::{SdpInfo, SdpParser};

/// Receive poll timeout; stop requests are observed at this boundary
const POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Playout retry sleep when the jitter buffer has nothing to give
const DRAIN_SLEEP: Duration = Duration::from_micros(500);

/// Sessions are unhealthy after this long without a packet
const STALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Largest datagram the receive loop accepts
const MAX_DATAGRAM: usize = 65536;

/// Receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Stable identifier (UUID); minted on NMOS registration when empty
    pub id: String,
    /// Human label
    pub label: String,
    /// Free-form description
    pub description: String,
    /// Interface address for multicast joins; unspecified = default
    pub interface: Ipv4Addr,
    /// Target playout delay in milliseconds
    pub target_delay_ms: u32,
    /// Minimum playout delay in milliseconds
    pub min_delay_ms: u32,
    /// Maximum tolerated lateness in milliseconds
    pub max_delay_ms: u32,
    /// Jitter buffer packet bound
    pub max_packets: usize,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            label: "AES67 Receiver".to_string(),
            description: String::new(),
            interface: Ipv4Addr::UNSPECIFIED,
            target_delay_ms: 10,
            min_delay_ms: 5,
            max_delay_ms: 50,
            max_packets: 256,
        }
    }
}

/// Receiver state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// No connection parameters
    Stopped,
    /// Setting up the socket
    Initializing,
    /// Socket bound, stream not yet started
    Listening,
    /// Accepting packets and playing out
    Receiving,
    /// Failed; recoverable via stop/start
    Error,
}

impl ReceiverState {
    /// Human-readable state name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiverState::Stopped => "Stopped",
            ReceiverState::Initializing => "Initializing",
            ReceiverState::Listening => "Listening",
            ReceiverState::Receiving => "Receiving",
            ReceiverState::Error => "Error",
        }
    }
}

/// Events emitted by a receiver
#[derive(Debug, Clone)]
pub enum ReceiverEvent {
    /// State machine transition
    StateChanged {
        /// New state
        state: ReceiverState,
    },
}

/// Receiver statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct ReceiverStatistics {
    /// Packets accepted into the jitter buffer
    pub packets_received: u64,
    /// Bytes received, including headers
    pub bytes_received: u64,
    /// Packets counted as lost by the sequence heuristic
    pub packets_lost: u64,
    /// Late arrivals observed out of order
    pub packets_out_of_order: u64,
    /// Jitter buffer evictions
    pub overruns: u64,
    /// Last observed sequence number
    pub last_sequence_number: u16,
    /// Last observed RTP timestamp
    pub last_rtp_timestamp: u32,
    /// Jitter buffer fill level in [0, 1]
    pub buffer_level: f64,
    /// Dwell time of the current head packet, milliseconds
    pub latency_ms: f64,
    /// Derived receive bitrate
    pub bitrate_kbps: f64,
    /// Whether the attached clock reports PTP lock
    pub ptp_synchronized: bool,
    /// Age of the last received packet
    pub last_packet_age: Option<Duration>,
}

/// Counters written by the receive task
struct ReceiverCounters {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    packets_lost: AtomicU64,
    packets_out_of_order: AtomicU64,
    last_sequence: AtomicU32,
    last_timestamp: AtomicU32,
    /// Nanoseconds since the session epoch; 0 = never
    last_packet_ns: AtomicU64,
}

impl ReceiverCounters {
    fn new() -> Self {
        Self {
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_lost: AtomicU64::new(0),
            packets_out_of_order: AtomicU64::new(0),
            last_sequence: AtomicU32::new(0),
            last_timestamp: AtomicU32::new(0),
            last_packet_ns: AtomicU64::new(0),
        }
    }

    /// Sequence-gap loss heuristic
    ///
    /// Forward gaps within the signed 16-bit window count as losses;
    /// a late arrival is credited back against the loss count and
    /// recorded as out-of-order. Wraps and large reorders beyond the
    /// window are indistinguishable; acceptable at AES67 packet rates.
    fn track_sequence(&self, prev: &mut Option<u16>, seq: u16) {
        if let Some(last) = *prev {
            let diff = seq.wrapping_sub(last).wrapping_sub(1) as i16;
            if diff > 0 {
                self.packets_lost.fetch_add(diff as u64, Ordering::Relaxed);
            } else if diff < -1 {
                self.packets_out_of_order.fetch_add(1, Ordering::Relaxed);
                // The gap this packet fills was already counted.
                let _ = self.packets_lost.fetch_update(
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                    |v| Some(v.saturating_sub(1)),
                );
                // Keep the forward high-water mark.
                return;
            }
        }
        *prev = Some(seq);
    }
}

/// Connection parameters once established
#[derive(Debug, Clone)]
struct ConnectionParams {
    source_ip: Ipv4Addr,
    port: u16,
    format: AudioFormat,
}

struct ReceiverInner {
    config: ReceiverConfig,
    state: Mutex<ReceiverState>,
    running: Arc<AtomicBool>,
    connection: Mutex<Option<ConnectionParams>>,
    sdp_info: Mutex<Option<SdpInfo>>,
    socket: Mutex<Option<UdpSocket>>,
    jitter: Arc<Mutex<JitterBuffer>>,
    sink: Arc<Mutex<Option<Box<dyn AudioSink>>>>,
    clock: Mutex<Option<MediaClock>>,
    counters: Arc<ReceiverCounters>,
    epoch: Instant,
    started_at: Mutex<Option<Instant>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    events: broadcast::Sender<ReceiverEvent>,
}

/// AES67 receiver session
///
/// Owns at most one inbound stream at a time. Cheap to clone; clones
/// share the session.
#[derive(Clone)]
pub struct Aes67Receiver {
    inner: Arc<ReceiverInner>,
}

impl Aes67Receiver {
    /// Create a receiver from its configuration
    #[must_use]
    pub fn new(config: ReceiverConfig) -> Self {
        let jitter_config = JitterBufferConfig {
            target_delay_ms: config.target_delay_ms,
            min_delay_ms: config.min_delay_ms,
            max_delay_ms: config.max_delay_ms,
            max_packets: config.max_packets,
            sample_rate: 48000,
        };

        tracing::info!(id = %config.id, label = %config.label, "receiver configured");

        let (events, _) = broadcast::channel(16);

        Self {
            inner: Arc::new(ReceiverInner {
                config,
                state: Mutex::new(ReceiverState::Stopped),
                running: Arc::new(AtomicBool::new(false)),
                connection: Mutex::new(None),
                sdp_info: Mutex::new(None),
                socket: Mutex::new(None),
                jitter: Arc::new(Mutex::new(JitterBuffer::new(jitter_config))),
                sink: Arc::new(Mutex::new(None)),
                clock: Mutex::new(None),
                counters: Arc::new(ReceiverCounters::new()),
                epoch: Instant::now(),
                started_at: Mutex::new(None),
                tasks: Mutex::new(Vec::new()),
                events,
            }),
        }
    }

    /// Attach the audio playback sink
    pub fn set_sink(&self, sink: Box<dyn AudioSink>) {
        *self.inner.sink.lock().unwrap() = Some(sink);
    }

    /// Attach the media clock, used only for synchronization reporting
    pub fn set_clock(&self, clock: MediaClock) {
        *self.inner.clock.lock().unwrap() = Some(clock);
    }

    /// Subscribe to state-change events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ReceiverEvent> {
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
    pub fn config(&self) -> &ReceiverConfig {
        &self.inner.config
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> ReceiverState {
        *self.inner.state.lock().unwrap()
    }

    /// Whether a stream is being received
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == ReceiverState::Receiving
    }

    /// Whether connection parameters are in place
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connection.lock().unwrap().is_some()
    }

    /// Parsed SDP of the current connection, if connected via SDP
    #[must_use]
    pub fn sdp_info(&self) -> Option<SdpInfo> {
        self.inner.sdp_info.lock().unwrap().clone()
    }

    /// Audio format of the current connection
    #[must_use]
    pub fn audio_format(&self) -> Option<AudioFormat> {
        self.inner.connection.lock().unwrap().as_ref().map(|c| c.format)
    }

    /// Connect using a session description
    ///
    /// # Errors
    ///
    /// Returns `Aes67Error::InvalidSdp` when the document is missing
    /// required fields or declares an out-of-profile format, or a
    /// transport error when socket setup fails.
    pub fn connect(&self, sdp: &str) -> Result<()> {
        let info = SdpParser::parse(sdp);
        if !info.is_valid {
            return Err(Aes67Error::InvalidSdp(
                "missing source address, port, or rtpmap".to_string(),
            ));
        }

        let format = info.audio_format().ok_or_else(|| {
            Aes67Error::InvalidSdp(format!(
                "format {}/{}/{} outside the AES67 profile",
                info.encoding, info.sample_rate, info.channels
            ))
        })?;

        let source_ip: Ipv4Addr = info.source_ip.parse().map_err(|_| {
            Aes67Error::InvalidSdp(format!("bad source address {}", info.source_ip))
        })?;

        tracing::info!(
            id = %self.inner.config.id,
            source = %format!("{}:{}", info.source_ip, info.port),
            channels = format.channels,
            sample_rate = format.sample_rate.as_u32(),
            "parsed stream description"
        );

        let port = info.port;
        *self.inner.sdp_info.lock().unwrap() = Some(info);
        self.connect_internal(source_ip, port, format)
    }

    /// Connect with explicit transport parameters
    ///
    /// # Errors
    ///
    /// Returns a transport error when socket setup fails.
    pub fn connect_to(&self, source_ip: Ipv4Addr, port: u16, format: AudioFormat) -> Result<()> {
        *self.inner.sdp_info.lock().unwrap() = None;
        self.connect_internal(source_ip, port, format)
    }

    fn connect_internal(&self, source_ip: Ipv4Addr, port: u16, format: AudioFormat) -> Result<()> {
        if port == 0 {
            return Err(Aes67Error::InvalidConfig {
                parameter: "port",
                message: "port must be nonzero".to_string(),
            });
        }

        let socket = socket::bind_receive_socket(port, source_ip, self.inner.config.interface)
            .map_err(|e| Aes67Error::transport(format!("failed to bind port {port}"), e))?;

        *self.inner.socket.lock().unwrap() = Some(socket);
        *self.inner.connection.lock().unwrap() = Some(ConnectionParams {
            source_ip,
            port,
            format,
        });

        // Size the late window to the stream's actual rate.
        *self.inner.jitter.lock().unwrap() = JitterBuffer::new(JitterBufferConfig {
            target_delay_ms: self.inner.config.target_delay_ms,
            min_delay_ms: self.inner.config.min_delay_ms,
            max_delay_ms: self.inner.config.max_delay_ms,
            max_packets: self.inner.config.max_packets,
            sample_rate: format.sample_rate.as_u32(),
        });

        self.set_state(ReceiverState::Listening);
        tracing::info!(
            id = %self.inner.config.id,
            source = %format!("{source_ip}:{port}"),
            "receiver connected"
        );
        Ok(())
    }

    /// Tear down the connection and return to `Stopped`
    ///
    /// Idempotent.
    pub async fn disconnect(&self) {
        if self.state() == ReceiverState::Receiving {
            self.stop().await;
        }

        *self.inner.socket.lock().unwrap() = None;
        *self.inner.connection.lock().unwrap() = None;
        *self.inner.sdp_info.lock().unwrap() = None;

        if self.state() != ReceiverState::Stopped {
            self.set_state(ReceiverState::Stopped);
            tracing::info!(id = %self.inner.config.id, "receiver disconnected");
        }
    }

    /// Start receiving and playing out
    ///
    /// # Errors
    ///
    /// Returns `Aes67Error::NotConnected` without connection
    /// parameters, or a config error when the sink refuses the format.
    pub async fn start(&self) -> Result<()> {
        let connection = self
            .inner
            .connection
            .lock()
            .unwrap()
            .clone()
            .ok_or(Aes67Error::NotConnected)?;

        if self.state() == ReceiverState::Receiving {
            return Ok(());
        }
        self.set_state(ReceiverState::Initializing);

        match self.start_inner(&connection) {
            Ok(()) => {
                self.set_state(ReceiverState::Receiving);
                tracing::info!(id = %self.inner.config.id, "receiver started");
                Ok(())
            }
            Err(e) => {
                self.inner.running.store(false, Ordering::Release);
                self.set_state(ReceiverState::Error);
                Err(e)
            }
        }
    }

    fn start_inner(&self, connection: &ConnectionParams) -> Result<()> {
        {
            let mut sink = self.inner.sink.lock().unwrap();
            if let Some(sink) = sink.as_mut() {
                sink.open(connection.format)
                    .map_err(|e| Aes67Error::InvalidConfig {
                        parameter: "sink",
                        message: e.to_string(),
                    })?;
                sink.start().map_err(|e| Aes67Error::InvalidConfig {
                    parameter: "sink",
                    message: e.to_string(),
                })?;
            }
        }

        let std_socket = self
            .inner
            .socket
            .lock()
            .unwrap()
            .as_ref()
            .ok_or(Aes67Error::NotConnected)?
            .try_clone()
            .map_err(|e| Aes67Error::transport("failed to clone receive socket", e))?;

        let socket = tokio::net::UdpSocket::from_std(std_socket)
            .map_err(|e| Aes67Error::transport("failed to register socket", e))?;

        self.inner.running.store(true, Ordering::Release);
        *self.inner.started_at.lock().unwrap() = Some(Instant::now());

        let expected_payload = connection
            .format
            .bytes_per_frame();

        let receive = tokio::spawn(receive_loop(
            socket,
            self.inner.running.clone(),
            self.inner.jitter.clone(),
            self.inner.counters.clone(),
            self.inner.epoch,
            expected_payload,
        ));
        let playout = tokio::spawn(playout_loop(
            self.inner.running.clone(),
            self.inner.jitter.clone(),
            self.inner.sink.clone(),
        ));

        let mut tasks = self.inner.tasks.lock().unwrap();
        tasks.push(receive);
        tasks.push(playout);

        Ok(())
    }

    /// Stop receiving, returning to `Listening`
    ///
    /// Worker tasks observe the stop at the next poll boundary.
    pub async fn stop(&self) {
        if self.state() != ReceiverState::Receiving {
            return;
        }

        self.inner.running.store(false, Ordering::Release);

        let tasks = std::mem::take(&mut *self.inner.tasks.lock().unwrap());
        for task in tasks {
            let _ = task.await;
        }

        if let Some(sink) = self.inner.sink.lock().unwrap().as_mut() {
            if let Err(e) = sink.stop() {
                tracing::warn!(error = %e, "audio sink failed to stop");
            }
        }

        self.inner.jitter.lock().unwrap().reset();
        *self.inner.started_at.lock().unwrap() = None;

        self.set_state(ReceiverState::Listening);
        tracing::info!(id = %self.inner.config.id, "receiver stopped");
    }

    /// Statistics snapshot
    #[must_use]
    pub fn statistics(&self) -> ReceiverStatistics {
        let counters = &self.inner.counters;
        let bytes_received = counters.bytes_received.load(Ordering::Relaxed);
        let last_packet_ns = counters.last_packet_ns.load(Ordering::Relaxed);

        let (buffer_level, latency_ms, overruns) = {
            let jitter = self.inner.jitter.lock().unwrap();
            (jitter.level(), jitter.latency_ms(), jitter.stats().overruns)
        };

        let bitrate_kbps = self
            .inner
            .started_at
            .lock()
            .unwrap()
            .map_or(0.0, |started| {
                let elapsed = started.elapsed().as_secs_f64();
                if elapsed > 0.0 {
                    bytes_received as f64 * 8.0 / elapsed / 1000.0
                } else {
                    0.0
                }
            });

        let last_packet_age = (last_packet_ns > 0).then(|| {
            let now_ns = self.inner.epoch.elapsed().as_nanos() as u64;
            Duration::from_nanos(now_ns.saturating_sub(last_packet_ns))
        });

        ReceiverStatistics {
            packets_received: counters.packets_received.load(Ordering::Relaxed),
            bytes_received,
            packets_lost: counters.packets_lost.load(Ordering::Relaxed),
            packets_out_of_order: counters.packets_out_of_order.load(Ordering::Relaxed),
            overruns,
            last_sequence_number: counters.last_sequence.load(Ordering::Relaxed) as u16,
            last_rtp_timestamp: counters.last_timestamp.load(Ordering::Relaxed),
            buffer_level,
            latency_ms,
            bitrate_kbps,
            ptp_synchronized: self
                .inner
                .clock
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(MediaClock::is_synchronized),
            last_packet_age,
        }
    }

    /// Health check
    ///
    /// Healthy when stopped or listening; while receiving, healthy only
    /// with a packet arrival inside the stall timeout.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        if self.state() != ReceiverState::Receiving {
            return true;
        }

        let last_ns = self.inner.counters.last_packet_ns.load(Ordering::Relaxed);
        if last_ns == 0 {
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
    pub async fn recover(&self) -> Result<()> {
        tracing::info!(id = %self.inner.config.id, "attempting receiver recovery");
        self.stop().await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        self.start().await
    }

    fn set_state(&self, state: ReceiverState) {
        *self.inner.state.lock().unwrap() = state;
        let _ = self.inner.events.send(ReceiverEvent::StateChanged { state });
    }
}

/// Non-owning handle to a receiver, used by the control surface
#[derive(Clone)]
pub struct WeakReceiver {
    inner: std::sync::Weak<ReceiverInner>,
}

impl Aes67Receiver {
    /// Downgrade to a non-owning handle
    #[must_use]
    pub fn downgrade(&self) -> WeakReceiver {
        WeakReceiver {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl WeakReceiver {
    /// Recover the owning handle if the engine is still alive
    #[must_use]
    pub fn upgrade(&self) -> Option<Aes67Receiver> {
        self.inner.upgrade().map(|inner| Aes67Receiver { inner })
    }
}

impl std::fmt::Debug for Aes67Receiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aes67Receiver")
            .field("id", &self.inner.config.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Network receive loop: parse, classify, buffer
async fn receive_loop(
    socket: tokio::net::UdpSocket,
    running: Arc<AtomicBool>,
    jitter: Arc<Mutex<JitterBuffer>>,
    counters: Arc<ReceiverCounters>,
    epoch: Instant,
    bytes_per_frame: usize,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut prev_sequence: Option<u16> = None;

    while running.load(Ordering::Acquire) {
        let received = match tokio::time::timeout(POLL_TIMEOUT, socket.recv_from(&mut buf)).await {
            Err(_) => continue, // poll timeout, re-check running
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "receive failed");
                continue;
            }
            Ok(Ok((len, _src))) => len,
        };

        let packet = match RtpPacket::decode(&buf[..received]) {
            Ok(packet) => packet,
            Err(e) => {
                tracing::debug!(error = %e, len = received, "dropping unparseable packet");
                continue;
            }
        };

        if bytes_per_frame > 0 && packet.payload.len() % bytes_per_frame != 0 {
            tracing::debug!(
                len = packet.payload.len(),
                "dropping payload not a whole number of frames"
            );
            continue;
        }

        let header = packet.header;
        let now = Instant::now();
        jitter.lock().unwrap().push(
            Bytes::from(packet.payload),
            header.sequence,
            header.timestamp,
            now,
        );

        counters.packets_received.fetch_add(1, Ordering::Relaxed);
        counters
            .bytes_received
            .fetch_add(received as u64, Ordering::Relaxed);
        counters
            .last_sequence
            .store(u32::from(header.sequence), Ordering::Relaxed);
        counters
            .last_timestamp
            .store(header.timestamp, Ordering::Relaxed);
        counters
            .last_packet_ns
            .store(epoch.elapsed().as_nanos() as u64, Ordering::Relaxed);
        counters.track_sequence(&mut prev_sequence, header.sequence);
    }
}

/// Playout loop: drain the jitter buffer into the sink
///
/// The sink's back-pressure paces this loop; when it refuses bytes the
/// write stalls, and when the buffer is empty the loop sleeps briefly.
async fn playout_loop(
    running: Arc<AtomicBool>,
    jitter: Arc<Mutex<JitterBuffer>>,
    sink: Arc<Mutex<Option<Box<dyn AudioSink>>>>,
) {
    while running.load(Ordering::Acquire) {
        let packet = jitter.lock().unwrap().pop(Instant::now());

        let Some(packet) = packet else {
            tokio::time::sleep(DRAIN_SLEEP).await;
            continue;
        };

        let mut offset = 0;
        while offset < packet.payload.len() && running.load(Ordering::Acquire) {
            let accepted = match sink.lock().unwrap().as_mut() {
                Some(sink) => sink.write(&packet.payload[offset..]),
                None => packet.payload.len() - offset, // no sink: discard
            };

            offset += accepted;
            if accepted == 0 {
                tokio::time::sleep(DRAIN_SLEEP).await;
            }
        }
    }
}
