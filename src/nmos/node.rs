//! NMOS node: resource registry and connection management
//!
//! The node is the sole authority for receiver connection state. Every
//! resource read and mutation is serialized by one lock covering the
//! sender map, receiver map, and the staged/active tables; an IS-05
//! activation promotes staged parameters to active inside that critical
//! section so observers never see a half-applied connection.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::clock::MediaClock;
use crate::error::{Aes67Error, Result};
use crate::nmos::http;
use crate::nmos::id::{is_valid_uuid, uuid_v4};
use crate::nmos::resources::{
    Activation, ActivationMode, ConnectionState, NodeApi, NodeClock, NodeInterface, NodeSelf,
    ResourceSummary, StagedPatch, TRANSPORT_RTP_MCAST,
};
use crate::receiver::{Aes67Receiver, WeakReceiver};
use crate::sdp::SdpParser;
use crate::sender::{Aes67Sender, WeakSender};
use crate::types::{NetworkConfig, NodeConfig};

/// Longest accepted scheduled-activation horizon
const MAX_SCHEDULE_HORIZON: Duration = Duration::from_secs(3600);

struct SenderEntry {
    summary: ResourceSummary,
    #[allow(dead_code)] // control surface keeps the handle for future IS-05 sender legs
    engine: WeakSender,
}

struct ReceiverEntry {
    summary: ResourceSummary,
    engine: WeakReceiver,
}

/// All registry state behind the single resource lock
#[derive(Default)]
struct Resources {
    senders: HashMap<String, SenderEntry>,
    receivers: HashMap<String, ReceiverEntry>,
    staged: HashMap<String, ConnectionState>,
    active: HashMap<String, ConnectionState>,
}

struct NodeInner {
    config: NodeConfig,
    network: NetworkConfig,
    node_id: String,
    device_id: String,
    resources: Mutex<Resources>,
    clock: StdMutex<Option<MediaClock>>,
    running: AtomicBool,
    shutdown: StdMutex<Option<mpsc::Sender<()>>>,
    server: StdMutex<Option<JoinHandle<()>>>,
    bound_addr: StdMutex<Option<SocketAddr>>,
}

/// NMOS node handle
///
/// Cheap to clone; clones share the node.
#[derive(Clone)]
pub struct NmosNode {
    inner: Arc<NodeInner>,
}

impl NmosNode {
    /// Create a node; ids are minted when the config leaves them empty
    #[must_use]
    pub fn new(config: NodeConfig, network: NetworkConfig) -> Self {
        let node_id = if is_valid_uuid(&config.id) {
            config.id.clone()
        } else {
            uuid_v4()
        };
        let device_id = uuid_v4();

        tracing::info!(label = %config.label, %node_id, %device_id, "NMOS node initialized");

        Self {
            inner: Arc::new(NodeInner {
                config,
                network,
                node_id,
                device_id,
                resources: Mutex::new(Resources::default()),
                clock: StdMutex::new(None),
                running: AtomicBool::new(false),
                shutdown: StdMutex::new(None),
                server: StdMutex::new(None),
                bound_addr: StdMutex::new(None),
            }),
        }
    }

    /// Attach the media clock used for scheduled activations
    pub fn set_clock(&self, clock: MediaClock) {
        *self.inner.clock.lock().unwrap() = Some(clock);
    }

    /// Node UUID
    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.inner.node_id
    }

    /// Device UUID owning the registered senders and receivers
    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.inner.device_id
    }

    /// Whether the HTTP surface is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Address the HTTP surface is bound to, once started
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.inner.bound_addr.lock().unwrap()
    }

    /// Base URL of the node API
    #[must_use]
    pub fn api_url(&self) -> String {
        let port = self
            .local_addr()
            .map_or(self.inner.network.node_port, |a| a.port());
        format!("http://localhost:{port}/x-nmos/node/v1.3")
    }

    /// Start the HTTP surface
    ///
    /// # Errors
    ///
    /// Returns a transport error when the listen port cannot be bound.
    pub async fn start(&self) -> Result<SocketAddr> {
        if self.is_running() {
            return self.local_addr().ok_or_else(|| Aes67Error::InvalidState {
                message: "running without a bound address".to_string(),
                current_state: "Running".to_string(),
            });
        }

        let listener = TcpListener::bind(("0.0.0.0", self.inner.network.node_port))
            .await
            .map_err(|e| Aes67Error::transport("failed to bind NMOS port", e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| Aes67Error::transport("failed to read bound address", e))?;

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        *self.inner.shutdown.lock().unwrap() = Some(shutdown_tx);
        *self.inner.bound_addr.lock().unwrap() = Some(addr);
        self.inner.running.store(true, Ordering::Release);

        let node = self.clone();
        let task = tokio::spawn(http::serve(node, listener, shutdown_rx));
        *self.inner.server.lock().unwrap() = Some(task);

        tracing::info!(port = addr.port(), "NMOS node started");
        Ok(addr)
    }

    /// Stop the HTTP surface; in-flight requests drain via socket close
    pub async fn stop(&self) {
        if !self.is_running() {
            return;
        }

        self.inner.running.store(false, Ordering::Release);
        if let Some(tx) = self.inner.shutdown.lock().unwrap().take() {
            let _ = tx.try_send(());
        }
        let task = self.inner.server.lock().unwrap().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        *self.inner.bound_addr.lock().unwrap() = None;
        tracing::info!("NMOS node stopped");
    }

    /// Register a sender, returning its resource id
    pub async fn register_sender(&self, sender: &Aes67Sender) -> String {
        let id = if is_valid_uuid(sender.id()) {
            sender.id().to_string()
        } else {
            uuid_v4()
        };

        let entry = SenderEntry {
            summary: ResourceSummary {
                id: id.clone(),
                label: sender.label().to_string(),
                device_id: self.inner.device_id.clone(),
                transport: TRANSPORT_RTP_MCAST,
            },
            engine: sender.downgrade(),
        };

        let mut resources = self.inner.resources.lock().await;
        resources.senders.insert(id.clone(), entry);
        tracing::info!(label = %sender.label(), %id, "registered sender");
        id
    }

    /// Remove a sender from the registry
    pub async fn unregister_sender(&self, sender_id: &str) {
        let mut resources = self.inner.resources.lock().await;
        resources.senders.remove(sender_id);
        tracing::info!(id = %sender_id, "unregistered sender");
    }

    /// Register a receiver, returning its resource id
    pub async fn register_receiver(&self, receiver: &Aes67Receiver) -> String {
        let id = if is_valid_uuid(receiver.id()) {
            receiver.id().to_string()
        } else {
            uuid_v4()
        };

        let entry = ReceiverEntry {
            summary: ResourceSummary {
                id: id.clone(),
                label: receiver.label().to_string(),
                device_id: self.inner.device_id.clone(),
                transport: TRANSPORT_RTP_MCAST,
            },
            engine: receiver.downgrade(),
        };

        let mut resources = self.inner.resources.lock().await;
        resources.receivers.insert(id.clone(), entry);
        resources
            .staged
            .entry(id.clone())
            .or_insert_with(ConnectionState::empty);
        resources
            .active
            .entry(id.clone())
            .or_insert_with(ConnectionState::empty);
        tracing::info!(label = %receiver.label(), %id, "registered receiver");
        id
    }

    /// Remove a receiver and its connection state from the registry
    pub async fn unregister_receiver(&self, receiver_id: &str) {
        let mut resources = self.inner.resources.lock().await;
        resources.receivers.remove(receiver_id);
        resources.staged.remove(receiver_id);
        resources.active.remove(receiver_id);
        tracing::info!(id = %receiver_id, "unregistered receiver");
    }

    /// IS-04 sender summaries
    pub async fn senders(&self) -> Vec<ResourceSummary> {
        let resources = self.inner.resources.lock().await;
        resources
            .senders
            .values()
            .map(|e| e.summary.clone())
            .collect()
    }

    /// IS-04 receiver summaries
    pub async fn receivers(&self) -> Vec<ResourceSummary> {
        let resources = self.inner.resources.lock().await;
        resources
            .receivers
            .values()
            .map(|e| e.summary.clone())
            .collect()
    }

    /// IS-04 `/self` resource
    #[must_use]
    pub fn self_resource(&self) -> NodeSelf {
        NodeSelf {
            id: self.inner.node_id.clone(),
            version: crate::nmos::resources::NODE_API_VERSION,
            label: self.inner.config.label.clone(),
            description: self.inner.config.description.clone(),
            hostname: self.inner.config.hostname.clone(),
            api: NodeApi {
                versions: vec!["v1.0", "v1.1", "v1.2", "v1.3"],
            },
            services: Vec::new(),
            clocks: vec![NodeClock {
                name: "clk0",
                ref_type: "ptp",
            }],
            interfaces: vec![NodeInterface {
                name: self.inner.network.interface.clone(),
            }],
        }
    }

    /// IS-05 staged parameters for a receiver
    ///
    /// # Errors
    ///
    /// Returns `Aes67Error::UnknownResource` for unregistered ids.
    pub async fn staged(&self, receiver_id: &str) -> Result<ConnectionState> {
        let resources = self.inner.resources.lock().await;
        if !resources.receivers.contains_key(receiver_id) {
            return Err(Aes67Error::UnknownResource(receiver_id.to_string()));
        }
        Ok(resources
            .staged
            .get(receiver_id)
            .cloned()
            .unwrap_or_else(ConnectionState::empty))
    }

    /// IS-05 active parameters for a receiver
    ///
    /// # Errors
    ///
    /// Returns `Aes67Error::UnknownResource` for unregistered ids.
    pub async fn active(&self, receiver_id: &str) -> Result<ConnectionState> {
        let resources = self.inner.resources.lock().await;
        if !resources.receivers.contains_key(receiver_id) {
            return Err(Aes67Error::UnknownResource(receiver_id.to_string()));
        }
        Ok(resources
            .active
            .get(receiver_id)
            .cloned()
            .unwrap_or_else(ConnectionState::empty))
    }

    /// Apply an IS-05 PATCH to a receiver's staged parameters
    ///
    /// Returns the HTTP status to report (200 for stores and immediate
    /// activations, 202 for scheduled ones) with the staged state.
    ///
    /// # Errors
    ///
    /// Returns `UnknownResource` for unregistered ids, `InvalidConfig`
    /// for malformed activation schedules, or `ActivationFailed` when
    /// an immediate promote cannot restart the receiver (active state
    /// is left unchanged and staged preserved for retry).
    pub async fn patch_staged(
        &self,
        receiver_id: &str,
        patch: StagedPatch,
    ) -> Result<(u16, ConnectionState)> {
        let mut resources = self.inner.resources.lock().await;
        if !resources.receivers.contains_key(receiver_id) {
            return Err(Aes67Error::UnknownResource(receiver_id.to_string()));
        }

        let mut staged = resources
            .staged
            .get(receiver_id)
            .cloned()
            .unwrap_or_else(ConnectionState::empty);

        // An SDP transport file supplies the transport parameters.
        if let Some(file) = &patch.transport_file {
            if let Some(data) = file.data.as_deref() {
                let info = SdpParser::parse(data);
                if !info.is_valid {
                    return Err(Aes67Error::InvalidSdp(
                        "transport file is not a usable SDP document".to_string(),
                    ));
                }
                if staged.transport_params.is_empty() {
                    staged.transport_params.push(Default::default());
                }
                let leg = &mut staged.transport_params[0];
                leg.multicast_ip = info.source_ip.clone();
                leg.destination_port = info.port;
            }
        }

        if let Some(params) = patch.transport_params {
            if let Some(first) = params.into_iter().next() {
                if staged.transport_params.is_empty() {
                    staged.transport_params.push(first);
                } else {
                    staged.transport_params[0] = first;
                }
            }
        }
        if let Some(sender_id) = patch.sender_id {
            staged.sender_id = Some(sender_id);
        }
        if let Some(enable) = patch.master_enable {
            staged.master_enable = enable;
        }

        let activation = patch.activation.unwrap_or_default();
        staged.activation = Activation {
            mode: activation.mode,
            requested_time: activation.requested_time.clone(),
            activation_time: None,
        };

        resources.staged.insert(receiver_id.to_string(), staged.clone());

        match activation.mode {
            None => Ok((200, staged)),
            Some(ActivationMode::ActivateImmediate) => {
                let activated = self.activate_locked(&mut resources, receiver_id).await?;
                Ok((200, activated))
            }
            Some(mode) => {
                let delay = self.schedule_delay(mode, activation.requested_time.as_deref())?;
                if delay > MAX_SCHEDULE_HORIZON {
                    return Err(Aes67Error::InvalidConfig {
                        parameter: "activation",
                        message: format!(
                            "requested time is {}s away, beyond the {}s horizon",
                            delay.as_secs(),
                            MAX_SCHEDULE_HORIZON.as_secs()
                        ),
                    });
                }

                let node = self.clone();
                let id = receiver_id.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let mut resources = node.inner.resources.lock().await;
                    if let Err(e) = node.activate_locked(&mut resources, &id).await {
                        tracing::warn!(receiver = %id, error = %e, "scheduled activation failed");
                    }
                });

                tracing::info!(
                    receiver = %receiver_id,
                    delay_ms = delay.as_millis() as u64,
                    "activation scheduled"
                );
                Ok((202, staged))
            }
        }
    }

    /// Promote staged parameters to active immediately
    ///
    /// # Errors
    ///
    /// As [`NmosNode::patch_staged`] for the activation step.
    pub async fn activate_receiver(&self, receiver_id: &str) -> Result<ConnectionState> {
        let mut resources = self.inner.resources.lock().await;
        self.activate_locked(&mut resources, receiver_id).await
    }

    /// The staged-to-active promote, under the resource lock
    ///
    /// Disconnect, apply, restart as one step. On failure the active
    /// table is untouched and staged preserved so the operator can fix
    /// and retry.
    async fn activate_locked(
        &self,
        resources: &mut Resources,
        receiver_id: &str,
    ) -> Result<ConnectionState> {
        let staged = resources
            .staged
            .get(receiver_id)
            .cloned()
            .unwrap_or_else(ConnectionState::empty);

        let receiver = resources
            .receivers
            .get(receiver_id)
            .and_then(|e| e.engine.upgrade())
            .ok_or_else(|| Aes67Error::UnknownResource(receiver_id.to_string()))?;

        if staged.master_enable {
            let default_leg = crate::nmos::resources::TransportParams::default();
            let leg = staged.transport_params.first().unwrap_or(&default_leg);
            let source = if leg.multicast_ip.is_empty() {
                &leg.source_ip
            } else {
                &leg.multicast_ip
            };
            let source_ip: Ipv4Addr = source.parse().map_err(|_| {
                Aes67Error::ActivationFailed(format!("bad transport address {source:?}"))
            })?;
            let format = receiver.audio_format().unwrap_or_default();

            receiver.disconnect().await;
            receiver
                .connect_to(source_ip, leg.destination_port, format)
                .map_err(|e| Aes67Error::ActivationFailed(e.to_string()))?;
            receiver
                .start()
                .await
                .map_err(|e| Aes67Error::ActivationFailed(e.to_string()))?;
        } else {
            receiver.disconnect().await;
        }

        let mut active = staged;
        active.activation.activation_time = Some(self.current_tai_string());
        resources
            .active
            .insert(receiver_id.to_string(), active.clone());
        resources
            .staged
            .insert(receiver_id.to_string(), active.clone());

        tracing::info!(
            receiver = %receiver_id,
            enabled = active.master_enable,
            "connection activated"
        );
        Ok(active)
    }

    /// Delay until a scheduled activation should fire
    fn schedule_delay(&self, mode: ActivationMode, requested: Option<&str>) -> Result<Duration> {
        let requested = requested.ok_or(Aes67Error::InvalidConfig {
            parameter: "activation",
            message: "scheduled activation requires requested_time".to_string(),
        })?;

        let (secs, nanos) = parse_tai(requested).ok_or_else(|| Aes67Error::InvalidConfig {
            parameter: "activation",
            message: format!("bad requested_time {requested:?}"),
        })?;

        match mode {
            ActivationMode::ActivateScheduledRelative => {
                Ok(Duration::new(secs, nanos))
            }
            ActivationMode::ActivateScheduledAbsolute => {
                let target_ns = secs as i64 * 1_000_000_000 + i64::from(nanos);
                let now_ns = self.wall_clock_ns();
                Ok(Duration::from_nanos(
                    (target_ns - now_ns).max(0) as u64,
                ))
            }
            ActivationMode::ActivateImmediate => Ok(Duration::ZERO),
        }
    }

    /// PTP wall-clock reading, falling back to system time
    fn wall_clock_ns(&self) -> i64 {
        if let Some(clock) = self.inner.clock.lock().unwrap().as_ref() {
            return clock.ptp_timestamp() as i64;
        }
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as i64)
    }

    fn current_tai_string(&self) -> String {
        let ns = self.wall_clock_ns().max(0);
        format!("{}:{}", ns / 1_000_000_000, ns % 1_000_000_000)
    }
}

impl std::fmt::Debug for NmosNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NmosNode")
            .field("node_id", &self.inner.node_id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Parse a "seconds:nanoseconds" timestamp string
fn parse_tai(s: &str) -> Option<(u64, u32)> {
    let (secs, nanos) = s.split_once(':')?;
    let secs = secs.parse::<u64>().ok()?;
    let nanos = nanos.parse::<u32>().ok()?;
    (nanos < 1_000_000_000).then_some((secs, nanos))
}

#[cfg(test)]
mod tests {
    use super::parse_tai;

    #[test]
    fn test_parse_tai() {
        assert_eq!(parse_tai("10:500000000"), Some((10, 500_000_000)));
        assert_eq!(parse_tai("0:0"), Some((0, 0)));
        assert_eq!(parse_tai("10"), None);
        assert_eq!(parse_tai("10:2000000000"), None);
        assert_eq!(parse_tai("x:y"), None);
    }
}
