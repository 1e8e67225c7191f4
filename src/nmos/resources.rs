//! IS-04 resource views and IS-05 connection bodies

use serde::{Deserialize, Serialize};

/// Transport urn for multicast RTP streams
pub const TRANSPORT_RTP_MCAST: &str = "urn:x-nmos:transport:rtp.mcast";

/// Node API version served by this surface
pub const NODE_API_VERSION: &str = "v1.3";

/// Connection API version served by this surface
pub const CONNECTION_API_VERSION: &str = "v1.1";

fn default_rtp_enabled() -> bool {
    true
}

/// IS-05 transport parameters for one RTP leg
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportParams {
    /// Source filter address (sender origin)
    #[serde(default)]
    pub source_ip: String,
    /// Multicast group to subscribe to
    #[serde(default)]
    pub multicast_ip: String,
    /// Destination UDP port
    #[serde(default)]
    pub destination_port: u16,
    /// Source UDP port (informational)
    #[serde(default)]
    pub source_port: u16,
    /// Whether the RTP leg is enabled
    #[serde(default = "default_rtp_enabled")]
    pub rtp_enabled: bool,
    /// FEC mirror field; recorded, not acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fec_enabled: Option<bool>,
    /// RTCP mirror field; recorded, not acted on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rtcp_enabled: Option<bool>,
}

impl Default for TransportParams {
    fn default() -> Self {
        Self {
            source_ip: String::new(),
            multicast_ip: String::new(),
            destination_port: 0,
            source_port: 0,
            rtp_enabled: true,
            fec_enabled: None,
            rtcp_enabled: None,
        }
    }
}

/// IS-05 activation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Promote staged to active now
    ActivateImmediate,
    /// Promote at an absolute PTP wall-clock time
    ActivateScheduledAbsolute,
    /// Promote after a relative delay
    ActivateScheduledRelative,
}

/// Activation descriptor carried in a staged PATCH
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Activation {
    /// Requested mode; null clears a pending activation
    #[serde(default)]
    pub mode: Option<ActivationMode>,
    /// Schedule target, "seconds:nanoseconds" (TAI for absolute)
    #[serde(default)]
    pub requested_time: Option<String>,
    /// Time the activation was or will be performed
    #[serde(default)]
    pub activation_time: Option<String>,
}

/// PATCH body for `/single/receivers/{id}/staged`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StagedPatch {
    /// Sender this receiver is subscribed to
    #[serde(default)]
    pub sender_id: Option<String>,
    /// Master enable; false disconnects on activation
    #[serde(default)]
    pub master_enable: Option<bool>,
    /// Activation descriptor
    #[serde(default)]
    pub activation: Option<Activation>,
    /// One transport leg per element; AES67 receivers use one
    #[serde(default)]
    pub transport_params: Option<Vec<TransportParams>>,
    /// SDP transport file by value
    #[serde(default)]
    pub transport_file: Option<TransportFile>,
}

/// SDP transport file reference in a staged PATCH
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransportFile {
    /// Document body
    #[serde(default)]
    pub data: Option<String>,
    /// Media type; application/sdp is the only supported value
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
}

/// Staged or active connection state returned on GET
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionState {
    /// Subscribed sender, when known
    pub sender_id: Option<String>,
    /// Master enable
    pub master_enable: bool,
    /// Last activation descriptor
    pub activation: Activation,
    /// Transport legs
    pub transport_params: Vec<TransportParams>,
}

impl ConnectionState {
    /// Default state: one disabled leg with empty addresses
    #[must_use]
    pub fn empty() -> Self {
        Self {
            sender_id: None,
            master_enable: false,
            activation: Activation::default(),
            transport_params: vec![TransportParams::default()],
        }
    }
}

/// IS-04 sender or receiver summary
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    /// Resource UUID
    pub id: String,
    /// Human label
    pub label: String,
    /// Owning device UUID
    pub device_id: String,
    /// Transport urn
    pub transport: &'static str,
}

/// IS-04 node clock declaration
#[derive(Debug, Clone, Serialize)]
pub struct NodeClock {
    /// Clock name
    pub name: &'static str,
    /// Reference type
    pub ref_type: &'static str,
}

/// IS-04 node interface declaration
#[derive(Debug, Clone, Serialize)]
pub struct NodeInterface {
    /// Interface name
    pub name: String,
}

/// IS-04 `/self` resource
#[derive(Debug, Clone, Serialize)]
pub struct NodeSelf {
    /// Node UUID
    pub id: String,
    /// API version
    pub version: &'static str,
    /// Human label
    pub label: String,
    /// Free-form description
    pub description: String,
    /// Host name
    pub hostname: String,
    /// Supported API versions
    pub api: NodeApi,
    /// Services offered (none)
    pub services: Vec<serde_json::Value>,
    /// Clocks; AES67 nodes declare a PTP reference
    pub clocks: Vec<NodeClock>,
    /// Network interfaces
    pub interfaces: Vec<NodeInterface>,
}

/// IS-04 node API versions block
#[derive(Debug, Clone, Serialize)]
pub struct NodeApi {
    /// Supported versions
    pub versions: Vec<&'static str>,
}

/// NMOS error body
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// HTTP status code
    pub code: u16,
    /// Error description
    pub error: String,
    /// Debug detail
    pub debug: Option<String>,
}
