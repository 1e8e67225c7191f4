//! Node identity and network configuration
//!
//! Configuration is injected by the host process; nothing here reads
//! files or the environment.

use serde::{Deserialize, Serialize};

/// Node identity and metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node UUID; minted at startup when empty
    pub id: String,
    /// Human label
    pub label: String,
    /// Free-form description
    pub description: String,
    /// Host name advertised over IS-04
    pub hostname: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            label: "AES67 Node".to_string(),
            description: "AES67 audio-over-IP endpoint".to_string(),
            hostname: "aes67-node".to_string(),
        }
    }
}

impl NodeConfig {
    /// Create with a custom label
    pub fn with_label(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }
}

/// Network configuration for the control surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network interface name advertised over IS-04
    pub interface: String,
    /// PTP domain number
    pub ptp_domain: u8,
    /// TCP port for the NMOS HTTP APIs
    pub node_port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".to_string(),
            ptp_domain: 0,
            node_port: 8080,
        }
    }
}
