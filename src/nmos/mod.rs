//! NMOS control surface
//!
//! IS-04 exposes read-only views of the node and its senders and
//! receivers; IS-05 mutates receiver connections through the staged and
//! active parameter tables with a two-phase commit.

mod http;
mod id;
mod node;
mod resources;

#[cfg(test)]
mod tests;

pub use id::{is_valid_uuid, uuid_v4};
pub use node::NmosNode;
pub use resources::{
    Activation, ActivationMode, ConnectionState, ErrorBody, NodeSelf, ResourceSummary,
    StagedPatch, TransportFile, TransportParams, CONNECTION_API_VERSION, NODE_API_VERSION,
    TRANSPORT_RTP_MCAST,
};
