//! # aes67
//!
//! A pure Rust library for AES67 audio-over-IP endpoints.
//!
//! ## Features
//!
//! - RTP packetization of L16/L24/L32 linear PCM to multicast UDP
//! - PTP-derived RTP timestamps with free-running fallback
//! - Adaptive jitter buffer with timestamp reordering and paced playout
//! - SDP parsing and generation for the AES67 profile
//! - NMOS IS-04 discovery views and IS-05 staged/active connection
//!   management over HTTP
//!
//! ## Example
//!
//! ```rust,no_run
//! use aes67::{Aes67Receiver, NmosNode, ReceiverConfig};
//! use aes67::types::{NetworkConfig, NodeConfig};
//!
//! # async fn example() -> aes67::Result<()> {
//! let node = NmosNode::new(NodeConfig::default(), NetworkConfig::default());
//! let receiver = Aes67Receiver::new(ReceiverConfig::default());
//!
//! node.register_receiver(&receiver).await;
//! node.start().await?;
//!
//! // Receivers are now driven over the IS-05 connection API...
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::missing_errors_doc)]

// Public modules
/// Error types
pub mod error;
/// Core configuration types
pub mod types;

pub mod audio;
pub mod clock;
pub mod nmos;
pub mod receiver;
pub mod rtp;
pub mod sdp;
pub mod sender;
pub mod testing;

// Re-exports
pub use audio::{AudioFormat, AudioSink, AudioSource, BitDepth, SampleRate};
pub use clock::{LocalClock, MediaClock, PtpFollower, PtpState};
pub use error::{Aes67Error, Result};
pub use nmos::NmosNode;
pub use receiver::{Aes67Receiver, ReceiverConfig, ReceiverState, ReceiverStatistics};
pub use sender::{Aes67Sender, SenderConfig, SenderState, SenderStatistics};
