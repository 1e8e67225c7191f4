use std::io;
use thiserror::Error;

/// Errors that can occur in AES67 operations
#[derive(Debug, Error)]
pub enum Aes67Error {
    // ===== Configuration Errors =====
    /// Invalid configuration value
    #[error("invalid configuration: {parameter} - {message}")]
    InvalidConfig {
        /// The offending parameter
        parameter: &'static str,
        /// Description of the problem
        message: String,
    },

    /// Required identity is missing
    #[error("missing identity: {0}")]
    MissingIdentity(&'static str),

    // ===== Transport Errors =====
    /// Socket creation, bind, or multicast join failed
    #[error("transport error: {message}")]
    Transport {
        /// Description of the failure
        message: String,
        /// The underlying source of the error
        #[source]
        source: Option<io::Error>,
    },

    // ===== Format Errors =====
    /// Payload size inconsistent with the declared audio format
    #[error("format mismatch: {message}")]
    FormatMismatch {
        /// Description of the mismatch
        message: String,
    },

    /// SDP document rejected
    #[error("invalid SDP: {0}")]
    InvalidSdp(String),

    // ===== State Errors =====
    /// Operation not valid in current state
    #[error("invalid state: {message} (current: {current_state})")]
    InvalidState {
        /// Description of why the state is invalid
        message: String,
        /// The current state
        current_state: String,
    },

    /// Receiver has no connection parameters
    #[error("not connected")]
    NotConnected,

    // ===== Control Errors =====
    /// NMOS request references an unknown resource
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// Connection activation failed; previous active parameters preserved
    #[error("activation failed: {0}")]
    ActivationFailed(String),

    // ===== I/O Errors =====
    /// Network I/O error
    #[error("network error: {0}")]
    Network(#[from] io::Error),
}

impl Aes67Error {
    /// Convenience constructor for transport failures wrapping an I/O error
    #[must_use]
    pub fn transport(message: impl Into<String>, source: io::Error) -> Self {
        Self::Transport {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Check if this error is recoverable by a stop/start cycle
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Network(_))
    }
}

/// Result type alias for AES67 operations
pub type Result<T> = std::result::Result<T, Aes67Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Aes67Error::UnknownResource("abc-123".to_string());
        assert_eq!(err.to_string(), "unknown resource: abc-123");
    }

    #[test]
    fn test_error_is_recoverable() {
        let io_err = io::Error::new(io::ErrorKind::AddrInUse, "in use");
        assert!(Aes67Error::transport("bind failed", io_err).is_recoverable());

        let cfg = Aes67Error::InvalidConfig {
            parameter: "sample_rate",
            message: "unsupported".to_string(),
        };
        assert!(!cfg.is_recoverable());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: Aes67Error = io_err.into();
        assert!(matches!(err, Aes67Error::Network(_)));
    }

    #[test]
    fn test_error_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Aes67Error>();
    }
}
