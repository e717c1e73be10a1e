// error.rs
// Error taxonomy for the transfer hub core
//
// Connection-scoped errors stay localized to one connection or transfer
// record and never tear down the session or other connections. Session-scoped
// errors are fatal to that start attempt only. No operation in this crate
// retries automatically; retry is the caller's decision.

use thiserror::Error;

/// Errors surfaced by the peer session, registry and frame layers
#[derive(Debug, Error)]
pub enum HubError {
    /// The rendezvous collaborator was unreachable or refused registration
    #[error("Failed to start peer session: {0}")]
    SessionStart(String),

    /// An outbound connection attempt timed out
    #[error("Connection to {peer_id} timed out")]
    ConnectionTimeout { peer_id: String },

    /// An outbound connection attempt was refused
    #[error("Connection to {peer_id} refused: {reason}")]
    ConnectionRefused { peer_id: String, reason: String },

    /// Send to a peer with no open registered connection
    #[error("No open connection to {0}")]
    NotConnected(String),

    /// The transport rejected a payload that was handed to it
    #[error("Send to {peer_id} failed: {reason}")]
    SendFailed { peer_id: String, reason: String },

    /// An inbound frame could not be decoded
    #[error("Malformed frame: {0}")]
    Decode(#[from] DecodeError),
}

/// Decode failure for an inbound frame. Malformed frames are dropped and
/// logged; the connection that delivered them is unaffected.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DecodeError(#[from] pub serde_json::Error);

impl HubError {
    /// Whether this error is scoped to a single connection or transfer,
    /// as opposed to the session start path.
    pub fn is_connection_scoped(&self) -> bool {
        !matches!(self, HubError::SessionStart(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_scoping() {
        let start = HubError::SessionStart("relay down".to_string());
        assert!(!start.is_connection_scoped());

        let refused = HubError::ConnectionRefused {
            peer_id: "p2".to_string(),
            reason: "unknown peer".to_string(),
        };
        assert!(refused.is_connection_scoped());
    }

    #[test]
    fn test_error_messages_name_the_peer() {
        let err = HubError::NotConnected("p9".to_string());
        assert!(err.to_string().contains("p9"));

        let err = HubError::SendFailed {
            peer_id: "p4".to_string(),
            reason: "channel closed".to_string(),
        };
        assert!(err.to_string().contains("p4"));
        assert!(err.to_string().contains("channel closed"));
    }
}
