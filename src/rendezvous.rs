// rendezvous.rs
// Rendezvous/signaling collaborator seam
//
// The rendezvous service assigns the local session its peer identity and
// brokers the initial handshake; everything after that flows peer-to-peer
// over the link it hands back. The link itself stands in for a peer data
// channel: a pair of ordered, reliable byte queues scoped to one session.
// This core imposes no connect or send timeout of its own - whatever error
// the collaborator raises is surfaced as-is.

use crate::error::HubError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

/// Capacity of each direction of a link's byte queue.
const LINK_CHANNEL_CAPACITY: usize = 64;

/// Capacity of a session's inbound-connection queue.
const INCOMING_CHANNEL_CAPACITY: usize = 16;

/// One live logical link to a remote peer: ordered, reliable, in-session
/// delivery in both directions. Dropping the outbound half closes the link
/// for the remote side.
#[derive(Debug)]
pub struct TransportLink {
    /// Identity of the peer on the other end
    pub remote_id: String,
    pub outbound: mpsc::Sender<Vec<u8>>,
    pub inbound: mpsc::Receiver<Vec<u8>>,
}

/// Notification of one inbound connection attempt.
#[derive(Debug)]
pub struct IncomingConnection {
    pub link: TransportLink,
}

/// Result of registering with the rendezvous collaborator.
#[derive(Debug)]
pub struct RegisteredSession {
    /// The identity assigned to this session
    pub peer_id: String,
    /// Stream of inbound connection attempts, one per remote dial
    pub incoming: mpsc::Receiver<IncomingConnection>,
}

/// The narrow interface this core needs from a signaling service.
#[async_trait]
pub trait Rendezvous: Send + Sync + 'static {
    /// Register the local session and obtain an assigned identity.
    async fn register(&self) -> Result<RegisteredSession, HubError>;

    /// Open a link to `remote_id`, delivering an incoming-connection
    /// notification to the remote session.
    async fn dial(&self, local_id: &str, remote_id: &str) -> Result<TransportLink, HubError>;

    /// Remove the session; subsequent dials to it are refused.
    async fn unregister(&self, peer_id: &str);
}

/// In-process rendezvous hub pairing sessions over channel-backed links.
/// Used by the demo binary and the integration tests; a networked relay
/// implements the same trait out of tree.
#[derive(Debug, Default, Clone)]
pub struct MemoryRendezvous {
    sessions: Arc<Mutex<HashMap<String, mpsc::Sender<IncomingConnection>>>>,
}

impl MemoryRendezvous {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Rendezvous for MemoryRendezvous {
    async fn register(&self) -> Result<RegisteredSession, HubError> {
        let peer_id = Uuid::new_v4().to_string();
        let (incoming_tx, incoming_rx) = mpsc::channel(INCOMING_CHANNEL_CAPACITY);

        self.sessions
            .lock()
            .await
            .insert(peer_id.clone(), incoming_tx);
        info!("Rendezvous registered session {}", peer_id);

        Ok(RegisteredSession {
            peer_id,
            incoming: incoming_rx,
        })
    }

    async fn dial(&self, local_id: &str, remote_id: &str) -> Result<TransportLink, HubError> {
        let remote_tx = {
            let sessions = self.sessions.lock().await;
            sessions.get(remote_id).cloned()
        };

        let Some(remote_tx) = remote_tx else {
            return Err(HubError::ConnectionRefused {
                peer_id: remote_id.to_string(),
                reason: "unknown peer id".to_string(),
            });
        };

        let (to_remote_tx, to_remote_rx) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        let (to_local_tx, to_local_rx) = mpsc::channel(LINK_CHANNEL_CAPACITY);

        let offer = IncomingConnection {
            link: TransportLink {
                remote_id: local_id.to_string(),
                outbound: to_local_tx,
                inbound: to_remote_rx,
            },
        };

        if remote_tx.send(offer).await.is_err() {
            // The remote registered but its session is gone.
            return Err(HubError::ConnectionRefused {
                peer_id: remote_id.to_string(),
                reason: "peer no longer accepting connections".to_string(),
            });
        }

        debug!("Rendezvous brokered link {} -> {}", local_id, remote_id);
        Ok(TransportLink {
            remote_id: remote_id.to_string(),
            outbound: to_remote_tx,
            inbound: to_local_rx,
        })
    }

    async fn unregister(&self, peer_id: &str) {
        if self.sessions.lock().await.remove(peer_id).is_some() {
            info!("Rendezvous unregistered session {}", peer_id);
        }
    }
}
