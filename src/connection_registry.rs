// connection_registry.rs
// Registry of live remote connections and per-peer chat state
//
// The registry is the sole owner of connection membership, list ordering,
// the single "selected" identity and the chat logs. Invariants:
//
// - at most one Connection per remote identity is registered at a time
// - the list keeps insertion order, duplicates forbidden
// - when the list is non-empty, `selected` is a member; registering the
//   first-ever identity selects it automatically
// - removing the selected identity re-selects the first remaining member,
//   or clears the selection when none remain
//
// No component outside the registry mutates this state directly.

use crate::error::HubError;
use crate::frame::Frame;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Lifecycle of one registered connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Handshake in flight, not yet usable for frames
    Connecting,
    /// Live link, frames may be sent
    Open,
    /// Torn down; kept only transiently during removal
    Closed,
}

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    Me,
    Peer,
}

/// One chat message; immutable once created, appended and never removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub text: String,
    pub sender: MessageSender,
    /// Unix epoch milliseconds
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn me(text: &str) -> Self {
        Self {
            text: text.to_string(),
            sender: MessageSender::Me,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn peer(text: &str) -> Self {
        Self {
            text: text.to_string(),
            sender: MessageSender::Peer,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

/// One live logical link to a remote identity
#[derive(Debug)]
pub struct Connection {
    pub remote_id: String,
    pub status: ConnectionStatus,
    /// Outbound half of the underlying link
    pub outbound: mpsc::Sender<Vec<u8>>,
    /// Reader task pumping the inbound half; aborted on local disconnect
    pub reader: Option<JoinHandle<()>>,
}

impl Connection {
    /// A connection is created open: registration happens on successful
    /// handshake.
    pub fn open(remote_id: &str, outbound: mpsc::Sender<Vec<u8>>) -> Self {
        Self {
            remote_id: remote_id.to_string(),
            status: ConnectionStatus::Open,
            outbound,
            reader: None,
        }
    }

    /// Stop pumping inbound data and mark the connection closed.
    pub fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.status = ConnectionStatus::Closed;
    }
}

/// Registry state: ordered identities, selection, chat logs, live links.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    order: Vec<String>,
    selected: Option<String>,
    messages: HashMap<String, Vec<ChatMessage>>,
    connections: HashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The first-ever identity becomes selected.
    /// Returns false (and drops nothing) when the identity is already
    /// registered - at most one Connection per remote is kept.
    pub fn register(&mut self, connection: Connection) -> bool {
        let remote_id = connection.remote_id.clone();
        if self.connections.contains_key(&remote_id) {
            warn!("Registry: {} is already registered, ignoring", remote_id);
            return false;
        }

        self.order.push(remote_id.clone());
        if self.order.len() == 1 {
            self.selected = Some(remote_id.clone());
        }
        self.connections.insert(remote_id.clone(), connection);
        debug!("Registry: registered {} ({} total)", remote_id, self.order.len());
        true
    }

    /// Remove an identity, closing its connection and re-deriving the
    /// selection: first remaining member, or none.
    pub fn remove(&mut self, remote_id: &str) -> Option<Connection> {
        let mut connection = self.connections.remove(remote_id)?;
        connection.close();
        self.order.retain(|id| id != remote_id);

        if self.selected.as_deref() == Some(remote_id) {
            self.selected = self.order.first().cloned();
        }
        debug!("Registry: removed {} ({} remain)", remote_id, self.order.len());
        Some(connection)
    }

    /// Drain every registered connection, closing each. Selection and list
    /// empty afterwards; chat logs are kept.
    pub fn remove_all(&mut self) -> Vec<Connection> {
        let ids: Vec<String> = self.order.clone();
        ids.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Set the selected identity. Selecting a non-member is ignored.
    pub fn select(&mut self, remote_id: &str) {
        if self.order.iter().any(|id| id == remote_id) {
            self.selected = Some(remote_id.to_string());
        } else {
            warn!("Registry: cannot select unregistered peer {}", remote_id);
        }
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Registered identities in insertion order.
    pub fn peers(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, remote_id: &str) -> bool {
        self.connections.contains_key(remote_id)
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Append a message to a peer's chat log.
    pub fn push_message(&mut self, peer_id: &str, message: ChatMessage) {
        self.messages
            .entry(peer_id.to_string())
            .or_default()
            .push(message);
    }

    /// Chat log for a peer, oldest first. Logs survive disconnect.
    pub fn messages(&self, peer_id: &str) -> &[ChatMessage] {
        self.messages
            .get(peer_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Encode and hand a frame to the transport for `remote_id`. Resolves
    /// once the transport accepts the payload; there is no delivery
    /// confirmation beyond acceptance.
    pub async fn send(&self, remote_id: &str, frame: &Frame) -> Result<(), HubError> {
        let connection = self
            .connections
            .get(remote_id)
            .filter(|c| c.status == ConnectionStatus::Open)
            .ok_or_else(|| HubError::NotConnected(remote_id.to_string()))?;

        let bytes = frame.encode().map_err(|e| HubError::SendFailed {
            peer_id: remote_id.to_string(),
            reason: format!("payload packaging failed: {}", e),
        })?;

        connection
            .outbound
            .send(bytes)
            .await
            .map_err(|_| HubError::SendFailed {
                peer_id: remote_id.to_string(),
                reason: "transport channel closed".to_string(),
            })
    }
}
