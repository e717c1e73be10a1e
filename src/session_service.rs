// session_service.rs
// Peer session manager and transfer orchestration
//
// The service owns the local identity for the lifetime of one session and
// drives everything that happens on its connections: inbound links are
// registered into the connection registry before they are surfaced, decoded
// frames feed the chat logs and the transfer ledger, and outbound sends walk
// their records through the ledger state machine.
//
// Concurrency model: one reader task per connection pumps raw link bytes
// into a single mpsc channel; one event-pump task serializes all
// network-originated mutations. Public methods and the pump only touch the
// shared application state under its mutex, so every update runs to
// completion before the next one is applied. Frames keep transport order
// per connection; interleaving across connections is arbitrary.

use crate::batch_transfer::{file_key, BatchCounts, BatchFile, BatchStatus, BatchTracker};
use crate::connection_registry::{ChatMessage, Connection, ConnectionRegistry};
use crate::download_paths;
use crate::error::HubError;
use crate::frame::Frame;
use crate::rendezvous::{Rendezvous, TransportLink};
use crate::transfer_ledger::{
    TransferDirection, TransferLedger, TransferRecord, TransferStatus,
};
use crate::transfer_search::{query, DirectionFilter};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the internal link-event channel feeding the pump.
const LINK_EVENT_CAPACITY: usize = 256;

/// Capacity of the outward session-event channel.
const SESSION_EVENT_CAPACITY: usize = 1024;

/// Session-level configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory received files are written to
    pub download_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            download_dir: download_paths::resolve_download_dir(None),
        }
    }
}

/// Application state owned by the composition root: each component below is
/// the single writer for its own entity.
#[derive(Debug, Default)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub ledger: TransferLedger,
    pub batch: BatchTracker,
}

/// Events surfaced to the embedding UI, one independently drainable stream.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    SessionStarted { peer_id: String },
    /// A remote peer dialed us; its connection is already registered.
    IncomingConnection { peer_id: String },
    /// An outbound connect completed and was registered.
    ConnectionOpened { peer_id: String },
    /// Remote close, transport error or local disconnect. Emitted exactly
    /// once per connection, after the registry entry is removed.
    ConnectionClosed { peer_id: String },
    MessageReceived { peer_id: String },
    FileReceived { peer_id: String, transfer_id: String },
    TransferCompleted { transfer_id: String },
    TransferFailed { transfer_id: String, error: String },
    SessionStopped,
}

/// Network-originated work serialized through the event pump.
#[derive(Debug)]
enum LinkEvent {
    Incoming { link: TransportLink },
    Data { remote_id: String, payload: Vec<u8> },
    Closed { remote_id: String },
}

/// A file staged for sending, held fully in memory (no chunking at this
/// layer; large files cost their full size on both ends).
#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub file_name: String,
    pub file_type: String,
    pub payload: Vec<u8>,
}

impl OutgoingFile {
    pub fn new(file_name: &str, file_type: &str, payload: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            payload,
        }
    }

    /// Read a file from disk, inferring the MIME type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, String> {
        let payload = tokio::fs::read(path)
            .await
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| format!("Path {:?} has no usable file name", path))?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        Ok(Self::new(file_name, mime_for_extension(extension), payload))
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Composite batch key for this file.
    pub fn key(&self) -> String {
        file_key(&self.file_name, self.size())
    }
}

/// Aggregate batch view handed to display logic.
#[derive(Debug, Clone)]
pub struct BatchOverview {
    pub overall_progress: f64,
    pub counts: BatchCounts,
}

/// The peer session: local identity, connection registry, transfer ledger
/// and batch tracker, all driven by one serializing event pump.
pub struct SessionService {
    peer_id: String,
    config: SessionConfig,
    rendezvous: Arc<dyn Rendezvous>,
    state: Arc<Mutex<AppState>>,
    link_tx: mpsc::Sender<LinkEvent>,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: Arc<Mutex<mpsc::Receiver<SessionEvent>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionService {
    /// Register with the rendezvous collaborator and start the session.
    /// Fails with `HubError::SessionStart` when the collaborator is
    /// unreachable or refuses; retry is the caller's decision.
    pub async fn start(
        rendezvous: Arc<dyn Rendezvous>,
        config: SessionConfig,
    ) -> Result<Self, HubError> {
        let registered = rendezvous.register().await?;
        let peer_id = registered.peer_id;
        let mut incoming = registered.incoming;
        info!("🛰️ Peer session started with identity {}", peer_id);

        let (link_tx, link_rx) = mpsc::channel(LINK_EVENT_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(SESSION_EVENT_CAPACITY);
        let state = Arc::new(Mutex::new(AppState::default()));

        // Forward inbound connection attempts into the pump.
        let accept_task = {
            let link_tx = link_tx.clone();
            tokio::spawn(async move {
                while let Some(attempt) = incoming.recv().await {
                    if link_tx
                        .send(LinkEvent::Incoming { link: attempt.link })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            })
        };

        let pump_task = tokio::spawn(Self::run_event_pump(
            link_rx,
            link_tx.clone(),
            event_tx.clone(),
            state.clone(),
            config.clone(),
        ));

        let _ = event_tx
            .send(SessionEvent::SessionStarted {
                peer_id: peer_id.clone(),
            })
            .await;

        Ok(Self {
            peer_id,
            config,
            rendezvous,
            state,
            link_tx,
            event_tx,
            event_rx: Arc::new(Mutex::new(event_rx)),
            tasks: Mutex::new(vec![accept_task, pump_task]),
        })
    }

    /// The identity the rendezvous collaborator assigned to this session.
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// Download directory in effect for received files.
    pub fn download_dir(&self) -> &Path {
        &self.config.download_dir
    }

    /// Next session event. Events are emitted after the state change they
    /// describe is already observable.
    pub async fn recv_event(&self) -> Option<SessionEvent> {
        self.event_rx.lock().await.recv().await
    }

    // ------------------------------------------------------------------
    // Connection lifecycle
    // ------------------------------------------------------------------

    /// Dial a remote peer through the rendezvous collaborator and register
    /// the connection. Connecting to an already-registered identity is a
    /// success (one connection per remote is kept). Timeout and refusal are
    /// surfaced from the collaborator as-is; no retry is performed here.
    pub async fn connect(&self, remote_id: &str) -> Result<(), HubError> {
        if remote_id == self.peer_id {
            return Err(HubError::ConnectionRefused {
                peer_id: remote_id.to_string(),
                reason: "cannot connect to own identity".to_string(),
            });
        }
        {
            let state = self.state.lock().await;
            if state.registry.contains(remote_id) {
                debug!("Already connected to {}", remote_id);
                return Ok(());
            }
        }

        let link = self.rendezvous.dial(&self.peer_id, remote_id).await?;
        let registered = {
            let mut state = self.state.lock().await;
            Self::attach_link(&mut state, &self.link_tx, link)
        };
        if registered {
            info!("Connected to peer {}", remote_id);
            let _ = self
                .event_tx
                .send(SessionEvent::ConnectionOpened {
                    peer_id: remote_id.to_string(),
                })
                .await;
        }
        Ok(())
    }

    /// Locally close one connection. Triggers the same removal path as a
    /// remote-initiated close.
    pub async fn disconnect(&self, remote_id: &str) {
        let removed = {
            let mut state = self.state.lock().await;
            state.registry.remove(remote_id).is_some()
        };
        if removed {
            info!("Disconnected from {}", remote_id);
            let _ = self
                .event_tx
                .send(SessionEvent::ConnectionClosed {
                    peer_id: remote_id.to_string(),
                })
                .await;
        }
    }

    /// Locally close every connection.
    pub async fn disconnect_all(&self) {
        let closed: Vec<Connection> = {
            let mut state = self.state.lock().await;
            state.registry.remove_all()
        };
        for connection in &closed {
            let _ = self
                .event_tx
                .send(SessionEvent::ConnectionClosed {
                    peer_id: connection.remote_id.clone(),
                })
                .await;
        }
    }

    /// Tear the session down: unregister from the rendezvous collaborator,
    /// close every connection and stop the background tasks. Best-effort;
    /// always succeeds.
    pub async fn stop(&self) {
        info!("Stopping peer session {}", self.peer_id);
        self.rendezvous.unregister(&self.peer_id).await;
        self.disconnect_all().await;
        let _ = self.event_tx.send(SessionEvent::SessionStopped).await;
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    pub async fn select(&self, remote_id: &str) {
        self.state.lock().await.registry.select(remote_id);
    }

    pub async fn selected(&self) -> Option<String> {
        self.state
            .lock()
            .await
            .registry
            .selected()
            .map(str::to_string)
    }

    pub async fn peers(&self) -> Vec<String> {
        self.state.lock().await.registry.peers().to_vec()
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    /// Append the message to the local chat log and hand it to the
    /// transport. The log is updated synchronously on dispatch; a transport
    /// failure is surfaced but never rolls the log back.
    pub async fn send_message(&self, remote_id: &str, text: &str) -> Result<(), HubError> {
        let mut state = self.state.lock().await;
        if !state.registry.contains(remote_id) {
            return Err(HubError::NotConnected(remote_id.to_string()));
        }
        state.registry.push_message(remote_id, ChatMessage::me(text));
        state
            .registry
            .send(
                remote_id,
                &Frame::Message {
                    text: text.to_string(),
                },
            )
            .await
    }

    /// Chat log for a peer, oldest first.
    pub async fn messages(&self, peer_id: &str) -> Vec<ChatMessage> {
        self.state.lock().await.registry.messages(peer_id).to_vec()
    }

    // ------------------------------------------------------------------
    // File transfer
    // ------------------------------------------------------------------

    /// Send one file. The ledger record moves pending -> sending ->
    /// completed/failed; the id of the created record is returned on
    /// success, and a failed send leaves the record failed with the error
    /// populated.
    pub async fn send_file(
        &self,
        remote_id: &str,
        file: OutgoingFile,
    ) -> Result<String, HubError> {
        let record = TransferRecord::new(
            &file.file_name,
            file.size(),
            &file.file_type,
            TransferDirection::Sent,
            remote_id,
        );
        let transfer_id = record.id.clone();
        {
            let mut state = self.state.lock().await;
            state.ledger.add(record);
        }
        self.transmit(remote_id, &transfer_id, file).await?;
        Ok(transfer_id)
    }

    /// Send a batch of files sequentially, tracking them in the batch view.
    /// Every file is staged (batch entry + pending ledger record) before the
    /// first send begins, so cancellation can still pull not-yet-started
    /// files out. A per-file failure is recorded and does not abort the
    /// rest of the batch. Returns the ids of the records that were sent
    /// (successfully or not).
    pub async fn send_files(&self, remote_id: &str, files: Vec<OutgoingFile>) -> Vec<String> {
        let mut staged: Vec<(OutgoingFile, String)> = Vec::new();
        {
            let mut state = self.state.lock().await;
            for file in files {
                let key = file.key();
                state
                    .batch
                    .add_file(BatchFile::new(&file.file_name, file.size()));
                state.batch.set_status(&key, BatchStatus::Pending);
                state.batch.set_progress(&key, 0);

                let record = TransferRecord::new(
                    &file.file_name,
                    file.size(),
                    &file.file_type,
                    TransferDirection::Sent,
                    remote_id,
                );
                let transfer_id = record.id.clone();
                state.ledger.add(record);
                staged.push((file, transfer_id));
            }
        }

        let mut sent = Vec::new();
        for (file, transfer_id) in staged {
            let key = file.key();
            let cancelled = {
                let state = self.state.lock().await;
                !state.batch.contains(&key)
            };
            if cancelled {
                debug!("Skipping cancelled batch file {}", key);
                continue;
            }
            let _ = self.transmit(remote_id, &transfer_id, file).await;
            sent.push(transfer_id);
        }
        sent
    }

    /// Remove a still-pending file from the batch and cancel its ledger
    /// record. Local bookkeeping only: an already-started or accepted send
    /// is not aborted and the peer is not signalled.
    pub async fn cancel_batch_file(&self, key: &str) -> bool {
        let mut state = self.state.lock().await;
        if !state.batch.cancel(key) {
            return false;
        }
        let pending_id = state
            .ledger
            .records()
            .iter()
            .find(|r| {
                r.direction == TransferDirection::Sent
                    && r.status == TransferStatus::Pending
                    && file_key(&r.file_name, r.file_size) == key
            })
            .map(|r| r.id.clone());
        if let Some(id) = pending_id {
            state.ledger.cancel(&id);
        }
        true
    }

    /// Reset the batch selection and both tracking maps together.
    pub async fn clear_batch(&self) {
        self.state.lock().await.batch.clear();
    }

    /// Aggregate progress/status over the current batch selection.
    pub async fn batch_overview(&self) -> BatchOverview {
        let state = self.state.lock().await;
        BatchOverview {
            overall_progress: state.batch.overall_progress(),
            counts: state.batch.counts(),
        }
    }

    // ------------------------------------------------------------------
    // Ledger queries
    // ------------------------------------------------------------------

    /// Snapshot of the ledger, most-recent-first.
    pub async fn transfers(&self) -> Vec<TransferRecord> {
        self.state.lock().await.ledger.records().to_vec()
    }

    /// Search the ledger; safe to call on every keystroke.
    pub async fn search_transfers(
        &self,
        text: &str,
        filter: DirectionFilter,
    ) -> Vec<TransferRecord> {
        let state = self.state.lock().await;
        query(state.ledger.records(), text, filter)
            .into_iter()
            .cloned()
            .collect()
    }

    pub async fn delete_transfer(&self, id: &str) {
        self.state.lock().await.ledger.delete(id);
    }

    pub async fn clear_history(&self) {
        self.state.lock().await.ledger.clear();
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Walk one staged record through sending -> completed/failed.
    async fn transmit(
        &self,
        remote_id: &str,
        transfer_id: &str,
        file: OutgoingFile,
    ) -> Result<(), HubError> {
        let key = file.key();
        let checksum = sha256_hex(&file.payload);
        let file_name = file.file_name.clone();
        let frame = Frame::File {
            file_name: file.file_name,
            file_type: file.file_type,
            payload: file.payload,
        };

        {
            let mut state = self.state.lock().await;
            state.ledger.begin_sending(transfer_id);
            if state.batch.contains(&key) {
                state.batch.set_status(&key, BatchStatus::Sending);
            }
        }

        let send_result = {
            let state = self.state.lock().await;
            state.registry.send(remote_id, &frame).await
        };

        match send_result {
            Ok(()) => {
                {
                    let mut state = self.state.lock().await;
                    state
                        .ledger
                        .complete(transfer_id, Some(checksum), None);
                    if state.batch.contains(&key) {
                        state.batch.set_status(&key, BatchStatus::Completed);
                        state.batch.set_progress(&key, 100);
                    }
                }
                info!("📤 Sent {} to {}", file_name, remote_id);
                let _ = self
                    .event_tx
                    .send(SessionEvent::TransferCompleted {
                        transfer_id: transfer_id.to_string(),
                    })
                    .await;
                Ok(())
            }
            Err(e) => {
                {
                    let mut state = self.state.lock().await;
                    state.ledger.fail(transfer_id, &e.to_string());
                    if state.batch.contains(&key) {
                        state.batch.set_status(&key, BatchStatus::Failed);
                    }
                }
                error!("Sending {} to {} failed: {}", file_name, remote_id, e);
                let _ = self
                    .event_tx
                    .send(SessionEvent::TransferFailed {
                        transfer_id: transfer_id.to_string(),
                        error: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    /// Register a link and start its reader. Returns false when the remote
    /// identity is already registered (the new link is dropped).
    fn attach_link(
        state: &mut AppState,
        link_tx: &mpsc::Sender<LinkEvent>,
        link: TransportLink,
    ) -> bool {
        let TransportLink {
            remote_id,
            outbound,
            mut inbound,
        } = link;

        if state.registry.contains(&remote_id) {
            warn!("Duplicate link for {}, dropping the new one", remote_id);
            return false;
        }

        let mut connection = Connection::open(&remote_id, outbound);
        let reader = {
            let link_tx = link_tx.clone();
            let remote_id = remote_id.clone();
            tokio::spawn(async move {
                while let Some(payload) = inbound.recv().await {
                    let event = LinkEvent::Data {
                        remote_id: remote_id.clone(),
                        payload,
                    };
                    if link_tx.send(event).await.is_err() {
                        return;
                    }
                }
                // Link drained: the remote side closed it.
                let _ = link_tx.send(LinkEvent::Closed { remote_id }).await;
            })
        };
        connection.reader = Some(reader);
        state.registry.register(connection)
    }

    /// Single serializing loop for all network-originated mutations.
    async fn run_event_pump(
        mut link_rx: mpsc::Receiver<LinkEvent>,
        link_tx: mpsc::Sender<LinkEvent>,
        event_tx: mpsc::Sender<SessionEvent>,
        state: Arc<Mutex<AppState>>,
        config: SessionConfig,
    ) {
        while let Some(event) = link_rx.recv().await {
            match event {
                LinkEvent::Incoming { link } => {
                    let peer_id = link.remote_id.clone();
                    let registered = {
                        let mut state = state.lock().await;
                        Self::attach_link(&mut state, &link_tx, link)
                    };
                    // The connection is registered (and selection derived)
                    // before anyone can observe the event.
                    if registered {
                        info!("Incoming connection: {}", peer_id);
                        let _ = event_tx
                            .send(SessionEvent::IncomingConnection { peer_id })
                            .await;
                    }
                }
                LinkEvent::Data { remote_id, payload } => {
                    Self::handle_link_data(&remote_id, payload, &event_tx, &state, &config).await;
                }
                LinkEvent::Closed { remote_id } => {
                    let removed = {
                        let mut state = state.lock().await;
                        state.registry.remove(&remote_id).is_some()
                    };
                    if removed {
                        info!("Connection closed: {}", remote_id);
                        let _ = event_tx
                            .send(SessionEvent::ConnectionClosed { peer_id: remote_id })
                            .await;
                    }
                }
            }
        }
    }

    /// Decode one delivered payload and apply it. Malformed frames are
    /// dropped and logged; the connection stays up and no record is created.
    async fn handle_link_data(
        remote_id: &str,
        payload: Vec<u8>,
        event_tx: &mpsc::Sender<SessionEvent>,
        state: &Arc<Mutex<AppState>>,
        config: &SessionConfig,
    ) {
        let frame = match Frame::decode(&payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping malformed frame from {}: {}", remote_id, e);
                return;
            }
        };

        match frame {
            Frame::Message { text } => {
                {
                    let mut state = state.lock().await;
                    state
                        .registry
                        .push_message(remote_id, ChatMessage::peer(&text));
                }
                debug!("Message from {}", remote_id);
                let _ = event_tx
                    .send(SessionEvent::MessageReceived {
                        peer_id: remote_id.to_string(),
                    })
                    .await;
            }
            Frame::File {
                file_name,
                file_type,
                payload,
            } => {
                info!(
                    "📥 Receiving {} ({} bytes) from {}",
                    file_name,
                    payload.len(),
                    remote_id
                );
                let record = TransferRecord::new(
                    &file_name,
                    payload.len() as u64,
                    &file_type,
                    TransferDirection::Received,
                    remote_id,
                );
                let transfer_id = record.id.clone();
                {
                    let mut state = state.lock().await;
                    state.ledger.add(record);
                }

                let checksum = sha256_hex(&payload);
                match download_paths::write_received_file(
                    &config.download_dir,
                    &file_name,
                    &payload,
                )
                .await
                {
                    Ok(path) => {
                        {
                            let mut state = state.lock().await;
                            state.ledger.complete(
                                &transfer_id,
                                Some(checksum),
                                Some(path.to_string_lossy().into_owned()),
                            );
                        }
                        let _ = event_tx
                            .send(SessionEvent::FileReceived {
                                peer_id: remote_id.to_string(),
                                transfer_id,
                            })
                            .await;
                    }
                    Err(e) => {
                        error!("Failed to persist {} from {}: {}", file_name, remote_id, e);
                        {
                            let mut state = state.lock().await;
                            state.ledger.fail(&transfer_id, &e);
                        }
                        let _ = event_tx
                            .send(SessionEvent::TransferFailed {
                                transfer_id,
                                error: e,
                            })
                            .await;
                    }
                }
            }
        }
    }
}

/// SHA-256 of a payload, hex encoded.
fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// MIME type from a file extension, octet-stream when unknown.
fn mime_for_extension(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain",
        "json" => "application/json",
        "zip" => "application/zip",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}
