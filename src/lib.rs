//! Transfer Hub core
//!
//! Peer-to-peer file sharing and chat, gated by an on-chain permission
//! check. Two sessions discover each other through a rendezvous
//! collaborator, then exchange chat messages and whole files directly over
//! per-peer links. This crate is the connection and transfer-orchestration
//! core: the local session, the connection registry, the frame protocol
//! multiplexing chat and file payloads, the transfer ledger, the batch
//! tracker and the search index. Signaling relays, wallets and rendering
//! live outside it.

pub mod batch_transfer;
pub mod connection_registry;
pub mod download_paths;
pub mod error;
pub mod frame;
pub mod permission;
pub mod rendezvous;
pub mod session_service;
pub mod transfer_ledger;
pub mod transfer_search;

pub use batch_transfer::{file_key, BatchCounts, BatchFile, BatchStatus, BatchTracker};
pub use connection_registry::{
    ChatMessage, Connection, ConnectionRegistry, ConnectionStatus, MessageSender,
};
pub use error::{DecodeError, HubError};
pub use frame::Frame;
pub use permission::{connection_permitted, PermissionError, PermissionOracle, PermissionTable};
pub use rendezvous::{
    IncomingConnection, MemoryRendezvous, RegisteredSession, Rendezvous, TransportLink,
};
pub use session_service::{
    AppState, BatchOverview, OutgoingFile, SessionConfig, SessionEvent, SessionService,
};
pub use transfer_ledger::{
    TransferDirection, TransferLedger, TransferRecord, TransferStatus, TransferUpdate,
};
pub use transfer_search::{query, DirectionFilter};
