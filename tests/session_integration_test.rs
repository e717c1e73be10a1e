// session_integration_test.rs
// End-to-end tests for the peer session over the in-memory rendezvous
//
// Tests cover:
// - Session start and identity assignment
// - Incoming connections being registered before their event is observable
// - Chat logs updated synchronously on dispatch
// - Selection invariants under connect/disconnect churn
// - Exactly-once close notification, local and remote initiated
// - Connection errors surfaced unchanged from the collaborator

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use transfer_hub::{
    HubError, MemoryRendezvous, MessageSender, RegisteredSession, Rendezvous, SessionConfig,
    SessionEvent, SessionService, TransportLink,
};

async fn wait_for_event<F>(service: &SessionService, mut matches: F) -> SessionEvent
where
    F: FnMut(&SessionEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = service.recv_event().await.expect("event channel closed");
            if matches(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

fn test_config(tmp: &tempfile::TempDir) -> SessionConfig {
    SessionConfig {
        download_dir: tmp.path().to_path_buf(),
    }
}

#[tokio::test]
async fn test_sessions_get_distinct_identities() {
    let hub = Arc::new(MemoryRendezvous::new());
    let tmp = tempfile::TempDir::new().unwrap();

    let p1 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();
    let p2 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();

    assert!(!p1.peer_id().is_empty());
    assert_ne!(p1.peer_id(), p2.peer_id());

    p1.stop().await;
    p2.stop().await;
}

#[tokio::test]
async fn test_incoming_connection_is_registered_before_event() {
    let hub = Arc::new(MemoryRendezvous::new());
    let tmp = tempfile::TempDir::new().unwrap();

    let p1 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();
    let p2 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();

    p1.connect(p2.peer_id()).await.unwrap();

    let event = wait_for_event(&p2, |e| matches!(e, SessionEvent::IncomingConnection { .. })).await;
    let SessionEvent::IncomingConnection { peer_id } = event else {
        unreachable!()
    };
    assert_eq!(peer_id, p1.peer_id());

    // By the time the event is observable the registry already holds the
    // connection, with the first-ever identity auto-selected.
    assert_eq!(p2.peers().await, vec![p1.peer_id().to_string()]);
    assert_eq!(p2.selected().await.as_deref(), Some(p1.peer_id()));

    p1.stop().await;
    p2.stop().await;
}

#[tokio::test]
async fn test_chat_log_updates_synchronously_on_dispatch() {
    let hub = Arc::new(MemoryRendezvous::new());
    let tmp = tempfile::TempDir::new().unwrap();

    let p1 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();
    let p2 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();

    p1.connect(p2.peer_id()).await.unwrap();
    p1.send_message(p2.peer_id(), "hi").await.unwrap();

    // The sender's log gains the entry on dispatch, before any transport
    // round trip is observed.
    let log = p1.messages(p2.peer_id()).await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].text, "hi");
    assert_eq!(log[0].sender, MessageSender::Me);
    assert!(log[0].timestamp > 0);

    // The receiver sees the same text attributed to the peer.
    wait_for_event(&p2, |e| matches!(e, SessionEvent::MessageReceived { .. })).await;
    let log = p2.messages(p1.peer_id()).await;
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].text, "hi");
    assert_eq!(log[0].sender, MessageSender::Peer);

    p1.stop().await;
    p2.stop().await;
}

#[tokio::test]
async fn test_message_to_unknown_peer_is_not_connected() {
    let hub = Arc::new(MemoryRendezvous::new());
    let tmp = tempfile::TempDir::new().unwrap();
    let p1 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();

    let err = p1.send_message("nobody", "hi").await.unwrap_err();
    assert!(matches!(err, HubError::NotConnected(_)));
    assert!(p1.messages("nobody").await.is_empty());

    p1.stop().await;
}

#[tokio::test]
async fn test_selection_follows_disconnects() {
    let hub = Arc::new(MemoryRendezvous::new());
    let tmp = tempfile::TempDir::new().unwrap();

    let p1 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();
    let p2 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();
    let p3 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();

    p1.connect(p2.peer_id()).await.unwrap();
    p1.connect(p3.peer_id()).await.unwrap();
    assert_eq!(p1.selected().await.as_deref(), Some(p2.peer_id()));

    p1.select(p3.peer_id()).await;
    assert_eq!(p1.selected().await.as_deref(), Some(p3.peer_id()));

    // Removing the selected identity re-selects the first remaining one.
    p1.disconnect(p3.peer_id()).await;
    assert_eq!(p1.selected().await.as_deref(), Some(p2.peer_id()));

    p1.disconnect(p2.peer_id()).await;
    assert_eq!(p1.selected().await, None);
    assert!(p1.peers().await.is_empty());

    p1.stop().await;
    p2.stop().await;
    p3.stop().await;
}

#[tokio::test]
async fn test_remote_disconnect_closes_exactly_once() {
    let hub = Arc::new(MemoryRendezvous::new());
    let tmp = tempfile::TempDir::new().unwrap();

    let p1 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();
    let p2 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();

    p1.connect(p2.peer_id()).await.unwrap();
    wait_for_event(&p2, |e| matches!(e, SessionEvent::IncomingConnection { .. })).await;

    // The remote side hangs up; we observe one close and an empty registry.
    p2.disconnect(p1.peer_id()).await;
    let event = wait_for_event(&p1, |e| matches!(e, SessionEvent::ConnectionClosed { .. })).await;
    let SessionEvent::ConnectionClosed { peer_id } = event else {
        unreachable!()
    };
    assert_eq!(peer_id, p2.peer_id());
    assert!(p1.peers().await.is_empty());

    // No second close notification follows for the same connection.
    tokio::time::sleep(Duration::from_millis(50)).await;
    p1.send_message(p2.peer_id(), "anyone there?")
        .await
        .unwrap_err();

    p1.stop().await;
    p2.stop().await;
}

#[tokio::test]
async fn test_connect_errors_surface_unchanged() {
    let hub = Arc::new(MemoryRendezvous::new());
    let tmp = tempfile::TempDir::new().unwrap();
    let p1 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();

    let err = p1.connect("no-such-peer").await.unwrap_err();
    assert!(matches!(err, HubError::ConnectionRefused { .. }));

    let err = p1.connect(p1.peer_id()).await.unwrap_err();
    assert!(matches!(err, HubError::ConnectionRefused { .. }));

    // A failed attempt leaves no registry entry behind.
    assert!(p1.peers().await.is_empty());

    p1.stop().await;
}

#[tokio::test]
async fn test_duplicate_connect_keeps_one_connection() {
    let hub = Arc::new(MemoryRendezvous::new());
    let tmp = tempfile::TempDir::new().unwrap();

    let p1 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();
    let p2 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();

    p1.connect(p2.peer_id()).await.unwrap();
    p1.connect(p2.peer_id()).await.unwrap();
    assert_eq!(p1.peers().await.len(), 1);

    p1.stop().await;
    p2.stop().await;
}

#[tokio::test]
async fn test_timeout_from_collaborator_is_surfaced() {
    // A rendezvous double whose dial always times out, standing in for a
    // transport-imposed deadline; the core adds no timeout of its own.
    struct TimingOutRendezvous;

    #[async_trait]
    impl Rendezvous for TimingOutRendezvous {
        async fn register(&self) -> Result<RegisteredSession, HubError> {
            let (_tx, rx) = tokio::sync::mpsc::channel(1);
            Ok(RegisteredSession {
                peer_id: "local".to_string(),
                incoming: rx,
            })
        }

        async fn dial(&self, _local_id: &str, remote_id: &str) -> Result<TransportLink, HubError> {
            Err(HubError::ConnectionTimeout {
                peer_id: remote_id.to_string(),
            })
        }

        async fn unregister(&self, _peer_id: &str) {}
    }

    let tmp = tempfile::TempDir::new().unwrap();
    let p1 = SessionService::start(Arc::new(TimingOutRendezvous), test_config(&tmp))
        .await
        .unwrap();

    let err = p1.connect("slow-peer").await.unwrap_err();
    assert!(matches!(err, HubError::ConnectionTimeout { .. }));

    p1.stop().await;
}

#[tokio::test]
async fn test_session_start_failure_is_fatal_to_that_attempt() {
    struct RefusingRendezvous;

    #[async_trait]
    impl Rendezvous for RefusingRendezvous {
        async fn register(&self) -> Result<RegisteredSession, HubError> {
            Err(HubError::SessionStart("relay unavailable".to_string()))
        }

        async fn dial(&self, _local_id: &str, _remote_id: &str) -> Result<TransportLink, HubError> {
            unreachable!("registration never succeeds")
        }

        async fn unregister(&self, _peer_id: &str) {}
    }

    let tmp = tempfile::TempDir::new().unwrap();
    let err = SessionService::start(Arc::new(RefusingRendezvous), test_config(&tmp))
        .await
        .err()
        .expect("start must fail");
    assert!(matches!(err, HubError::SessionStart(_)));
}

#[tokio::test]
async fn test_stop_closes_every_connection() {
    let hub = Arc::new(MemoryRendezvous::new());
    let tmp = tempfile::TempDir::new().unwrap();

    let p1 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();
    let p2 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();
    let p3 = SessionService::start(hub.clone(), test_config(&tmp)).await.unwrap();

    p1.connect(p2.peer_id()).await.unwrap();
    p1.connect(p3.peer_id()).await.unwrap();

    p1.stop().await;
    assert!(p1.peers().await.is_empty());

    // A stopped session no longer accepts dials.
    let err = p2.connect(p1.peer_id()).await.unwrap_err();
    assert!(matches!(err, HubError::ConnectionRefused { .. }));

    p2.stop().await;
    p3.stop().await;
}
