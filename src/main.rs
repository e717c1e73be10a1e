// Loopback demo for the transfer hub core: two in-process sessions over the
// in-memory rendezvous exchange a chat message and a file, then the ledger
// and search views are printed.
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use transfer_hub::{
    connection_permitted, DirectionFilter, MemoryRendezvous, OutgoingFile, PermissionTable,
    SessionConfig, SessionService,
};

#[derive(Parser, Debug)]
#[command(name = "transfer-hub")]
#[command(about = "Transfer Hub - P2P file sharing and chat (loopback demo)", long_about = None)]
struct CliArgs {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Directory received files are written to
    #[arg(long)]
    download_dir: Option<String>,

    /// File to send across the demo link (a small text file is synthesized
    /// when omitted)
    #[arg(long)]
    send: Option<PathBuf>,
}

// Demo wallet addresses standing in for the two users' on-chain identities.
const GRANTOR_ADDRESS: &str = "GRECEIVER000000000000000000000000000000000000000000000";
const GRANTEE_ADDRESS: &str = "GSENDER0000000000000000000000000000000000000000000000";

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rendezvous = Arc::new(MemoryRendezvous::new());

    let sender_config = SessionConfig::default();
    let receiver_config = SessionConfig {
        download_dir: transfer_hub::download_paths::resolve_download_dir(
            args.download_dir.as_deref(),
        ),
    };

    let sender = SessionService::start(rendezvous.clone(), sender_config).await?;
    let receiver = SessionService::start(rendezvous.clone(), receiver_config).await?;
    info!("Sender identity:   {}", sender.peer_id());
    info!("Receiver identity: {}", receiver.peer_id());

    // The receiver's wallet grants the sender's wallet permission to
    // connect; the connect flow is gated on the oracle's answer.
    let permissions = PermissionTable::new();
    permissions
        .grant_permission(GRANTOR_ADDRESS, GRANTEE_ADDRESS)
        .await?;
    if !connection_permitted(&permissions, GRANTOR_ADDRESS, GRANTEE_ADDRESS).await {
        anyhow::bail!("permission check failed, refusing to connect");
    }

    sender.connect(receiver.peer_id()).await?;
    sender.select(receiver.peer_id()).await;

    sender
        .send_message(receiver.peer_id(), "Hello from the hub!")
        .await?;

    let file = match &args.send {
        Some(path) => OutgoingFile::from_path(path)
            .await
            .map_err(anyhow::Error::msg)?,
        None => OutgoingFile::new(
            "hello.txt",
            "text/plain",
            b"Sent across the loopback link.".to_vec(),
        ),
    };
    let file_name = file.file_name.clone();
    sender.send_files(receiver.peer_id(), vec![file]).await;

    let overview = sender.batch_overview().await;
    info!(
        "Batch: {:.0}% overall ({} completed, {} failed)",
        overview.overall_progress, overview.counts.completed, overview.counts.failed
    );

    // Let the receiver drain its inbound events before reading its state.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    for message in receiver.messages(sender.peer_id()).await {
        info!("Receiver chat log: {:?} {}", message.sender, message.text);
    }
    for record in receiver.transfers().await {
        info!(
            "Receiver ledger: {} {:?} {:?} -> {:?}",
            record.file_name, record.direction, record.status, record.path
        );
    }
    for record in sender
        .search_transfers(&file_name, DirectionFilter::Sent)
        .await
    {
        info!(
            "Sender search hit: {} {:?} progress {}%",
            record.file_name, record.status, record.progress
        );
    }

    sender.stop().await;
    receiver.stop().await;
    Ok(())
}
