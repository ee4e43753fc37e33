//! lineupd - sign-up list consistency daemon.
//!
//! Serves the framed JSON protocol on a Unix socket, runs the change
//! watcher that keeps slot tables gap-free, and owns the store backend
//! selected by configuration. Everything is constructed once here and
//! handed down by reference; there is no ambient global state.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use lineup_core::config::{DaemonConfig, StoreBackend};
use lineup_core::ipc::{ProtocolError, RequestEnvelope, frame_message, parse_frame_length};
use lineup_core::store::ListStore;
use lineup_daemon::state::{DaemonStateHandle, SharedState};
use lineup_daemon::store::{MemoryListStore, SqliteListStore};
use lineup_daemon::{handlers, watcher};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Upper bound on a single request frame.
const MAX_FRAME_LEN: usize = 1 << 20;

#[derive(Debug, Parser)]
#[command(name = "lineupd", about = "Sign-up list consistency daemon", version)]
struct Args {
    /// Path to the TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the request socket path.
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => DaemonConfig::from_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => DaemonConfig::default(),
    };
    if let Some(socket) = args.socket {
        config.socket = socket;
    }

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let store: Arc<dyn ListStore> = match config.store.backend {
        StoreBackend::Memory => Arc::new(MemoryListStore::new().with_events(events_tx)),
        StoreBackend::Sqlite => {
            let path = config
                .store
                .path
                .clone()
                .context("store.path is required for the sqlite backend")?;
            let store = SqliteListStore::open(&path)
                .with_context(|| format!("opening store at {}", path.display()))?;
            Arc::new(store.with_events(events_tx))
        },
    };
    let watcher_task = watcher::spawn(
        Arc::clone(&store),
        config.teardown.batch_size,
        events_rx,
    );

    let socket_path = config.socket.clone();
    if socket_path.exists() {
        std::fs::remove_file(&socket_path)
            .with_context(|| format!("removing stale socket {}", socket_path.display()))?;
    }
    let listener = UnixListener::bind(&socket_path)
        .with_context(|| format!("binding socket {}", socket_path.display()))?;
    info!(
        socket = %socket_path.display(),
        backend = ?config.store.backend,
        "lineupd listening"
    );

    let state: SharedState = Arc::new(DaemonStateHandle::new(config, store));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, _addr)) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        if let Err(err) = serve_connection(stream, &state).await {
                            warn!(%err, "connection error");
                        }
                    });
                },
                Err(err) => warn!(%err, "accept failed"),
            },
            _ = &mut ctrl_c => {
                info!("interrupt received");
                state.request_shutdown();
                break;
            },
            () = tokio::time::sleep(Duration::from_millis(200)) => {
                if state.is_shutdown_requested() {
                    break;
                }
            },
        }
    }

    info!("shutting down");
    let _ = std::fs::remove_file(&socket_path);
    watcher_task.abort();
    Ok(())
}

/// Serves framed requests on one connection until the peer hangs up.
async fn serve_connection(mut stream: UnixStream, state: &SharedState) -> Result<(), ProtocolError> {
    loop {
        let mut len_buf = [0u8; 4];
        match stream.read_exact(&mut len_buf).await {
            Ok(_) => {},
            Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        let Some(len) = parse_frame_length(&len_buf) else {
            return Err(ProtocolError::Frame("missing length prefix".to_string()));
        };
        if len > MAX_FRAME_LEN {
            return Err(ProtocolError::Frame(format!(
                "frame of {len} bytes exceeds the {MAX_FRAME_LEN} byte limit"
            )));
        }

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;
        let envelope: RequestEnvelope = serde_json::from_slice(&payload)?;

        let response = handlers::dispatch(envelope, state).await;

        let body = serde_json::to_vec(&response)?;
        stream.write_all(&frame_message(&body)).await?;
    }
}
