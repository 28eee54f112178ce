//! Inbound producer connections.
//!
//! Each accepted connection gets its own task. The task reads the 4-byte
//! protocol magic and either runs a [`Session`] or rejects the connection
//! with `E_BAD_PROTOCOL`.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use waypost_core::wire::{frame, ErrorCode, NodeInfo, ProtocolError, MAGIC_LEN, MAGIC_V1};
use waypost_registry::RegistrationDb;

use super::conn;
use super::state::Session;
use crate::node::NodeError;

/// Pause after a transient accept error before accepting again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct Acceptor {
    listener: TcpListener,
    registry: Arc<RegistrationDb>,
    node_info: Arc<NodeInfo>,
    shutdown: broadcast::Receiver<()>,
}

impl Acceptor {
    pub fn new(
        listener: TcpListener,
        registry: Arc<RegistrationDb>,
        node_info: Arc<NodeInfo>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            listener,
            registry,
            node_info,
            shutdown,
        }
    }

    /// Accept until shutdown or a fatal accept error. Session tasks are
    /// aborted on the way out either way.
    pub async fn run(mut self) -> Result<(), NodeError> {
        let mut sessions = JoinSet::new();

        let result = loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    tracing::info!("peer listener shutting down");
                    break Ok(());
                }

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        if e.is_panic() {
                            tracing::error!(error = %e, "session task panicked");
                        }
                    }
                }

                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::info!(peer = %peer, "new producer connection");
                        sessions.spawn(handle_connection(
                            stream,
                            peer,
                            self.registry.clone(),
                            self.node_info.clone(),
                        ));
                    }
                    Err(e) if is_transient(&e) => {
                        tracing::warn!(error = %e, "transient accept failure");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                        break Err(NodeError::Accept(e));
                    }
                },
            }
        };

        tracing::debug!(sessions = sessions.len(), "aborting producer sessions");
        sessions.shutdown().await;
        result
    }
}

/// Negotiate the protocol magic on a fresh connection and serve it.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    registry: Arc<RegistrationDb>,
    node_info: Arc<NodeInfo>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut magic = [0u8; MAGIC_LEN];
    if let Err(e) = stream.read_exact(&mut magic).await {
        tracing::info!(peer = %peer, error = %e, "failed to read protocol magic");
        return;
    }
    tracing::debug!(peer = %peer, magic = ?String::from_utf8_lossy(&magic), "protocol magic");

    if magic != MAGIC_V1 {
        tracing::warn!(peer = %peer, magic = ?magic, "bad protocol magic");
        let err = ProtocolError::new(ErrorCode::BadProtocol, "");
        let _ = stream.write_all(&frame(&err.payload())).await;
        let _ = stream.shutdown().await;
        return;
    }

    conn::serve(stream, Session::new(peer, registry, node_info)).await;
    tracing::info!(peer = %peer, "producer session ended");
}

fn is_transient(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::ConnectionAborted
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::Interrupted
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::TimedOut => true,
        _ => matches!(
            e.raw_os_error(),
            Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
        ),
    }
}
