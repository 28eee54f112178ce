//! Node lifecycle: bind both listeners, run the acceptor, the HTTP server
//! and the sweeper, and stop all of them together.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinSet;

use waypost_api::ApiState;
use waypost_core::config::{ConfigError, LivenessConfig};
use waypost_core::wire::NodeInfo;
use waypost_core::{WaypostConfig, VERSION};
use waypost_registry::RegistrationDb;

use crate::session::Acceptor;
use crate::sweeper::Sweeper;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("listen ({addr}) failed: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    #[error("http server failed: {0}")]
    Http(#[source] io::Error),
    #[error("{0} exited unexpectedly")]
    TaskExited(&'static str),
    #[error("node task panicked: {0}")]
    Panicked(String),
}

/// Everything a node needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeOptions {
    pub tcp_address: SocketAddr,
    pub http_address: SocketAddr,
    /// Advertised address. Empty = OS hostname.
    pub broadcast_address: String,
    pub inactive_producer_timeout: Duration,
    pub tombstone_lifetime: Duration,
    pub sweep_interval: Duration,
}

impl NodeOptions {
    pub fn from_config(config: &WaypostConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            tcp_address: config.tcp_addr()?,
            http_address: config.http_addr()?,
            broadcast_address: config.network.broadcast_address.clone(),
            inactive_producer_timeout: config.liveness.inactive_producer_timeout(),
            tombstone_lifetime: config.liveness.tombstone_lifetime(),
            sweep_interval: config.liveness.sweep_interval(),
        })
    }
}

impl Default for NodeOptions {
    fn default() -> Self {
        let liveness = LivenessConfig::default();
        Self {
            tcp_address: SocketAddr::from(([0, 0, 0, 0], 4160)),
            http_address: SocketAddr::from(([0, 0, 0, 0], 4161)),
            broadcast_address: String::new(),
            inactive_producer_timeout: liveness.inactive_producer_timeout(),
            tombstone_lifetime: liveness.tombstone_lifetime(),
            sweep_interval: liveness.sweep_interval(),
        }
    }
}

/// A bound, not yet running node.
pub struct Node {
    options: NodeOptions,
    registry: Arc<RegistrationDb>,
    node_info: Arc<NodeInfo>,
    tcp_listener: TcpListener,
    http_listener: TcpListener,
    tcp_addr: SocketAddr,
    http_addr: SocketAddr,
}

type TaskExit = (&'static str, Result<(), NodeError>);

impl Node {
    /// Bind the producer and HTTP listeners.
    pub async fn bind(options: NodeOptions) -> Result<Self, NodeError> {
        let (tcp_listener, tcp_addr) = listen(options.tcp_address).await?;
        let (http_listener, http_addr) = listen(options.http_address).await?;

        let hostname = local_hostname();
        let broadcast_address = if options.broadcast_address.is_empty() {
            hostname.clone()
        } else {
            options.broadcast_address.clone()
        };
        let node_info = Arc::new(NodeInfo {
            tcp_port: tcp_addr.port(),
            http_port: http_addr.port(),
            version: VERSION.to_string(),
            broadcast_address,
            hostname,
        });

        tracing::info!(tcp = %tcp_addr, "TCP: listening");
        tracing::info!(http = %http_addr, "HTTP: listening");

        Ok(Self {
            options,
            registry: Arc::new(RegistrationDb::new()),
            node_info,
            tcp_listener,
            http_listener,
            tcp_addr,
            http_addr,
        })
    }

    pub fn tcp_addr(&self) -> SocketAddr {
        self.tcp_addr
    }

    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    pub fn registry(&self) -> Arc<RegistrationDb> {
        self.registry.clone()
    }

    pub fn node_info(&self) -> &NodeInfo {
        &self.node_info
    }

    /// Serve until `shutdown` resolves or one of the node's tasks stops.
    ///
    /// Either way every task is told to stop and awaited. Returns `Ok` only
    /// when the stop was requested and nothing failed on the way down.
    pub async fn run<F>(self, shutdown: F) -> Result<(), NodeError>
    where
        F: Future<Output = ()>,
    {
        let Node {
            options,
            registry,
            node_info,
            tcp_listener,
            http_listener,
            ..
        } = self;

        // ── Shutdown channel ─────────────────────────────────────────────────
        let (shutdown_tx, _) = broadcast::channel::<()>(1);

        // ── Spawn tasks ──────────────────────────────────────────────────────
        let mut tasks: JoinSet<TaskExit> = JoinSet::new();

        let acceptor = Acceptor::new(
            tcp_listener,
            registry.clone(),
            node_info.clone(),
            shutdown_tx.subscribe(),
        );
        tasks.spawn(async move { ("TCP listener", acceptor.run().await) });

        let state = ApiState::new(registry.clone(), node_info);
        let mut http_shutdown = shutdown_tx.subscribe();
        tasks.spawn(async move {
            let stopped = async move {
                let _ = http_shutdown.recv().await;
            };
            let result = waypost_api::serve(http_listener, state, stopped)
                .await
                .map_err(NodeError::Http);
            ("HTTP listener", result)
        });

        let sweeper = Sweeper::new(
            registry,
            options.inactive_producer_timeout,
            options.tombstone_lifetime,
            options.sweep_interval,
            shutdown_tx.subscribe(),
        );
        tasks.spawn(async move {
            sweeper.run().await;
            ("sweeper", Ok(()))
        });

        supervise(tasks, shutdown_tx, shutdown).await
    }
}

/// Wait for `shutdown` or the first task to finish, then stop every task
/// through `shutdown_tx` and drain the set.
///
/// A task that finishes before it was asked to counts as a failure even if
/// it returned `Ok`.
async fn supervise<F>(
    mut tasks: JoinSet<TaskExit>,
    shutdown_tx: broadcast::Sender<()>,
    shutdown: F,
) -> Result<(), NodeError>
where
    F: Future<Output = ()>,
{
    // ── Wait for exit ────────────────────────────────────────────────────────
    tokio::pin!(shutdown);
    let first = tokio::select! {
        _ = &mut shutdown => {
            tracing::info!("shutdown requested");
            None
        }
        Some(joined) = tasks.join_next() => Some(joined),
    };

    let _ = shutdown_tx.send(());

    let mut failure = first.map(|joined| match joined {
        Ok((task, Ok(()))) => NodeError::TaskExited(task),
        Ok((_, Err(e))) => e,
        Err(e) => NodeError::Panicked(e.to_string()),
    });
    if let Some(e) = &failure {
        tracing::error!(error = %e, "node task stopped, shutting down");
    }

    while let Some(joined) = tasks.join_next().await {
        let err = match joined {
            Ok((_, Ok(()))) => continue,
            Ok((_, Err(e))) => e,
            Err(e) => NodeError::Panicked(e.to_string()),
        };
        tracing::error!(error = %err, "node task failed during shutdown");
        failure.get_or_insert(err);
    }

    tracing::info!("node stopped");
    failure.map_or(Ok(()), Err)
}

async fn listen(addr: SocketAddr) -> Result<(TcpListener, SocketAddr), NodeError> {
    let bind_error = |source| NodeError::Bind { addr, source };
    let listener = TcpListener::bind(addr).await.map_err(bind_error)?;
    let local = listener.local_addr().map_err(bind_error)?;
    Ok((listener, local))
}

fn local_hostname() -> String {
    match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!(error = %e, "failed to read hostname");
            "localhost".to_string()
        }
    }
}
