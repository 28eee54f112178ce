//! waypost integration test harness.
//!
//! Every test starts its own node on 127.0.0.1 with OS-assigned ports and
//! drives it the way producers and operators do: raw wire protocol over
//! TCP, JSON over HTTP. Nothing is shared between tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use waypost_core::wire::MAGIC_V1;
use waypost_registry::{ProducerId, RegistrationDb};
use waypostd::{Node, NodeError, NodeOptions};

mod http;
mod lifecycle;
mod peer;

// ── Node ──────────────────────────────────────────────────────────────────────

pub struct TestNode {
    pub tcp: SocketAddr,
    pub http: SocketAddr,
    pub registry: Arc<RegistrationDb>,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<(), NodeError>>,
}

/// Loopback options with the daemon's default liveness settings.
pub fn loopback() -> NodeOptions {
    NodeOptions {
        tcp_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        http_address: SocketAddr::from(([127, 0, 0, 1], 0)),
        broadcast_address: "lookup.test".to_string(),
        ..NodeOptions::default()
    }
}

pub async fn start_node() -> Result<TestNode> {
    start_node_with(loopback()).await
}

pub async fn start_node_with(options: NodeOptions) -> Result<TestNode> {
    let node = Node::bind(options).await.context("bind test node")?;
    let tcp = node.tcp_addr();
    let http = node.http_addr();
    let registry = node.registry();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(node.run(async move {
        let _ = stopped.await;
    }));

    Ok(TestNode {
        tcp,
        http,
        registry,
        stop: Some(stop),
        task,
    })
}

impl TestNode {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.http, path)
    }

    /// Request shutdown and wait for the node to finish.
    pub async fn stop(mut self) -> Result<(), NodeError> {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .expect("node did not stop in time")
            .expect("node task panicked")
    }
}

// ── Producer side ─────────────────────────────────────────────────────────────

/// A producer connection that has sent the V1 magic.
pub struct Peer {
    stream: TcpStream,
}

impl Peer {
    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        let mut stream = TcpStream::connect(addr).await.context("connect")?;
        stream.write_all(&MAGIC_V1).await?;
        Ok(Self { stream })
    }

    /// Connect and IDENTIFY as `broker-<n>.test` with HTTP port `4150 + n`.
    pub async fn identified(addr: SocketAddr, n: u16) -> Result<Self> {
        let mut peer = Self::connect(addr).await?;
        let info = peer.identify(&format!("broker-{n}.test"), 4150 + n).await?;
        if info["tcp_port"] != addr.port() {
            bail!("unexpected IDENTIFY response: {info}");
        }
        Ok(peer)
    }

    pub async fn identify(&mut self, broadcast_address: &str, http_port: u16) -> Result<serde_json::Value> {
        let body = serde_json::json!({
            "broadcast_address": broadcast_address,
            "hostname": broadcast_address,
            "tcp_port": 4150,
            "http_port": http_port,
            "version": "1.2.1",
        })
        .to_string();
        self.stream.write_all(b"IDENTIFY\n").await?;
        self.stream.write_u32(body.len() as u32).await?;
        self.stream.write_all(body.as_bytes()).await?;

        let payload = self.read_frame().await?;
        serde_json::from_slice(&payload)
            .with_context(|| format!("IDENTIFY response: {}", String::from_utf8_lossy(&payload)))
    }

    /// Send one command line and return the response payload as text.
    pub async fn send(&mut self, line: &str) -> Result<String> {
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        let payload = self.read_frame().await?;
        Ok(String::from_utf8_lossy(&payload).into_owned())
    }

    /// The producer id the node knows this connection by.
    pub fn id(&self) -> Result<ProducerId> {
        Ok(ProducerId(self.stream.local_addr()?))
    }

    pub async fn read_frame(&mut self) -> Result<Vec<u8>> {
        read_frame(&mut self.stream).await
    }

    /// True once the server has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = [0u8; 1];
        matches!(
            tokio::time::timeout(Duration::from_secs(2), self.stream.read(&mut buf)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }
}

pub async fn read_frame(stream: &mut TcpStream) -> Result<Vec<u8>> {
    let len = stream.read_u32().await.context("read frame length")?;
    let mut payload = vec![0u8; len as usize];
    stream.read_exact(&mut payload).await.context("read frame payload")?;
    Ok(payload)
}

// ── HTTP side ─────────────────────────────────────────────────────────────────

/// GET and return (status, parsed JSON body).
pub async fn get_json(url: &str, query: &[(&str, &str)]) -> Result<(u16, serde_json::Value)> {
    let resp = reqwest::Client::new().get(url).query(query).send().await?;
    let status = resp.status().as_u16();
    let body = resp.json().await.context("parse JSON body")?;
    Ok((status, body))
}

/// POST and return (status, body text).
pub async fn post(url: &str, query: &[(&str, &str)]) -> Result<(u16, String)> {
    let resp = reqwest::Client::new().post(url).query(query).send().await?;
    let status = resp.status().as_u16();
    Ok((status, resp.text().await?))
}

/// Number of live producers `/lookup` reports for `topic`, or None on 404.
pub async fn lookup_producers(node: &TestNode, topic: &str) -> Result<Option<usize>> {
    let (status, body) = get_json(&node.url("/lookup"), &[("topic", topic)]).await?;
    match status {
        200 => Ok(Some(
            body["producers"]
                .as_array()
                .context("producers array")?
                .len(),
        )),
        404 => Ok(None),
        other => bail!("unexpected /lookup status {other}: {body}"),
    }
}

/// Poll `check` every 20ms until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    while !check() {
        if tokio::time::Instant::now() >= deadline {
            bail!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Ok(())
}

/// Poll `/lookup` until it reports `expected` producers for `topic`.
pub async fn wait_for_producers(node: &TestNode, topic: &str, expected: Option<usize>) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let found = lookup_producers(node, topic).await?;
        if found == expected {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("{topic}: expected {expected:?} producers, found {found:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
