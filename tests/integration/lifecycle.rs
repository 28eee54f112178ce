//! Liveness expiry and node lifecycle.

use std::time::Duration;

use anyhow::Result;

use waypost_registry::Registration;
use waypostd::{Node, NodeError};

use crate::*;

#[tokio::test]
async fn silent_producers_are_evicted_and_heartbeats_keep_others() -> Result<()> {
    let node = start_node_with(NodeOptions {
        inactive_producer_timeout: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(50),
        ..loopback()
    })
    .await?;

    let mut silent = Peer::identified(node.tcp, 1).await?;
    let mut chatty = Peer::identified(node.tcp, 2).await?;
    assert_eq!(silent.send("REGISTER orders").await?, "OK");
    assert_eq!(chatty.send("REGISTER orders").await?, "OK");
    let silent_id = silent.id()?;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !node.registry.lookup_registrations(silent_id).is_empty() {
        assert!(tokio::time::Instant::now() < deadline, "silent producer never evicted");
        assert_eq!(chatty.send("PING").await?, "OK");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    // Still connected, but no longer discoverable; the topic name remains.
    assert_eq!(lookup_producers(&node, "orders").await?, Some(1));
    assert_eq!(chatty.send("PING").await?, "OK");
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn tombstones_are_purged_after_their_lifetime() -> Result<()> {
    let node = start_node_with(NodeOptions {
        tombstone_lifetime: Duration::from_millis(200),
        sweep_interval: Duration::from_millis(50),
        ..loopback()
    })
    .await?;

    let mut peer = Peer::identified(node.tcp, 1).await?;
    assert_eq!(peer.send("REGISTER orders billing").await?, "OK");
    let id = peer.id()?;

    let (status, _) = post(
        &node.url("/topic/tombstone"),
        &[("topic", "orders"), ("node", "broker-1.test:4151")],
    )
    .await?;
    assert_eq!(status, 200);

    let registry = node.registry.clone();
    wait_until(Duration::from_secs(5), || {
        registry
            .get_producer(&Registration::topic("orders"), id)
            .is_none()
    })
    .await?;

    // Only the tombstoned entry goes; the channel registration is untouched.
    assert_eq!(
        node.registry.lookup_registrations(id),
        vec![Registration::channel("orders", "billing")]
    );
    assert_eq!(peer.send("PING").await?, "OK");
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_sessions_and_listeners() -> Result<()> {
    let node = start_node().await?;
    let http = node.url("/ping");
    let registry = node.registry.clone();

    let mut peer = Peer::identified(node.tcp, 1).await?;
    assert_eq!(peer.send("REGISTER orders").await?, "OK");
    let id = peer.id()?;

    node.stop().await?;

    assert!(peer.is_closed().await);
    assert!(registry.lookup_registrations(id).is_empty());
    assert!(reqwest::get(&http).await.is_err());
    Ok(())
}

#[tokio::test]
async fn second_node_on_a_taken_port_fails_to_bind() -> Result<()> {
    let node = start_node().await?;

    let result = Node::bind(NodeOptions {
        tcp_address: node.tcp,
        ..loopback()
    })
    .await;
    match result {
        Err(NodeError::Bind { addr, .. }) => assert_eq!(addr, node.tcp),
        Err(other) => panic!("expected a bind error, got {other}"),
        Ok(_) => panic!("bind on a taken port succeeded"),
    }

    node.stop().await?;
    Ok(())
}
