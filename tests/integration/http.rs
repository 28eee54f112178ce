//! The HTTP query and admin API against live sessions.

use anyhow::Result;
use serde_json::json;

use crate::*;

#[tokio::test]
async fn ping_and_info() -> Result<()> {
    let node = start_node().await?;

    let body = reqwest::get(node.url("/ping")).await?.text().await?;
    assert_eq!(body, "OK");

    let (status, info) = get_json(&node.url("/info"), &[]).await?;
    assert_eq!(status, 200);
    assert_eq!(info["version"], waypost_core::VERSION);
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn argument_errors() -> Result<()> {
    let node = start_node().await?;

    let (status, body) = get_json(&node.url("/lookup"), &[]).await?;
    assert_eq!((status, body), (400, json!({"message": "MISSING_ARG_TOPIC"})));

    let (status, body) = get_json(&node.url("/lookup"), &[("topic", "nobody")]).await?;
    assert_eq!((status, body), (404, json!({"message": "TOPIC_NOT_FOUND"})));

    let (status, body) = post(&node.url("/topic/create"), &[("topic", "not valid")]).await?;
    assert_eq!(status, 400);
    assert!(body.contains("INVALID_ARG_TOPIC"), "{body}");

    let (status, body) = post(
        &node.url("/channel/delete"),
        &[("topic", "orders"), ("channel", "billing")],
    )
    .await?;
    assert_eq!(status, 404);
    assert!(body.contains("CHANNEL_NOT_FOUND"), "{body}");
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn tombstone_hides_a_producer_from_lookup() -> Result<()> {
    let node = start_node().await?;
    let mut a = Peer::identified(node.tcp, 1).await?;
    let mut b = Peer::identified(node.tcp, 2).await?;
    assert_eq!(a.send("REGISTER orders").await?, "OK");
    assert_eq!(b.send("REGISTER orders").await?, "OK");
    assert_eq!(lookup_producers(&node, "orders").await?, Some(2));

    let (status, _) = post(
        &node.url("/topic/tombstone"),
        &[("topic", "orders"), ("node", "broker-1.test:4151")],
    )
    .await?;
    assert_eq!(status, 200);

    let (_, body) = get_json(&node.url("/lookup"), &[("topic", "orders")]).await?;
    assert_eq!(body["producers"].as_array().map(Vec::len), Some(1));
    assert_eq!(body["producers"][0]["broadcast_address"], "broker-2.test");

    // Still registered until the sweeper purges it.
    assert!(node
        .registry
        .lookup_registrations(a.id()?)
        .contains(&waypost_registry::Registration::topic("orders")));

    let (_, nodes) = get_json(&node.url("/nodes"), &[]).await?;
    let producers = nodes["producers"].as_array().cloned().unwrap_or_default();
    let tombstoned: Vec<_> = producers
        .iter()
        .map(|p| (p["broadcast_address"].clone(), p["tombstones"].clone()))
        .collect();
    assert!(tombstoned.contains(&(json!("broker-1.test"), json!([true]))));
    assert!(tombstoned.contains(&(json!("broker-2.test"), json!([false]))));

    let (status, _) = post(
        &node.url("/topic/tombstone"),
        &[("topic", "orders"), ("node", "broker-9.test:4159")],
    )
    .await?;
    assert_eq!(status, 404);

    drop((a, b));
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn topic_and_channel_admin() -> Result<()> {
    let node = start_node().await?;

    let (status, _) = post(&node.url("/topic/create"), &[("topic", "audit")]).await?;
    assert_eq!(status, 200);
    let (status, _) = post(
        &node.url("/channel/create"),
        &[("topic", "orders"), ("channel", "billing")],
    )
    .await?;
    assert_eq!(status, 200);

    let (_, topics) = get_json(&node.url("/topics"), &[]).await?;
    assert_eq!(topics["topics"], json!(["audit", "orders"]));
    let (_, channels) = get_json(&node.url("/channels"), &[("topic", "orders")]).await?;
    assert_eq!(channels["channels"], json!(["billing"]));
    assert_eq!(lookup_producers(&node, "orders").await?, Some(0));

    let (status, _) = post(&node.url("/topic/delete"), &[("topic", "orders")]).await?;
    assert_eq!(status, 200);
    let (_, topics) = get_json(&node.url("/topics"), &[]).await?;
    assert_eq!(topics["topics"], json!(["audit"]));
    let (_, channels) = get_json(&node.url("/channels"), &[("topic", "orders")]).await?;
    assert_eq!(channels["channels"], json!([]));

    let (status, _) = post(&node.url("/topic/delete"), &[("topic", "orders")]).await?;
    assert_eq!(status, 404);
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn debug_dumps_the_registry() -> Result<()> {
    let node = start_node().await?;
    let mut peer = Peer::identified(node.tcp, 1).await?;
    assert_eq!(peer.send("REGISTER orders billing").await?, "OK");

    let (status, debug) = get_json(&node.url("/debug"), &[]).await?;
    assert_eq!(status, 200);
    assert_eq!(debug["topic:orders"][0]["hostname"], "broker-1.test");
    assert_eq!(debug["channel:orders:billing"][0]["tombstoned"], false);
    node.stop().await?;
    Ok(())
}
