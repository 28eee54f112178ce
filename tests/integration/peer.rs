//! Producer sessions over the wire protocol.

use anyhow::Result;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use waypost_registry::{Registration, ANY};

use crate::*;

/// REGISTER topicX, REGISTER topicX chanY, disconnect: the names stay
/// discoverable but nothing produces them any more.
#[tokio::test]
async fn register_then_disconnect() -> Result<()> {
    let node = start_node().await?;
    let mut peer = Peer::identified(node.tcp, 1).await?;

    assert_eq!(peer.send("REGISTER topicX").await?, "OK");
    assert_eq!(peer.send("REGISTER topicX chanY").await?, "OK");

    let (status, body) = get_json(&node.url("/lookup"), &[("topic", "topicX")]).await?;
    assert_eq!(status, 200);
    assert_eq!(body["channels"], serde_json::json!(["chanY"]));
    assert_eq!(body["producers"][0]["broadcast_address"], "broker-1.test");
    assert_eq!(body["producers"][0]["http_port"], 4151);

    drop(peer);
    wait_for_producers(&node, "topicX", Some(0)).await?;

    assert_eq!(
        node.registry.find_registrations(ANY, ANY, ANY),
        vec![
            Registration::topic("topicX"),
            Registration::channel("topicX", "chanY"),
        ]
    );
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn unknown_magic_is_rejected() -> Result<()> {
    let node = start_node().await?;
    let mut stream = TcpStream::connect(node.tcp).await?;
    stream.write_all(b"  V9").await?;

    assert_eq!(read_frame(&mut stream).await?, b"E_BAD_PROTOCOL".to_vec());
    assert!(node.registry.is_empty());
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn register_before_identify_closes_session() -> Result<()> {
    let node = start_node().await?;
    let mut peer = Peer::connect(node.tcp).await?;

    assert_eq!(
        peer.send("REGISTER orders").await?,
        "E_INVALID client must IDENTIFY"
    );
    assert!(peer.is_closed().await);
    assert!(node.registry.is_empty());
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn protocol_errors_end_the_session_and_its_registrations() -> Result<()> {
    let node = start_node().await?;
    let mut peer = Peer::identified(node.tcp, 1).await?;
    assert_eq!(peer.send("REGISTER orders").await?, "OK");

    let reply = peer.send("REGISTER orders billing extra").await?;
    assert_eq!(reply, "E_INVALID REGISTER too many params");
    assert!(peer.is_closed().await);

    wait_for_producers(&node, "orders", Some(0)).await?;
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn second_identify_is_rejected() -> Result<()> {
    let node = start_node().await?;
    let mut peer = Peer::identified(node.tcp, 1).await?;

    assert_eq!(peer.send("PING").await?, "OK");
    assert_eq!(peer.send("IDENTIFY").await?, "E_INVALID cannot IDENTIFY again");
    assert!(peer.is_closed().await);
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn bad_names_are_rejected() -> Result<()> {
    let node = start_node().await?;

    let mut peer = Peer::identified(node.tcp, 1).await?;
    let reply = peer.send("REGISTER no/slashes").await?;
    assert!(reply.starts_with("E_BAD_TOPIC"), "{reply}");

    let mut peer = Peer::identified(node.tcp, 2).await?;
    let reply = peer.send("REGISTER orders no/slashes").await?;
    assert!(reply.starts_with("E_BAD_CHANNEL"), "{reply}");

    assert!(node.registry.is_empty());
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn unregister_channel_and_ephemeral_topic() -> Result<()> {
    let node = start_node().await?;
    let mut peer = Peer::identified(node.tcp, 1).await?;

    assert_eq!(peer.send("REGISTER orders billing").await?, "OK");
    assert_eq!(peer.send("UNREGISTER orders billing").await?, "OK");
    let (_, body) = get_json(&node.url("/channels"), &[("topic", "orders")]).await?;
    assert_eq!(body["channels"], serde_json::json!([]));

    assert_eq!(peer.send("REGISTER scratch#ephemeral").await?, "OK");
    assert_eq!(lookup_producers(&node, "scratch#ephemeral").await?, Some(1));
    assert_eq!(peer.send("UNREGISTER scratch#ephemeral").await?, "OK");
    assert_eq!(lookup_producers(&node, "scratch#ephemeral").await?, None);

    // The non-ephemeral topic is still there.
    assert_eq!(lookup_producers(&node, "orders").await?, Some(1));
    node.stop().await?;
    Ok(())
}

#[tokio::test]
async fn many_producers_share_a_topic() -> Result<()> {
    let node = start_node().await?;
    let mut peers = Vec::new();
    for n in 1..=5 {
        let mut peer = Peer::identified(node.tcp, n).await?;
        assert_eq!(peer.send("REGISTER orders").await?, "OK");
        peers.push(peer);
    }
    assert_eq!(lookup_producers(&node, "orders").await?, Some(5));

    peers.truncate(2);
    wait_for_producers(&node, "orders", Some(2)).await?;
    node.stop().await?;
    Ok(())
}
