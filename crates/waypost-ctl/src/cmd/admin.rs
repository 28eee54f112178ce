//! Administrative mutations.

use anyhow::Result;

use super::http::{base_url, get_text, post};

pub async fn cmd_ping(addr: &str) -> Result<()> {
    let body = get_text(&format!("{}/ping", base_url(addr))).await?;
    println!("{}", body.trim());
    Ok(())
}

pub async fn cmd_topic_create(addr: &str, topic: &str) -> Result<()> {
    post(&format!("{}/topic/create", base_url(addr)), &[("topic", topic)]).await?;
    println!("Created topic {}.", topic);
    Ok(())
}

pub async fn cmd_topic_delete(addr: &str, topic: &str) -> Result<()> {
    post(&format!("{}/topic/delete", base_url(addr)), &[("topic", topic)]).await?;
    println!("Deleted topic {} and its channels.", topic);
    Ok(())
}

pub async fn cmd_channel_create(addr: &str, topic: &str, channel: &str) -> Result<()> {
    post(
        &format!("{}/channel/create", base_url(addr)),
        &[("topic", topic), ("channel", channel)],
    )
    .await?;
    println!("Created channel {}/{}.", topic, channel);
    Ok(())
}

pub async fn cmd_channel_delete(addr: &str, topic: &str, channel: &str) -> Result<()> {
    post(
        &format!("{}/channel/delete", base_url(addr)),
        &[("topic", topic), ("channel", channel)],
    )
    .await?;
    println!("Deleted channel {}/{}.", topic, channel);
    Ok(())
}

pub async fn cmd_tombstone(addr: &str, topic: &str, node: &str) -> Result<()> {
    post(
        &format!("{}/topic/tombstone", base_url(addr)),
        &[("topic", topic), ("node", node)],
    )
    .await?;
    println!("Tombstoned {} under {}.", node, topic);
    Ok(())
}
