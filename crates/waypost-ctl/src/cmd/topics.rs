//! Topic and channel queries.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};
use super::nodes::{print_producer, ProducerInfo};

#[derive(Deserialize)]
struct TopicsResponse {
    topics: Vec<String>,
}

#[derive(Deserialize)]
struct ChannelsResponse {
    channels: Vec<String>,
}

#[derive(Deserialize)]
struct LookupResponse {
    channels: Vec<String>,
    producers: Vec<ProducerInfo>,
}

pub async fn cmd_topics(addr: &str) -> Result<()> {
    let resp: TopicsResponse = get_json(&format!("{}/topics", base_url(addr)), &[]).await?;

    if resp.topics.is_empty() {
        println!("No topics registered.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Topics ({})", resp.topics.len());
    println!("═══════════════════════════════════════");
    for topic in &resp.topics {
        println!("  {}", topic);
    }
    Ok(())
}

pub async fn cmd_channels(addr: &str, topic: &str) -> Result<()> {
    let resp: ChannelsResponse =
        get_json(&format!("{}/channels", base_url(addr)), &[("topic", topic)]).await?;

    if resp.channels.is_empty() {
        println!("No channels registered for {}.", topic);
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Channels of {} ({})", topic, resp.channels.len());
    println!("═══════════════════════════════════════");
    for channel in &resp.channels {
        println!("  {}", channel);
    }
    Ok(())
}

pub async fn cmd_lookup(addr: &str, topic: &str) -> Result<()> {
    let resp: LookupResponse =
        get_json(&format!("{}/lookup", base_url(addr)), &[("topic", topic)]).await?;

    println!("═══════════════════════════════════════");
    println!("  Lookup: {}", topic);
    println!("═══════════════════════════════════════");
    if resp.channels.is_empty() {
        println!("  Channels  : (none)");
    } else {
        println!("  Channels  : {}", resp.channels.join(", "));
    }

    if resp.producers.is_empty() {
        println!("\n  No producers.");
    } else {
        println!("\n  Producers:");
        for p in &resp.producers {
            print_producer(p);
            println!("  └─");
        }
    }
    Ok(())
}
