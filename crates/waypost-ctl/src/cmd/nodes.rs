//! Producer listing.

use anyhow::Result;
use serde::Deserialize;

use super::http::{base_url, get_json};

#[derive(Deserialize)]
pub struct ProducerInfo {
    pub remote_address: String,
    pub hostname: String,
    pub broadcast_address: String,
    pub tcp_port: u16,
    pub http_port: u16,
    pub version: String,
}

#[derive(Deserialize)]
struct NodesResponse {
    producers: Vec<NodeEntry>,
}

#[derive(Deserialize)]
struct NodeEntry {
    #[serde(flatten)]
    info: ProducerInfo,
    topics: Vec<String>,
    tombstones: Vec<bool>,
}

pub fn print_producer(p: &ProducerInfo) {
    println!("  ┌─ {}:{}", p.broadcast_address, p.http_port);
    println!("  │  hostname : {}", p.hostname);
    println!("  │  remote   : {}", p.remote_address);
    println!("  │  tcp port : {}", p.tcp_port);
    println!("  │  version  : {}", p.version);
}

pub async fn cmd_nodes(addr: &str) -> Result<()> {
    let resp: NodesResponse = get_json(&format!("{}/nodes", base_url(addr)), &[]).await?;

    if resp.producers.is_empty() {
        println!("No producers connected.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Producers ({})", resp.producers.len());
    println!("═══════════════════════════════════════");
    for node in &resp.producers {
        print_producer(&node.info);
        let topics: Vec<String> = node
            .topics
            .iter()
            .zip(&node.tombstones)
            .map(|(topic, tombstoned)| {
                if *tombstoned {
                    format!("{} (tombstoned)", topic)
                } else {
                    topic.clone()
                }
            })
            .collect();
        if topics.is_empty() {
            println!("  └─ topics   : (none)");
        } else {
            println!("  └─ topics   : {}", topics.join(", "));
        }
    }
    Ok(())
}
