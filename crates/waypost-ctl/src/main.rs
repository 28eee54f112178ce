//! waypost-ctl: command-line interface for the waypost HTTP API.

use anyhow::{Context, Result};

mod cmd;

use cmd::{admin, nodes, topics};

const DEFAULT_ADDR: &str = "127.0.0.1:4161";

fn print_usage() {
    println!("Usage: waypost-ctl [--addr <host:port>] <command>");
    println!();
    println!("Commands:");
    println!("  ping                              Check the daemon is up");
    println!("  topics                            List registered topics");
    println!("  channels <topic>                  List channels of a topic");
    println!("  lookup <topic>                    Show channels and producers of a topic");
    println!("  nodes                             List producers and their topics");
    println!("  tombstone <topic> <host:port>     Hide a producer from a topic");
    println!("  topic create <topic>              Register a topic");
    println!("  topic delete <topic>              Delete a topic and its channels");
    println!("  channel create <topic> <channel>  Register a channel");
    println!("  channel delete <topic> <channel>  Delete a channel");
    println!();
    println!("Options:");
    println!("  --addr <host:port>   HTTP API address (default: {})", DEFAULT_ADDR);
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    // Parse --addr option
    let mut addr = DEFAULT_ADDR.to_string();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--addr" {
            i += 1;
            addr = args.get(i).context("--addr requires a value")?.clone();
        } else {
            remaining.push(&args[i]);
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["ping"]                              => admin::cmd_ping(&addr).await,
        ["topics"] | []                       => topics::cmd_topics(&addr).await,
        ["channels", topic]                   => topics::cmd_channels(&addr, topic).await,
        ["lookup", topic]                     => topics::cmd_lookup(&addr, topic).await,
        ["nodes"]                             => nodes::cmd_nodes(&addr).await,
        ["tombstone", topic, node]            => admin::cmd_tombstone(&addr, topic, node).await,
        ["topic", "create", topic]            => admin::cmd_topic_create(&addr, topic).await,
        ["topic", "delete", topic]            => admin::cmd_topic_delete(&addr, topic).await,
        ["channel", "create", topic, channel] => admin::cmd_channel_create(&addr, topic, channel).await,
        ["channel", "delete", topic, channel] => admin::cmd_channel_delete(&addr, topic, channel).await,
        ["help"] | ["--help"] | ["-h"]        => { print_usage(); Ok(()) }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
