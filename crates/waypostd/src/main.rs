//! waypostd: waypost discovery daemon.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tracing_subscriber::EnvFilter;

use waypost_core::{WaypostConfig, VERSION};
use waypostd::{Node, NodeOptions};

const USAGE: &str = "usage: waypostd [--config <path>] [--tcp-address <addr:port>] \
[--http-address <addr:port>] [--broadcast-address <addr>] \
[--inactive-producer-timeout <secs>] [--tombstone-lifetime <secs>] \
[--log-level <level>] [--version]";

/// Command line. Every setting given here wins over file and environment.
#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    config: Option<PathBuf>,
    version: bool,
    tcp_address: Option<String>,
    http_address: Option<String>,
    broadcast_address: Option<String>,
    inactive_producer_timeout_secs: Option<u64>,
    tombstone_lifetime_secs: Option<u64>,
    log_level: Option<String>,
}

impl Args {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut parsed = Args::default();
        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            let mut value = |flag: &str| args.next().with_context(|| format!("{flag} requires a value"));
            match arg.as_str() {
                "--config" | "-c" => parsed.config = Some(PathBuf::from(value("--config")?)),
                "--version" | "-V" => parsed.version = true,
                "--tcp-address" => parsed.tcp_address = Some(value(&arg)?),
                "--http-address" => parsed.http_address = Some(value(&arg)?),
                "--broadcast-address" => parsed.broadcast_address = Some(value(&arg)?),
                "--inactive-producer-timeout" => {
                    parsed.inactive_producer_timeout_secs = Some(secs(&arg, &value(&arg)?)?);
                }
                "--tombstone-lifetime" => {
                    parsed.tombstone_lifetime_secs = Some(secs(&arg, &value(&arg)?)?);
                }
                "--log-level" => parsed.log_level = Some(value(&arg)?),
                other => bail!("unknown argument: {other}\n{USAGE}"),
            }
        }
        Ok(parsed)
    }

    /// Lay the flags over a loaded config and re-check it.
    fn apply(&self, config: &mut WaypostConfig) -> Result<()> {
        if let Some(v) = &self.tcp_address {
            config.network.tcp_address = v.clone();
        }
        if let Some(v) = &self.http_address {
            config.network.http_address = v.clone();
        }
        if let Some(v) = &self.broadcast_address {
            config.network.broadcast_address = v.clone();
        }
        if let Some(v) = self.inactive_producer_timeout_secs {
            config.liveness.inactive_producer_timeout_secs = v;
        }
        if let Some(v) = self.tombstone_lifetime_secs {
            config.liveness.tombstone_lifetime_secs = v;
        }
        if let Some(v) = &self.log_level {
            config.logging.level = v.clone();
        }
        config.validate().context("invalid command line")?;
        Ok(())
    }
}

fn secs(flag: &str, value: &str) -> Result<u64> {
    value
        .parse()
        .with_context(|| format!("{flag} expects whole seconds, got '{value}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    if args.version {
        println!("waypostd v{VERSION}");
        return Ok(());
    }

    // Load config
    let mut config = match &args.config {
        Some(path) => WaypostConfig::load_from(path),
        None => WaypostConfig::load(),
    }
    .context("failed to load config")?;
    args.apply(&mut config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tracing::info!(version = VERSION, "waypostd starting");

    let options = NodeOptions::from_config(&config).context("invalid network config")?;
    let node = match Node::bind(options).await {
        Ok(node) => node,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return Err(e).context("failed to start node");
        }
    };

    if let Err(e) = node.run(shutdown_signal()).await {
        tracing::error!(error = %e, "node failed");
        return Err(e).context("node stopped on error");
    }
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
}
