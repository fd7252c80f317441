use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use meshbridge_core::bridge::{
    BridgeNotification, LoopbackDelivery, LoopbackDiscovery, MediatorHandle, PeerInstance,
};
use meshbridge_core::config::Config;
use meshbridge_core::logging::{init_logging_with_config, LogLevel};
use meshbridge_core::shutdown::{install_signal_handlers, ShutdownCoordinator};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "meshbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Set the log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long)]
    json_logs: bool,

    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scripted session against loopback collaborators
    Simulate {
        /// Number of mesh peers to discover
        #[arg(short, long, default_value_t = 3)]
        peers: usize,

        /// Messages each peer sends to its channel
        #[arg(short, long, default_value_t = 1)]
        messages: usize,

        /// Print notifications as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML
    ShowConfig,
}

fn load_config(args: &Args) -> Result<Config> {
    let config = match &args.config {
        Some(path) => {
            let path = shellexpand::tilde(path);
            Config::from_file(&*path)?
        }
        None => Config::default(),
    };

    let mut config = config
        .with_overrides(|key| std::env::var(key).ok())
        .context("Invalid MESHBRIDGE_* environment override")?;

    if let Some(level) = &args.log_level {
        if LogLevel::parse(level).is_none() {
            bail!("Invalid log level '{}'", level);
        }
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    init_logging_with_config(config.logging.to_log_config()?)?;
    if config.metrics.enabled {
        meshbridge_core::metrics::init_metrics();
    }

    match args.command {
        Some(Command::Simulate {
            peers,
            messages,
            json,
        }) => simulate(&config, peers, messages, json).await?,
        Some(Command::ShowConfig) => print!("{}", config.to_toml()?),
        None => {
            info!("No command specified. Use --help for usage information.");
        }
    }

    Ok(())
}

/// Print notifications until `count` have arrived
async fn expect_notifications(
    rx: &mut broadcast::Receiver<BridgeNotification>,
    count: usize,
    json: bool,
) -> Result<()> {
    let mut seen = 0;
    while seen < count {
        let note = match tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Ok(note)) => note,
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!(skipped, "Notification printer lagged");
                seen += skipped as usize;
                continue;
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => bail!("Mediator stopped"),
            Err(_) => bail!("Timed out waiting for bridge notifications ({} of {})", seen, count),
        };

        if json {
            println!("{}", serde_json::to_string(&note)?);
        } else {
            println!("[{}] {}", note.kind(), note);
        }
        seen += 1;
    }
    Ok(())
}

async fn simulate(config: &Config, peers: usize, messages: usize, json: bool) -> Result<()> {
    let discovery = Arc::new(LoopbackDiscovery::new(config.mediator.event_buffer));
    let delivery = Arc::new(LoopbackDelivery::auto(config.mediator.event_buffer));
    let shutdown = Arc::new(ShutdownCoordinator::new(config.shutdown_timeout));
    install_signal_handlers(shutdown.clone());

    let (handle, task) = MediatorHandle::spawn(
        &config.mediator,
        discovery.clone(),
        delivery.clone(),
        shutdown.clone(),
    )
    .await?;
    let mut notes = handle.subscribe();

    info!(peers, messages, "Starting simulated session");
    handle.start_discovery().await?;

    let mut instances: Vec<(String, PeerInstance)> = Vec::with_capacity(peers);
    for n in 1..=peers {
        let name = format!("peer-{}", n);
        let instance = discovery.peer_found(name.as_str()).await;
        instances.push((name, instance));
    }
    expect_notifications(&mut notes, peers, json).await?;

    for (name, instance) in &instances {
        for m in 1..=messages {
            discovery
                .receive(name.as_str(), instance, format!("message {} from {}", m, name))
                .await;
        }
    }
    expect_notifications(&mut notes, peers * messages, json).await?;

    for entry in handle.entries() {
        if let Some(channel) = entry.channel {
            delivery
                .chat_message(&channel, "cloud-user", format!("hello {}", entry.identity))
                .await;
        }
    }
    expect_notifications(&mut notes, peers, json).await?;

    if let Some((name, instance)) = instances.first() {
        discovery.peer_lost(name.as_str(), instance).await;
        expect_notifications(&mut notes, 1, json).await?;
    }

    for entry in handle.entries() {
        info!(
            identity = %entry.identity,
            state = %entry.state,
            channel = ?entry.channel.as_ref().map(|c| c.sid().to_string()),
            "Final bridge entry"
        );
    }
    info!(
        forwarded_to_mesh = discovery.sent().len(),
        sent_to_chat = delivery.sent().len(),
        "Simulated session complete"
    );

    // Already stopped if a signal arrived meanwhile
    let _ = handle.shutdown().await;
    info!(timeout = ?shutdown.timeout(), "Waiting for mediator to stop");
    shutdown.drain("mediator", task).await;
    Ok(())
}
