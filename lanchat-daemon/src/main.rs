//! Process entry point: loads configuration, initializes logging, and
//! wires the Discovery Engine, Message Router, and front-end IPC transport
//! together on a single Tokio runtime.
//!
//! This binary is intentionally the thinnest possible consumer of
//! `lanchat-core` — no menus, no prompt rendering, no colored output (those
//! are explicitly out of scope, SPEC_FULL.md §1). It exists only so the
//! protocol engine is runnable end to end.

mod config;
mod frontend_ipc;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lanchat_core::ipc::Command;
use lanchat_core::presence::PresenceController;
use lanchat_core::router::{MessageRouter, RouterConfig};
use lanchat_core::{discovery, EngineError};
use lanchat_types::Config;

const AWAY_FLAG_FILE: &str = "away.flag";
const OFFLINE_LOG_FILE: &str = "offline_messages.txt";

#[derive(Parser, Debug)]
#[command(name = "lanchatd", about = "LAN chat protocol engine daemon")]
struct Args {
    /// Path to the TOML configuration document.
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Speak the front-end IPC protocol over stdin/stdout instead of named
    /// FIFOs.
    #[arg(long)]
    stdio: bool,

    /// Override the FIFO used for front-end → core commands.
    #[arg(long, default_value = "cli_to_network.pipe")]
    cmd_pipe: PathBuf,

    /// Override the FIFO used for core → front-end notifications.
    #[arg(long, default_value = "network_to_cli.pipe")]
    notif_pipe: PathBuf,
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let args = Args::parse();

    let config = match config::load(&args.config).await {
        Ok(c) => c,
        Err(e) => {
            error!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let offline_log_path = PathBuf::from(&config.imagepath).join(OFFLINE_LOG_FILE);
    let away_flag_path = PathBuf::from(AWAY_FLAG_FILE);
    let presence = PresenceController::new(away_flag_path, offline_log_path, config.autoreply.clone());
    presence.sync_initial_state(config.away).await?;

    let router_config = RouterConfig {
        own_handle: config.handle.clone(),
        own_port: config.port(),
        whoisport: config.whoisport,
        image_dir: PathBuf::from(&config.imagepath),
        chunk_size: lanchat_codec::DEFAULT_CHUNK_SIZE,
    };

    let (notif_tx, notif_rx) = mpsc::channel(128);
    let (cmd_tx, mut cmd_rx) = mpsc::channel(128);

    let router = MessageRouter::bind(router_config, presence, notif_tx).await?;

    let transport = if args.stdio {
        frontend_ipc::FrontEndTransport::Stdio
    } else {
        frontend_ipc::FrontEndTransport::Fifo {
            to_network: args.cmd_pipe.clone(),
            to_frontend: args.notif_pipe.clone(),
        }
    };
    frontend_ipc::spawn(transport, cmd_tx.clone(), notif_rx, shutdown.clone());

    // Announce ourselves exactly as the front-end's own JOIN command would,
    // matching the original tool's "send_join" call at network-process
    // startup.
    cmd_tx
        .send(Command::Join {
            handle: config.handle.clone(),
            port: config.port(),
        })
        .await
        .ok();

    let discovery_handle = {
        let shutdown = shutdown.clone();
        tokio::spawn(discovery::run(config.whoisport, shutdown))
    };

    serve(router, cmd_rx, discovery_handle, shutdown, config.handle.clone()).await
}

async fn serve(
    router: MessageRouter,
    mut cmd_rx: mpsc::Receiver<Command>,
    discovery_handle: tokio::task::JoinHandle<Result<(), EngineError>>,
    shutdown: CancellationToken,
    own_handle: lanchat_types::Handle,
) -> anyhow::Result<()> {
    let router = std::sync::Arc::new(router);
    let receive_loop = {
        let router = router.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move { router.run(shutdown).await })
    };

    let command_loop = {
        let router = router.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    cmd = cmd_rx.recv() => {
                        let Some(cmd) = cmd else { return };
                        if let Err(e) = router.handle_command(cmd).await {
                            warn!("failed handling front-end command: {e}");
                        }
                    }
                }
            }
        })
    };

    wait_for_shutdown_signal().await;
    info!("shutdown signal received; broadcasting LEAVE");
    if let Err(e) = router.handle_command(Command::Leave { handle: own_handle }).await {
        warn!("failed to broadcast LEAVE during shutdown: {e}");
    }

    shutdown.cancel();
    let _ = receive_loop.await;
    let _ = command_loop.await;
    let _ = discovery_handle.await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
