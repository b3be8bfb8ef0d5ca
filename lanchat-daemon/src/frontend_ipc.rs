//! Concrete transport for the front-end IPC surface (SPEC_FULL.md §4.7).
//!
//! Two shapes are supported, mirroring the original tool's
//! `cli_to_network.pipe` / `network_to_cli.pipe` pair and its
//! self-healing "recreate the pipe on write failure" behavior:
//!
//! - [`FrontEndTransport::Fifo`]: a pair of named FIFOs (Unix only).
//! - [`FrontEndTransport::Stdio`]: the process's own stdin/stdout, for a
//!   front-end spawned as this process's direct parent/child.
//!
//! This module owns no protocol knowledge — it only turns lines into
//! `Command`s and `Notification`s into lines, via `lanchat_core::ipc`.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lanchat_core::ipc::{parse_command, Command, Notification};

#[derive(Debug, Clone)]
pub enum FrontEndTransport {
    Stdio,
    Fifo { to_network: PathBuf, to_frontend: PathBuf },
}

#[cfg(unix)]
fn recreate_fifo(path: &Path) -> std::io::Result<()> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    nix::unistd::mkfifo(path, nix::sys::stat::Mode::S_IRUSR | nix::sys::stat::Mode::S_IWUSR)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
}

#[cfg(not(unix))]
fn recreate_fifo(_path: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "named-pipe front-end transport requires a Unix target",
    ))
}

/// Spawn the reader (front-end → core) and writer (core → front-end) tasks.
/// Returns once both are spawned; they run until `shutdown` is cancelled.
pub fn spawn(
    transport: FrontEndTransport,
    cmd_tx: mpsc::Sender<Command>,
    notif_rx: mpsc::Receiver<Notification>,
    shutdown: CancellationToken,
) {
    match transport {
        FrontEndTransport::Stdio => {
            tokio::spawn(reader_loop_stdio(cmd_tx, shutdown.clone()));
            tokio::spawn(writer_loop_stdio(notif_rx, shutdown));
        }
        FrontEndTransport::Fifo { to_network, to_frontend } => {
            tokio::spawn(reader_loop_fifo(to_network, cmd_tx, shutdown.clone()));
            tokio::spawn(writer_loop_fifo(to_frontend, notif_rx, shutdown));
        }
    }
}

async fn reader_loop_stdio(cmd_tx: mpsc::Sender<Command>, shutdown: CancellationToken) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => dispatch_line(&line, &cmd_tx).await,
                    Ok(None) => {
                        info!("front-end stdin closed");
                        return;
                    }
                    Err(e) => {
                        error!("front-end stdin read error: {e}");
                        return;
                    }
                }
            }
        }
    }
}

async fn writer_loop_stdio(mut notif_rx: mpsc::Receiver<Notification>, shutdown: CancellationToken) {
    let mut stdout = tokio::io::stdout();
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            notif = notif_rx.recv() => {
                let Some(notif) = notif else { return };
                let line = format!("{}\n", notif.to_line());
                if let Err(e) = stdout.write_all(line.as_bytes()).await {
                    error!("front-end stdout write failed: {e}");
                }
            }
        }
    }
}

async fn reader_loop_fifo(path: PathBuf, cmd_tx: mpsc::Sender<Command>, shutdown: CancellationToken) {
    if let Err(e) = recreate_fifo(&path) {
        error!("failed to create front-end-to-core FIFO {path:?}: {e}");
        return;
    }
    loop {
        if shutdown.is_cancelled() {
            return;
        }
        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(e) => {
                error!("failed to open {path:?} for reading: {e}");
                return;
            }
        };
        let mut lines = BufReader::new(file).lines();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => dispatch_line(&line, &cmd_tx).await,
                        Ok(None) => break, // writer closed; reopen to accept the next one
                        Err(e) => {
                            warn!("front-end pipe read error: {e}; recreating");
                            if let Err(e) = recreate_fifo(&path) {
                                error!("failed to recreate {path:?}: {e}");
                                return;
                            }
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn writer_loop_fifo(path: PathBuf, mut notif_rx: mpsc::Receiver<Notification>, shutdown: CancellationToken) {
    if let Err(e) = recreate_fifo(&path) {
        error!("failed to create core-to-front-end FIFO {path:?}: {e}");
        return;
    }
    'outer: loop {
        if shutdown.is_cancelled() {
            return;
        }
        let mut file = match tokio::fs::OpenOptions::new().write(true).open(&path).await {
            Ok(f) => f,
            Err(e) => {
                error!("failed to open {path:?} for writing: {e}");
                return;
            }
        };
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                notif = notif_rx.recv() => {
                    let Some(notif) = notif else { return };
                    let line = format!("{}\n", notif.to_line());
                    if let Err(e) = file.write_all(line.as_bytes()).await {
                        warn!("front-end pipe write failed: {e}; recreating endpoint");
                        if let Err(e) = recreate_fifo(&path) {
                            error!("failed to recreate {path:?}: {e}");
                            return;
                        }
                        continue 'outer;
                    }
                }
            }
        }
    }
}

async fn dispatch_line(line: &str, cmd_tx: &mpsc::Sender<Command>) {
    if line.trim().is_empty() {
        return;
    }
    match parse_command(line) {
        Ok(cmd) => {
            if cmd_tx.send(cmd).await.is_err() {
                warn!("command channel closed; dropping front-end command {line:?}");
            }
        }
        Err(e) => warn!("ignoring malformed front-end command {line:?}: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dispatch_forwards_a_well_formed_command() {
        let (tx, mut rx) = mpsc::channel(4);
        dispatch_line("WHO", &tx).await;
        assert_eq!(rx.recv().await, Some(Command::Who));
    }

    #[tokio::test]
    async fn dispatch_drops_malformed_lines_silently() {
        let (tx, mut rx) = mpsc::channel(4);
        dispatch_line("NONSENSE", &tx).await;
        dispatch_line("", &tx).await;
        drop(tx);
        assert_eq!(rx.recv().await, None);
    }
}
