//! The per-peer Message Router: owns the peer's bound UDP socket, dispatches
//! inbound datagrams to the Image Transfer and Presence subsystems, and
//! translates front-end IPC commands into Transport sends.
//!
//! Own-handle filtering reuses the single `is_own_handle` helper below —
//! the Discovery Engine and Presence Controller do not need their own copy
//! (SPEC_FULL.md §9).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tokio::fs;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use lanchat_codec::{decode_frame, encode_frame, Frame};
use lanchat_types::{Handle, PeerAddress, Roster};

use crate::error::EngineError;
use crate::image::{self, ImageTransferTable};
use crate::ipc::{Command, Notification};
use crate::presence::{InboundOutcome, PresenceController};
use crate::transport::{Transport, MAX_DATAGRAM};

/// How often the image-transfer table is swept for idle entries.
const TRANSFER_SWEEP_INTERVAL: Duration = Duration::from_secs(15);

pub struct RouterConfig {
    pub own_handle: Handle,
    pub own_port: u16,
    pub whoisport: u16,
    pub image_dir: PathBuf,
    pub chunk_size: usize,
}

/// Returns true if `handle` is this router's own handle.
pub fn is_own_handle(own: &Handle, handle: &Handle) -> bool {
    own == handle
}

pub struct MessageRouter {
    config: RouterConfig,
    transport: Transport,
    roster: Mutex<Roster>,
    images: Mutex<ImageTransferTable>,
    presence: PresenceController,
    notify_tx: mpsc::Sender<Notification>,
}

impl MessageRouter {
    pub async fn bind(config: RouterConfig, presence: PresenceController, notify_tx: mpsc::Sender<Notification>) -> Result<Self, EngineError> {
        let transport = Transport::bind(config.own_port).await?;
        Ok(Self {
            config,
            transport,
            roster: Mutex::new(Roster::new()),
            images: Mutex::new(ImageTransferTable::new()),
            presence,
            notify_tx,
        })
    }

    pub async fn roster_snapshot(&self) -> Vec<(Handle, PeerAddress)> {
        self.roster.lock().await.snapshot()
    }

    async fn notify(&self, n: Notification) {
        if self.notify_tx.send(n).await.is_err() {
            warn!("front-end notification channel closed; dropping notification");
        }
    }

    /// Run the inbound receive loop and the periodic stale-transfer sweep
    /// concurrently until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), EngineError> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let mut sweep = tokio::time::interval(TRANSFER_SWEEP_INTERVAL);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("message router shutting down");
                    return Ok(());
                }
                _ = sweep.tick() => {
                    let evicted = self.images.lock().await.sweep_stale();
                    if evicted > 0 {
                        debug!("evicted {evicted} stale image transfer(s)");
                    }
                }
                res = self.transport.recv(&mut buf) => {
                    let (len, src) = res?;
                    self.handle_datagram(&buf[..len], src).await;
                }
            }
        }
    }

    async fn handle_datagram(&self, data: &[u8], src: SocketAddr) {
        let frame = match decode_frame(data) {
            Ok(f) => f,
            Err(e) => {
                trace!("router dropped malformed datagram from {src}: {e}");
                return;
            }
        };

        match frame {
            Frame::KnownUsers(entries) => {
                let mut roster = self.roster.lock().await;
                roster.merge_known_users(&self.config.own_handle, entries);
                let snapshot = roster.snapshot();
                drop(roster);
                write_known_users_snapshot(&snapshot).await;
                self.notify(Notification::KnownUsers(snapshot)).await;
            }
            Frame::Join { handle, port } => {
                if is_own_handle(&self.config.own_handle, &handle) {
                    return;
                }
                let SocketAddr::V4(src_v4) = src else { return };
                self.roster
                    .lock()
                    .await
                    .upsert(&self.config.own_handle, handle.clone(), PeerAddress::new(*src_v4.ip(), port));
                self.notify(Notification::Join(handle)).await;
            }
            Frame::Leave { handle } => {
                if is_own_handle(&self.config.own_handle, &handle) {
                    return;
                }
                self.roster.lock().await.remove(&handle);
                self.notify(Notification::Leave(handle)).await;
            }
            Frame::Msg { sender, text } => {
                if is_own_handle(&self.config.own_handle, &sender) {
                    return;
                }
                self.handle_inbound_msg(sender, text, src).await;
            }
            Frame::ImgStart { sender, filename, total_chunks } => {
                self.images.lock().await.on_img_start(src, sender, filename, total_chunks);
            }
            Frame::Chunk { index, bytes } => {
                self.images.lock().await.on_chunk(src, index, bytes);
            }
            Frame::ImgEnd => {
                match self.images.lock().await.on_img_end(src, &self.config.image_dir).await {
                    Ok(finalized) => {
                        for item in finalized {
                            self.notify(Notification::Img { sender: item.sender, filename: item.filename }).await;
                        }
                    }
                    Err(e) => warn!("failed finalizing image transfer from {src}: {e}"),
                }
            }
            Frame::Who => {
                debug!("router ignoring WHO received on the peer port from {src}");
            }
        }
    }

    async fn handle_inbound_msg(&self, sender: Handle, text: String, src: SocketAddr) {
        match self.presence.on_inbound_msg(&sender, &text).await {
            Ok(InboundOutcome::Deliver) => {
                self.notify(Notification::Msg { sender, text }).await;
            }
            Ok(InboundOutcome::Logged { send_autoreply: Some(autoreply_text) }) => {
                let reply = Frame::Msg {
                    sender: self.config.own_handle.clone(),
                    text: autoreply_text,
                };
                self.transport.send_to_peer(&encode_frame(&reply), peer_address_of(src)).await;
            }
            Ok(InboundOutcome::Logged { send_autoreply: None }) => {}
            Err(e) => warn!("presence controller failed on inbound MSG from {sender}: {e}"),
        }
    }

    /// Service one front-end command, per SPEC_FULL.md §4.4/§4.6.
    pub async fn handle_command(&self, command: Command) -> Result<(), EngineError> {
        match command {
            Command::Join { handle, port } => {
                let frame = Frame::Join { handle, port };
                self.transport.broadcast(&encode_frame(&frame), self.config.whoisport).await;
            }
            Command::Leave { handle } => {
                let frame = Frame::Leave { handle: handle.clone() };
                self.transport.broadcast(&encode_frame(&frame), self.config.whoisport).await;
                self.notify(Notification::LeaveAck(handle)).await;
            }
            Command::Who => {
                self.transport.broadcast(&encode_frame(&Frame::Who), self.config.whoisport).await;
            }
            Command::SendMsg { to, text } => {
                self.send_msg(&to, &text).await;
            }
            Command::SendImage { to, filepath, size_bytes } => {
                self.send_image(&to, &filepath, size_bytes).await;
            }
            Command::SetAway(true) => {
                let autoreply = self.presence.go_offline().await?;
                self.broadcast_to_roster(&autoreply).await;
            }
            Command::SetAway(false) => {
                let drained = self.presence.go_online().await?;
                for line in &drained {
                    if let Some((sender, text)) = line.split_once(": ") {
                        self.notify(Notification::Msg {
                            sender: Handle::new(sender).unwrap_or_else(|_| self.config.own_handle.clone()),
                            text: text.to_string(),
                        })
                        .await;
                    }
                }
                self.broadcast_to_roster("I am back").await;
            }
            Command::SetAutoreply(text) => {
                self.presence.set_autoreply(text).await;
            }
        }
        Ok(())
    }

    async fn send_msg(&self, to: &Handle, text: &str) {
        let target = self.roster.lock().await.get(to);
        match target {
            Some(addr) => {
                let frame = Frame::Msg {
                    sender: self.config.own_handle.clone(),
                    text: text.to_string(),
                };
                self.transport.send_to_peer(&encode_frame(&frame), addr).await;
            }
            None => {
                warn!("UnknownRecipient: no roster entry for handle {to:?}; SEND_MSG dropped");
            }
        }
    }

    async fn send_image(&self, to: &Handle, filepath: &str, size_bytes: u64) {
        let target = self.roster.lock().await.get(to);
        let Some(target) = target else {
            warn!("UnknownRecipient: no roster entry for handle {to:?}; SEND_IMAGE dropped");
            return;
        };

        let data = match fs::read(filepath).await {
            Ok(d) => d,
            Err(e) => {
                warn!("failed to read image file {filepath:?}: {e}");
                return;
            }
        };
        if data.len() as u64 != size_bytes {
            debug!(
                "SEND_IMAGE declared size {size_bytes} does not match actual file size {}; using actual bytes",
                data.len()
            );
        }
        let filename = image::basename(filepath);
        image::send_image(
            &self.transport,
            target,
            &self.config.own_handle,
            &filename,
            &data,
            self.config.chunk_size,
        )
        .await;
    }

    async fn broadcast_to_roster(&self, text: &str) {
        let entries: Vec<(Handle, PeerAddress)> = self.roster.lock().await.snapshot();
        let frame = Frame::Msg {
            sender: self.config.own_handle.clone(),
            text: text.to_string(),
        };
        let bytes = encode_frame(&frame);
        for (handle, addr) in entries {
            if !is_own_handle(&self.config.own_handle, &handle) {
                self.transport.send_to_peer(&bytes, addr).await;
            }
        }
    }
}

fn peer_address_of(src: SocketAddr) -> PeerAddress {
    match src {
        SocketAddr::V4(v4) => PeerAddress::new(*v4.ip(), v4.port()),
        SocketAddr::V6(_) => PeerAddress::new(std::net::Ipv4Addr::UNSPECIFIED, 0),
    }
}

/// File name of the best-effort roster snapshot (SPEC_FULL.md §6, "Persisted
/// state layout"), written on every KNOWNUSERS merge. Mirrors the original
/// tool's `save_known_users`; never read back by the core.
const KNOWN_USERS_SNAPSHOT_FILE: &str = "known_users.json";

async fn write_known_users_snapshot(entries: &[(Handle, PeerAddress)]) {
    let map: BTreeMap<String, PeerAddress> = entries
        .iter()
        .map(|(handle, addr)| (handle.to_string(), *addr))
        .collect();
    let json = match serde_json::to_vec(&map) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("failed to serialize known_users snapshot: {e}");
            return;
        }
    };
    if let Err(e) = fs::write(KNOWN_USERS_SNAPSHOT_FILE, json).await {
        warn!("failed to write {KNOWN_USERS_SNAPSHOT_FILE}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanchat_codec::decode_frame;
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::net::UdpSocket;

    fn h(s: &str) -> Handle {
        Handle::new(s).unwrap()
    }

    async fn router_with(own: &str, dir: &std::path::Path) -> (MessageRouter, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(32);
        let presence = PresenceController::new(dir.join("away.flag"), dir.join("offline.txt"), "brb".to_string());
        let config = RouterConfig {
            own_handle: h(own),
            own_port: 0,
            whoisport: 0,
            image_dir: dir.join("receive"),
            chunk_size: 1024,
        };
        let router = MessageRouter::bind(config, presence, tx).await.unwrap();
        (router, rx)
    }

    #[tokio::test]
    async fn unknown_recipient_send_msg_emits_nothing_on_wire() {
        let dir = tempdir().unwrap();
        let (router, _rx) = router_with("alice", dir.path()).await;
        router.handle_command(Command::SendMsg { to: h("ghost"), text: "hi".into() }).await.unwrap();
        // No panic, no roster entry created, nothing to assert on the wire
        // since Transport::send_to_peer is never reached for unknown
        // recipients — exercised by `send_msg` returning early.
        assert!(router.roster_snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn inbound_join_updates_roster_and_notifies() {
        let dir = tempdir().unwrap();
        let (router, mut rx) = router_with("alice", dir.path()).await;

        let peer_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_port = peer_sock.local_addr().unwrap().port();
        let router_addr = router_local_addr(&router).await;

        let frame = Frame::Join { handle: h("bob"), port: peer_port };
        peer_sock.send_to(&encode_frame(&frame), router_addr).await.unwrap();

        let router_task = async { router.run(CancellationToken::new()).await };
        let notif = tokio::select! {
            n = rx.recv() => n,
            _ = router_task => None,
        };
        assert_eq!(notif, Some(Notification::Join(h("bob"))));
        assert!(router.roster_snapshot().await.iter().any(|(handle, _)| handle == &h("bob")));
    }

    #[tokio::test]
    async fn send_msg_to_known_recipient_is_received_on_wire() {
        let dir = tempdir().unwrap();
        let (router, _rx) = router_with("alice", dir.path()).await;

        let peer_sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let peer_port = peer_sock.local_addr().unwrap().port();
        router
            .roster
            .lock()
            .await
            .upsert(&h("alice"), h("bob"), PeerAddress::new(std::net::Ipv4Addr::LOCALHOST, peer_port));

        router.handle_command(Command::SendMsg { to: h("bob"), text: "hello".into() }).await.unwrap();

        let mut buf = [0u8; 256];
        let (n, _) = tokio::time::timeout(Duration::from_secs(1), peer_sock.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let frame = decode_frame(&buf[..n]).unwrap();
        assert_eq!(frame, Frame::Msg { sender: h("alice"), text: "hello".into() });
    }

    #[tokio::test]
    async fn away_then_online_drains_offline_log_to_frontend() {
        let dir = tempdir().unwrap();
        let (router, mut rx) = router_with("alice", dir.path()).await;
        router.handle_command(Command::SetAway(true)).await.unwrap();

        let from_addr: SocketAddr = "10.0.0.9:9999".parse().unwrap();
        router.handle_inbound_msg(h("bob"), "hi".into(), from_addr).await;
        router.handle_inbound_msg(h("bob"), "still there?".into(), from_addr).await;

        router.handle_command(Command::SetAway(false)).await.unwrap();

        let mut seen = Vec::new();
        while let Ok(n) = tokio::time::timeout(Duration::from_millis(50), rx.recv()).await {
            seen.push(n.unwrap());
        }
        assert!(seen.contains(&Notification::Msg { sender: h("bob"), text: "hi".into() }));
        assert!(seen.contains(&Notification::Msg { sender: h("bob"), text: "still there?".into() }));
    }

    async fn router_local_addr(router: &MessageRouter) -> SocketAddr {
        router.transport.shared_socket().local_addr().unwrap()
    }

    #[tokio::test]
    async fn known_users_merge_writes_a_snapshot_file() {
        let dir = tempdir().unwrap();
        let original_cwd = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let entries = vec![(h("bob"), PeerAddress::new(std::net::Ipv4Addr::new(10, 0, 0, 2), 5002))];
        write_known_users_snapshot(&entries).await;

        let contents = std::fs::read_to_string(KNOWN_USERS_SNAPSHOT_FILE).unwrap();
        assert!(contents.contains("bob"));
        assert!(contents.contains("5002"));

        std::env::set_current_dir(original_cwd).unwrap();
    }
}
