//! Discovery Engine: the JOIN/LEAVE/WHO/KNOWNUSERS state machine run on the
//! well-known discovery port.
//!
//! Unlike the Message Router's roster, the discovery roster is not "a
//! peer's own view of who else is live" — it is the shared directory every
//! peer's JOIN registers itself into, so it legitimately contains every
//! handle including the local peer's. It therefore does not reuse
//! [`lanchat_types::Roster`], whose own-handle exclusion invariant only
//! makes sense for a participant's view of *other* peers.
//!
//! The engine runs as a single task with no internal mutex: one receive
//! loop owns the map outright, matching the original tool's single-threaded
//! discovery process.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use lanchat_codec::{decode_frame, encode_frame, Frame};
use lanchat_types::{Handle, PeerAddress};

use crate::error::EngineError;
use crate::transport::{Transport, MAX_DATAGRAM};

/// Run the Discovery Engine until `shutdown` is triggered or the transport
/// hits a fatal error.
pub async fn run(whoisport: u16, shutdown: CancellationToken) -> Result<(), EngineError> {
    let transport = Transport::bind(whoisport).await?;
    info!("discovery engine listening on port {whoisport}");
    let mut known_users: HashMap<Handle, PeerAddress> = HashMap::new();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        let (len, src) = tokio::select! {
            _ = shutdown.cancelled() => {
                info!("discovery engine shutting down");
                return Ok(());
            }
            res = transport.recv(&mut buf) => res?,
        };

        let SocketAddr::V4(src_v4) = src else {
            warn!("dropping non-IPv4 datagram from {src}");
            continue;
        };
        let source_ip = *src_v4.ip();

        let frame = match decode_frame(&buf[..len]) {
            Ok(f) => f,
            Err(e) => {
                trace!("discovery engine dropped malformed datagram from {src}: {e}");
                continue;
            }
        };

        match frame {
            Frame::Join { handle, port } => {
                handle_join(&transport, &mut known_users, handle, port, source_ip).await;
            }
            Frame::Leave { handle } => {
                handle_leave(&transport, &mut known_users, handle).await;
            }
            Frame::Who => {
                handle_who(&transport, &known_users, source_ip).await;
            }
            other => {
                debug!("discovery engine ignoring frame {other:?} from {src}");
            }
        }
    }
}

async fn handle_join(
    transport: &Transport,
    known_users: &mut HashMap<Handle, PeerAddress>,
    handle: Handle,
    port: u16,
    source_ip: std::net::Ipv4Addr,
) {
    let addr = PeerAddress::new(source_ip, port);
    known_users.insert(handle.clone(), addr);

    let fanout = Frame::Join {
        handle: handle.clone(),
        port,
    };
    let bytes = encode_frame(&fanout);
    for (other_handle, other_addr) in known_users.iter() {
        if other_handle != &handle {
            transport.send_to_peer(&bytes, *other_addr).await;
        }
    }
}

async fn handle_leave(
    transport: &Transport,
    known_users: &mut HashMap<Handle, PeerAddress>,
    handle: Handle,
) {
    if known_users.remove(&handle).is_none() {
        // Idempotent: a second LEAVE for the same handle is a no-op.
        return;
    }
    let fanout = Frame::Leave { handle };
    let bytes = encode_frame(&fanout);
    for other_addr in known_users.values() {
        transport.send_to_peer(&bytes, *other_addr).await;
    }
}

async fn handle_who(
    transport: &Transport,
    known_users: &HashMap<Handle, PeerAddress>,
    source_ip: std::net::Ipv4Addr,
) {
    let Some((_, requester_addr)) = known_users.iter().find(|(_, a)| a.ip == source_ip) else {
        // The requester must JOIN before WHO is answered.
        return;
    };
    let listing: Vec<(Handle, PeerAddress)> = known_users
        .iter()
        .map(|(h, a)| (h.clone(), *a))
        .collect();
    let reply = Frame::KnownUsers(listing);
    transport.send_to_peer(&encode_frame(&reply), *requester_addr).await;
}
