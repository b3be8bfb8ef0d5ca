//! One bound UDP socket per peer, plus the broadcast helper used for
//! discovery traffic (JOIN/LEAVE/WHO).
//!
//! Mirrors the teacher's `NetworkNode::start`/`send_to` split: a single
//! long-lived socket for the receive loop, shared via `Arc`, and a thin
//! serialize-and-send helper for outbound datagrams.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{error, warn};

use lanchat_types::PeerAddress;

use crate::error::EngineError;

/// Receive buffer floor requested on every bound socket (64 KiB).
const RECV_BUFFER_BYTES: usize = 64 * 1024;
/// Largest datagram the codec promises to handle.
pub const MAX_DATAGRAM: usize = 65535;
/// Receive-loop backoff after a transient error, and the attempt count
/// tolerated before the error is escalated to fatal.
const RECV_BACKOFF: Duration = Duration::from_millis(50);
const RECV_MAX_TRANSIENT_RETRIES: u32 = 5;

pub const BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::new(255, 255, 255, 255);

/// A bound UDP endpoint used for both unicast peer traffic and broadcast
/// discovery traffic.
pub struct Transport {
    socket: Arc<UdpSocket>,
}

impl Transport {
    /// Bind to `0.0.0.0:port` with broadcast enabled and a best-effort
    /// enlarged receive buffer.
    pub async fn bind(port: u16) -> Result<Self, EngineError> {
        let raw = Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(EngineError::Io)?;
        raw.set_reuse_address(true).ok();
        raw.set_broadcast(true).map_err(EngineError::Io)?;
        if let Err(e) = raw.set_recv_buffer_size(RECV_BUFFER_BYTES) {
            warn!("could not enlarge receive buffer on port {port}: {e}");
        }
        let addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into();
        raw.bind(&addr.into()).map_err(EngineError::Io)?;
        raw.set_nonblocking(true).map_err(EngineError::Io)?;
        let std_socket: std::net::UdpSocket = raw.into();
        let socket = UdpSocket::from_std(std_socket).map_err(EngineError::Io)?;
        Ok(Self {
            socket: Arc::new(socket),
        })
    }

    pub fn shared_socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    /// Send raw bytes to a specific peer. Failures are logged and do not
    /// propagate — callers treat a send as best-effort, per SPEC_FULL.md §4.2.
    pub async fn send_to_peer(&self, bytes: &[u8], target: PeerAddress) {
        let addr: SocketAddr = target.into();
        if let Err(e) = self.socket.send_to(bytes, addr).await {
            warn!("send to {addr} failed: {e}");
        }
    }

    /// Broadcast raw bytes to the IPv4 limited broadcast address on `port`
    /// (used for JOIN/LEAVE/WHO against the discovery port).
    pub async fn broadcast(&self, bytes: &[u8], port: u16) {
        let addr = SocketAddr::V4(SocketAddrV4::new(BROADCAST_ADDR, port));
        if let Err(e) = self.socket.send_to(bytes, addr).await {
            warn!("broadcast to {addr} failed: {e}");
        }
    }

    /// Receive one datagram, retrying transient errors with a short backoff
    /// before escalating to [`EngineError::Io`] (treated as fatal by callers).
    pub async fn recv(&self, buf: &mut [u8]) -> Result<(usize, SocketAddr), EngineError> {
        let mut attempts = 0;
        loop {
            match self.socket.recv_from(buf).await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    attempts += 1;
                    if attempts > RECV_MAX_TRANSIENT_RETRIES {
                        error!("UDP recv failed permanently after {attempts} attempts: {e}");
                        return Err(EngineError::Io(e));
                    }
                    warn!("UDP recv error (attempt {attempts}): {e}");
                    tokio::time::sleep(RECV_BACKOFF).await;
                }
            }
        }
    }
}
