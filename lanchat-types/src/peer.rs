//! Peer network address.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use serde::{Deserialize, Serialize};

/// An IPv4 address plus the UDP port a peer is listening on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> Self {
        Self { ip, port }
    }
}

impl From<PeerAddress> for SocketAddr {
    fn from(p: PeerAddress) -> Self {
        SocketAddr::V4(SocketAddrV4::new(p.ip, p.port))
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_socket_addr() {
        let p = PeerAddress::new(Ipv4Addr::new(192, 168, 1, 7), 5001);
        let sa: SocketAddr = p.into();
        assert_eq!(sa.port(), 5001);
        assert_eq!(sa.ip().to_string(), "192.168.1.7");
    }

    #[test]
    fn display_matches_knownusers_entry_shape() {
        let p = PeerAddress::new(Ipv4Addr::new(10, 0, 0, 1), 6001);
        assert_eq!(p.to_string(), "10.0.0.1 6001");
    }
}
