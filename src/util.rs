//! Internal utilities.

use std::io;
use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Create and bind a UDP socket with proper IPv6 configuration.
///
/// IPv6 sockets get `IPV6_V6ONLY = true` so they never see IPv4-mapped
/// addresses; the registry would otherwise key the same device two ways.
/// Reuse-address is set for quick restarts.
pub(crate) async fn bind_udp_socket(addr: SocketAddr) -> io::Result<UdpSocket> {
    let domain = if addr.is_ipv6() {
        Domain::IPV6
    } else {
        Domain::IPV4
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;

    if addr.is_ipv6() {
        socket.set_only_v6(true)?;
    }

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;

    UdpSocket::from_std(socket.into())
}

/// Create an ephemeral UDP socket matching the target's address family.
pub(crate) async fn bind_ephemeral_udp_socket(target: SocketAddr) -> io::Result<UdpSocket> {
    let bind_addr: SocketAddr = if target.is_ipv6() {
        "[::]:0".parse().unwrap()
    } else {
        "0.0.0.0:0".parse().unwrap()
    };

    bind_udp_socket(bind_addr).await
}

/// Lowercase hex encoding.
pub fn encode_hex(data: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(data.len() * 2);
    for &byte in data {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0F) as usize] as char);
    }
    out
}

/// Interpret a listen address, allowing the bare `:PORT` shorthand.
pub(crate) fn parse_listen_addr(addr: &str) -> Option<SocketAddr> {
    if let Some(port) = addr.strip_prefix(':') {
        let port: u16 = port.parse().ok()?;
        return Some(SocketAddr::from(([0, 0, 0, 0], port)));
    }
    addr.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_udp_socket_ipv4() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let socket = bind_udp_socket(addr).await.unwrap();
        let local = socket.local_addr().unwrap();
        assert!(local.is_ipv4());
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn bind_ephemeral_matches_family() {
        let target: SocketAddr = "192.0.2.1:161".parse().unwrap();
        let socket = bind_ephemeral_udp_socket(target).await.unwrap();
        assert!(socket.local_addr().unwrap().is_ipv4());
    }

    #[test]
    fn hex_encoding() {
        assert_eq!(encode_hex(&[]), "");
        assert_eq!(encode_hex(&[0x00, 0xFF, 0x1A]), "00ff1a");
    }

    #[test]
    fn listen_addr_shorthand() {
        assert_eq!(
            parse_listen_addr(":9162"),
            Some("0.0.0.0:9162".parse().unwrap())
        );
        assert_eq!(
            parse_listen_addr("127.0.0.1:1162"),
            Some("127.0.0.1:1162".parse().unwrap())
        );
        assert_eq!(parse_listen_addr("not-an-addr"), None);
    }
}
