//! UDP endpoint for the transport session.
//!
//! Sockets are built with `socket2` and bound exclusively: a port held by
//! another socket fails with `AddrInUse`, which the transport loop treats
//! like any other bind failure and retries later. The result is converted
//! into a plain [`std::net::UdpSocket`] with a read timeout, so `recv_from`
//! wakes regularly and the transport thread can notice shutdown.

pub mod mock;

use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::debug;

use crate::application::ports::{DatagramSocket, SocketFactory};

/// Creates bound OS UDP sockets.
#[derive(Debug, Clone)]
pub struct UdpSocketFactory {
    recv_timeout: Duration,
}

impl UdpSocketFactory {
    /// `recv_timeout` bounds each `recv_from` call.
    pub fn new(recv_timeout: Duration) -> Self {
        Self { recv_timeout }
    }
}

impl SocketFactory for UdpSocketFactory {
    fn bind(&self, addr: SocketAddrV4) -> io::Result<Arc<dyn DatagramSocket>> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.bind(&SocketAddr::V4(addr).into())?;

        let socket: UdpSocket = socket.into();
        socket.set_read_timeout(Some(self.recv_timeout))?;
        debug!("udp socket bound on {addr}");
        Ok(Arc::new(OsDatagramSocket(socket)))
    }
}

struct OsDatagramSocket(UdpSocket);

impl DatagramSocket for OsDatagramSocket {
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.0.recv_from(buf)
    }

    fn send_to(&self, buf: &[u8], dest: SocketAddrV4) -> io::Result<usize> {
        self.0.send_to(buf, dest)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.0.local_addr()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_bound_socket_exchanges_datagrams_on_loopback() {
        // Arrange
        let factory = UdpSocketFactory::new(Duration::from_millis(500));
        let any = SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0);
        let a = factory.bind(any).expect("bind a");
        let b = factory.bind(any).expect("bind b");
        let SocketAddr::V4(b_addr) = b.local_addr().expect("local addr") else {
            panic!("expected an IPv4 address");
        };

        // Act
        a.send_to(b"ping", b_addr).expect("send");
        let mut buf = [0u8; 16];
        let (len, from) = b.recv_from(&mut buf).expect("recv");

        // Assert
        assert_eq!(&buf[..len], b"ping");
        assert_eq!(from, a.local_addr().expect("local addr"));
    }

    #[test]
    fn test_idle_receive_times_out() {
        // Arrange
        let factory = UdpSocketFactory::new(Duration::from_millis(20));
        let socket = factory
            .bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .expect("bind");

        // Act
        let err = socket.recv_from(&mut [0u8; 8]).expect_err("nothing was sent");

        // Assert
        assert!(matches!(
            err.kind(),
            io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
        ));
    }

    #[test]
    fn test_second_bind_on_occupied_port_fails() {
        // Arrange
        let factory = UdpSocketFactory::new(Duration::from_millis(20));
        let first = factory
            .bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .expect("bind");
        let SocketAddr::V4(taken) = first.local_addr().expect("local addr") else {
            panic!("expected an IPv4 address");
        };

        // Act
        let second = factory.bind(taken);

        // Assert
        let err = second.err().expect("port is already bound");
        assert_eq!(err.kind(), io::ErrorKind::AddrInUse);
    }
}
