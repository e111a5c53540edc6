//! Blocking UDP transport adapter.
//!
//! Wraps a bound `UdpSocket`, exposing a send-to-peer and a
//! bounded-wait receive-from-peer. Fatal socket failures are reported
//! through `Error::Io`; the engine treats them as terminal.

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use crate::err::Result;

pub enum Recv {
    Datagram(Vec<u8>, SocketAddr),
    Timeout,
}

pub struct Transport {
    socket: UdpSocket,
}

impl Transport {
    pub fn bind(local: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(local)?;
        Ok(Transport { socket })
    }

    pub fn send(&self, bytes: &[u8], peer: SocketAddr) -> Result<()> {
        self.socket.send_to(bytes, peer)?;
        Ok(())
    }

    /// Wait up to `timeout` for one datagram. `None` blocks forever,
    /// matching the receiver's purely reactive event loop (`spec.md` §4.6).
    pub fn recv(&self, timeout: Option<Duration>) -> Result<Recv> {
        self.socket.set_read_timeout(timeout)?;

        let mut buf = [0u8; 65536];
        match self.socket.recv_from(&mut buf) {
            Ok((n, from)) => Ok(Recv::Datagram(buf[..n].to_vec(), from)),
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                Ok(Recv::Timeout)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}
