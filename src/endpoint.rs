//! The datagram transport this protocol runs over.
//!
//! A thin contract over a bound socket: send to a peer, receive with an
//! optional deadline. The protocol's state machines only ever see this
//! trait, never `UdpSocket` directly, so a test harness can substitute a
//! lossy/reordering double (see `tests/`).

use crate::config::MAX_PACKET_SIZE;
use crate::error::{Error, Result};
use log::trace;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

/// The result of a bounded-wait receive.
pub enum Recv {
    Datagram(Vec<u8>, SocketAddr),
    Timeout,
}

/// Send/receive primitive for one bound local address.
///
/// `recv` blocks indefinitely when `deadline` is `None`, and returns
/// [`Recv::Timeout`] if nothing arrives before `deadline` when it is
/// `Some`.
pub trait DatagramEndpoint {
    fn send_to(&self, bytes: &[u8], peer: SocketAddr) -> Result<()>;
    fn recv(&self, deadline: Option<Instant>) -> Result<Recv>;

    /// Discards whatever is sitting in the receive buffer right now,
    /// without blocking. Used before SYNC to shed datagrams left over
    /// from a prior, unrelated session on the same socket.
    fn drain(&self) {
        let now = Instant::now();
        while let Ok(Recv::Datagram(_, _)) = self.recv(Some(now)) {}
    }
}

/// A `DatagramEndpoint` backed by `std::net::UdpSocket`.
pub struct UdpEndpoint {
    socket: UdpSocket,
}

impl UdpEndpoint {
    /// Binds a new endpoint at `addr`.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let socket = UdpSocket::bind(addr)?;
        Ok(UdpEndpoint { socket })
    }

    /// Rebinds to a fresh socket at the same local address.
    ///
    /// Called by the receiver path between sessions so that any stray
    /// datagram belonging to a just-finished transfer cannot bleed into
    /// the next one (spec §4.5).
    pub fn rebind(&mut self) -> Result<()> {
        let local = self.socket.local_addr()?;
        // Drop the old socket before binding the new one, or the bind
        // below races the old socket's hold on the port and fails.
        let placeholder = UdpSocket::bind("127.0.0.1:0")?;
        drop(std::mem::replace(&mut self.socket, placeholder));
        self.socket = UdpSocket::bind(local)?;
        Ok(())
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl DatagramEndpoint for UdpEndpoint {
    fn send_to(&self, bytes: &[u8], peer: SocketAddr) -> Result<()> {
        trace!("send {} bytes to {peer}", bytes.len());
        self.socket.send_to(bytes, peer)?;
        Ok(())
    }

    fn recv(&self, deadline: Option<Instant>) -> Result<Recv> {
        let timeout = match deadline {
            None => None,
            Some(d) => {
                let now = Instant::now();
                // A zero duration would mean "block forever" on some
                // platforms, so floor at 1us for an already-past deadline:
                // this still polls the socket once instead of skipping it.
                Some(d.saturating_duration_since(now).max(Duration::from_micros(1)))
            }
        };
        self.socket.set_read_timeout(timeout)?;

        let mut buf = [0u8; MAX_PACKET_SIZE];
        match self.socket.recv_from(&mut buf) {
            Ok((n, peer)) => {
                trace!("recv {n} bytes from {peer}");
                Ok(Recv::Datagram(buf[..n].to_vec(), peer))
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                Ok(Recv::Timeout)
            }
            Err(e) => Err(Error::Io(e)),
        }
    }
}

/// Computes a deadline `dur` from now; a small helper so call sites read
/// as `deadline_in(SYNC_TIMEOUT)` rather than repeating `Instant::now() + ..`.
pub fn deadline_in(dur: Duration) -> Instant {
    Instant::now() + dur
}
