//! Caller-facing API: bind a local endpoint, connect or accept a peer,
//! and send/recv one message at a time.

use crate::endpoint::{deadline_in, UdpEndpoint};
use crate::error::Result;
use crate::{receiver, sender};
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

/// A bound transport session. Each `send`/`recv` call runs one complete
/// transfer and rebinds the socket afterward so stray datagrams from a
/// just-finished session cannot leak into the next one.
pub struct Session {
    endpoint: UdpEndpoint,
    peer: Option<SocketAddr>,
}

impl Session {
    /// Binds the local endpoint at `addr` and waits to act as the
    /// receiver of the first inbound transfer; the first SYNC datagram's
    /// source becomes the remote peer.
    pub fn bind<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let endpoint = UdpEndpoint::bind(addr)?;
        Ok(Session { endpoint, peer: None })
    }

    /// Binds an ephemeral local endpoint and sets `peer` as the remote
    /// endpoint this session will initiate transfers to.
    pub fn connect<A: ToSocketAddrs>(peer: A) -> Result<Self> {
        let endpoint = UdpEndpoint::bind("0.0.0.0:0")?;
        let peer = peer
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no address"))?;
        Ok(Session {
            endpoint,
            peer: Some(peer),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.endpoint.local_addr()
    }

    /// Sends `data` to the connected peer, running a full SYNC/BULK/REPAIR
    /// cycle. Requires a peer set via [`Session::connect`].
    pub fn send(&mut self, data: &[u8], secure: bool) -> Result<()> {
        let peer = self.peer.expect("send requires a peer set via connect()");
        let result = sender::run(&self.endpoint, peer, data, secure);
        self.endpoint.rebind()?;
        result
    }

    /// Receives one message, blocking (or waiting up to `timeout`) for the
    /// opening SYNC datagram.
    pub fn recv(&mut self, timeout: Option<Duration>, secure: bool) -> Result<Vec<u8>> {
        let deadline = timeout.map(deadline_in);
        let result = receiver::run(&self.endpoint, self.peer, deadline, secure);
        self.endpoint.rebind()?;
        let (peer, bytes) = result?;
        self.peer = Some(peer);
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn plain_roundtrip_tiny_payload() {
        let mut server = Session::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let handle = thread::spawn(move || server.recv(Some(Duration::from_secs(5)), false));

        let mut client = Session::connect(server_addr).unwrap();
        thread::sleep(Duration::from_millis(20));
        client.send(b"AA", false).unwrap();

        let received = handle.join().unwrap().unwrap();
        assert_eq!(received, b"AA");
    }

    #[test]
    fn plain_roundtrip_multi_fragment() {
        let mut server = Session::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let handle = thread::spawn(move || server.recv(Some(Duration::from_secs(10)), false));

        let mut client = Session::connect(server_addr).unwrap();
        thread::sleep(Duration::from_millis(20));
        let expected = payload.clone();
        client.send(&payload, false).unwrap();

        let received = handle.join().unwrap().unwrap();
        assert_eq!(received, expected);
    }

    #[test]
    fn secure_roundtrip() {
        let mut server = Session::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let payload = vec![0xAB; 10_240];
        let handle = thread::spawn(move || server.recv(Some(Duration::from_secs(10)), true));

        let mut client = Session::connect(server_addr).unwrap();
        thread::sleep(Duration::from_millis(20));
        let expected = payload.clone();
        client.send(&payload, true).unwrap();

        let received = handle.join().unwrap().unwrap();
        assert_eq!(received, expected);
    }

    #[test]
    fn payload_too_short_is_rejected() {
        let mut client = Session::connect("127.0.0.1:1").unwrap();
        let err = client.send(b"A", false).unwrap_err();
        assert!(matches!(err, crate::Error::PayloadTooShort));
    }
}
