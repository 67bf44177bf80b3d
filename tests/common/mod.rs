//! A fault-injecting wrapper around a real `UdpEndpoint`, used to drive
//! the loss/reorder/duplication scenarios from a single process without
//! a real unreliable network.

use relaygram::core::{ControlFrame, ControlTag, DataFrame};
use relaygram::endpoint::{DatagramEndpoint, Recv, UdpEndpoint};
use relaygram::Result;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Instant;

/// Wraps a bound [`UdpEndpoint`] and applies a fault policy to outgoing
/// data frames only; control frames always pass through (except to
/// trigger a reorder flush). Receiving is always passed straight
/// through to the inner endpoint.
pub struct FaultyEndpoint {
    inner: UdpEndpoint,
    policy: Mutex<Policy>,
}

#[derive(Default)]
struct Policy {
    /// Drop a data frame's first emission iff `packet_id % drop_every == 0`.
    drop_every: Option<u32>,
    seen_first_emission: HashSet<u32>,
    /// Send every data frame twice.
    duplicate: bool,
    /// Buffer every BULK data frame instead of sending it immediately;
    /// flush the buffer in reverse order the moment the first DONE is
    /// about to go out, then forward that DONE. Disabled again after
    /// the one flush, so REPAIR retransmissions are unaffected.
    reorder_buffer: bool,
    reorder_flushed: bool,
    buffered: Vec<(Vec<u8>, SocketAddr)>,
}

impl FaultyEndpoint {
    pub fn wrap(inner: UdpEndpoint) -> Self {
        FaultyEndpoint {
            inner,
            policy: Mutex::new(Policy::default()),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.inner.local_addr()
    }

    pub fn drop_every_nth_on_first_emission(&self, n: u32) {
        self.policy.lock().unwrap().drop_every = Some(n);
    }

    pub fn duplicate_every_frame(&self) {
        self.policy.lock().unwrap().duplicate = true;
    }

    /// Buffers all BULK data frames and delivers them in reverse order,
    /// right before the first DONE (spec §8 scenario 4).
    pub fn reorder_by_reversing(&self) {
        self.policy.lock().unwrap().reorder_buffer = true;
    }
}

impl DatagramEndpoint for FaultyEndpoint {
    fn send_to(&self, bytes: &[u8], peer: SocketAddr) -> Result<()> {
        let is_data = DataFrame::decode(bytes).is_some();

        if is_data {
            let mut policy = self.policy.lock().unwrap();
            if let Some(n) = policy.drop_every {
                let frame = DataFrame::decode(bytes).unwrap();
                let first_time = policy.seen_first_emission.insert(frame.packet_id);
                if first_time && frame.packet_id.is_multiple_of(n) {
                    return Ok(());
                }
            }
            if policy.reorder_buffer && !policy.reorder_flushed {
                policy.buffered.push((bytes.to_vec(), peer));
                return Ok(());
            }
            drop(policy);
        } else if ControlFrame::classify(bytes) == Some(ControlTag::Done) {
            let mut policy = self.policy.lock().unwrap();
            if policy.reorder_buffer && !policy.reorder_flushed {
                policy.reorder_flushed = true;
                let mut buffered = std::mem::take(&mut policy.buffered);
                drop(policy);
                buffered.reverse();
                for (frame, frame_peer) in buffered {
                    self.inner.send_to(&frame, frame_peer)?;
                }
            }
        }

        self.inner.send_to(bytes, peer)?;
        if is_data && self.policy.lock().unwrap().duplicate {
            self.inner.send_to(bytes, peer)?;
        }
        Ok(())
    }

    fn recv(&self, deadline: Option<Instant>) -> Result<Recv> {
        self.inner.recv(deadline)
    }
}
