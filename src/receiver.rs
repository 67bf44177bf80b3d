//! Receiver side of a single transfer: SYNC, then BULK, then REPAIR,
//! then TEARDOWN.

use crate::cipher::Keystream;
use crate::config::*;
use crate::core::{ControlFrame, ControlTag, DataFrame};
use crate::dh;
use crate::endpoint::{deadline_in, DatagramEndpoint, Recv};
use crate::error::{Error, Result};
use log::{debug, info, warn};
use rand::{thread_rng, Rng};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

/// Runs a complete receive over `endpoint`.
///
/// `peer` is `Some` when the caller already knows who it is talking to
/// (the initiating side); `None` when acting as a bound server, in which
/// case the first SYNC datagram's source sets the peer.
pub fn run(
    endpoint: &dyn DatagramEndpoint,
    peer: Option<SocketAddr>,
    timeout: Option<Instant>,
    secure: bool,
) -> Result<(SocketAddr, Vec<u8>)> {
    endpoint.drain();

    let (peer, n, mut cipher) = sync(endpoint, peer, timeout, secure)?;
    let mut fragments = bulk(endpoint, n)?;
    repair(endpoint, peer, n, &mut fragments)?;
    let bytes = teardown(endpoint, peer, n, fragments, cipher.as_mut())?;
    Ok((peer, bytes))
}

/// SYNC: waits for the sender's opening frame, echoes agreement.
fn sync(
    endpoint: &dyn DatagramEndpoint,
    known_peer: Option<SocketAddr>,
    timeout: Option<Instant>,
    secure: bool,
) -> Result<(SocketAddr, usize, Option<Keystream>)> {
    let mut rng = thread_rng();

    let (datagram, peer) = loop {
        match endpoint.recv(timeout)? {
            Recv::Datagram(bytes, from) => {
                if let Some(expected) = known_peer
                    && from != expected
                {
                    continue;
                }
                break (bytes, from);
            }
            Recv::Timeout => return Err(Error::SyncFailure),
        }
    };

    if !secure {
        if datagram.len() < 4 {
            return Err(Error::SyncFailure);
        }
        let n = u32::from_le_bytes(datagram[..4].try_into().unwrap());

        let mut body = n.to_le_bytes().to_vec();
        pad(&mut body, &mut rng);
        endpoint.send_to(&body, peer)?;
        info!("sync complete (plain), n={n}, peer={peer}");
        return Ok((peer, n as usize, None));
    }

    let Some((sender_public, consumed)) = dh::decode_public(&datagram) else {
        return Err(Error::CipherMisuse);
    };
    if datagram.len() < consumed + 4 {
        return Err(Error::CipherMisuse);
    }
    let n = u32::from_le_bytes(datagram[consumed..consumed + 4].try_into().unwrap());

    let keypair = dh::KeyPair::generate(&mut rng);
    let key = dh::derive_key(&keypair.shared_secret(&sender_public));
    let mut cipher = Keystream::new(&key);

    let mut enc_n = n.to_le_bytes();
    cipher.apply(&mut enc_n);

    let mut body = dh::encode_public(&keypair.public);
    body.extend_from_slice(&enc_n);
    pad(&mut body, &mut rng);
    endpoint.send_to(&body, peer)?;
    info!("sync complete (secure), n={n}, peer={peer}");
    Ok((peer, n as usize, Some(cipher)))
}

fn pad(body: &mut Vec<u8>, rng: &mut impl Rng) {
    let max_pad = MAX_DATA_SIZE / 2;
    let pad_len = rng.gen_range(0..=max_pad);
    body.extend((0..pad_len).map(|_| rng.r#gen::<u8>()));
}

/// BULK: collects data frames into a fragment map until `n` bytes are
/// accounted for, a DONE arrives, or the loop goes idle.
fn bulk(endpoint: &dyn DatagramEndpoint, n: usize) -> Result<HashMap<u32, Vec<u8>>> {
    let mut fragments: HashMap<u32, Vec<u8>> = HashMap::new();
    let mut received = 0usize;

    loop {
        if received >= n {
            break;
        }
        let datagram = match endpoint.recv(Some(deadline_in(RECV_LOOP_TIMEOUT)))? {
            Recv::Datagram(bytes, _peer) => bytes,
            Recv::Timeout => break,
        };

        if ControlFrame::classify(&datagram) == Some(ControlTag::Done) {
            break;
        }
        let Some(frame) = DataFrame::decode(&datagram) else {
            continue;
        };
        if let std::collections::hash_map::Entry::Vacant(e) = fragments.entry(frame.packet_id) {
            received += frame.payload.len();
            e.insert(frame.payload);
        }
    }

    debug!("bulk collected {} fragments, {received}/{n} bytes", fragments.len());
    Ok(fragments)
}

/// REPAIR: requests missing ids until every id below `d_max` is present.
fn repair(
    endpoint: &dyn DatagramEndpoint,
    peer: SocketAddr,
    n: usize,
    fragments: &mut HashMap<u32, Vec<u8>>,
) -> Result<()> {
    let mut received: usize = fragments.values().map(|p| p.len()).sum();

    let missing_packet_max = 2 + (n - received).div_ceil(MIN_DATA_SIZE) as u32;
    let mut d_max = fragments
        .keys()
        .max()
        .map(|&m| m + missing_packet_max)
        .unwrap_or(missing_packet_max);

    let mut idle_retries = TIMEOUT_REREQUEST_COUNT;

    loop {
        let missing = collect_missing(fragments, d_max);
        if missing.is_empty() || received >= n {
            break;
        }

        let request = build_missing_request(&missing);
        endpoint.send_to(&request, peer)?;

        for &id in &missing {
            let datagram = match endpoint.recv(Some(deadline_in(RECV_REREQUEST_TIMEOUT)))? {
                Recv::Datagram(bytes, _peer) => bytes,
                Recv::Timeout => {
                    idle_retries -= 1;
                    if idle_retries == 0 {
                        warn!("repair: retry budget exhausted");
                        return Err(Error::Unreachable);
                    }
                    break;
                }
            };

            if ControlFrame::classify(&datagram) == Some(ControlTag::OutOfRange) {
                if let Some(bad_id) = ControlFrame::out_of_range_id(&datagram) {
                    d_max = d_max.min(bad_id);
                    debug!("repair: clamped d_max to {d_max}");
                }
                break;
            }

            // Any non-timeout, non-OUT_OF_RANGE datagram counts as forward
            // progress and resets the idle budget, matching ggudp.py's
            // `else: retries = REREQUEST_SAFETY` (the budget bounds
            // consecutive idle cycles, not a cumulative total).
            idle_retries = TIMEOUT_REREQUEST_COUNT;

            let Some(frame) = DataFrame::decode(&datagram) else {
                continue;
            };
            if let Some(prev) = fragments.get(&frame.packet_id) {
                received -= prev.len();
            }
            received += frame.payload.len();
            fragments.insert(frame.packet_id, frame.payload);
            let _ = id;
        }
    }

    // Acknowledge completion; wait for the sender's DONE in reply. A MISSING
    // request is never padded (its whole remainder is read as an id list),
    // so an empty one must be sent as the bare tag, not `encode_padded`.
    for _ in 0..TIMEOUT_REREQUEST_COUNT {
        let empty = build_missing_request(&[]);
        endpoint.send_to(&empty, peer)?;
        match endpoint.recv(Some(deadline_in(RECV_REREQUEST_TIMEOUT)))? {
            Recv::Datagram(bytes, _peer) if ControlFrame::classify(&bytes) == Some(ControlTag::Done) => {
                break;
            }
            _ => continue,
        }
    }
    Ok(())
}

fn collect_missing(fragments: &HashMap<u32, Vec<u8>>, d_max: u32) -> Vec<u32> {
    let mut missing = Vec::new();
    let budget = MAX_DATA_SIZE - LEN_MISSING_PKT;
    for id in 0..d_max {
        if !fragments.contains_key(&id) {
            if missing.len() * LEN_MISSING_PKT >= budget {
                break;
            }
            missing.push(id);
        }
    }
    missing
}

fn build_missing_request(ids: &[u32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(LEN_TAG + ids.len() * 4);
    out.extend_from_slice(&TAG_MISSING.to_le_bytes());
    for id in ids {
        out.extend_from_slice(&id.to_le_bytes());
    }
    out
}

/// TEARDOWN: drains stray traffic, decrypts in id order if secure, and
/// concatenates the fragment map into the final byte string.
fn teardown(
    endpoint: &dyn DatagramEndpoint,
    peer: SocketAddr,
    n: usize,
    fragments: HashMap<u32, Vec<u8>>,
    cipher: Option<&mut Keystream>,
) -> Result<Vec<u8>> {
    let mut rng = thread_rng();
    let done = ControlFrame::new(ControlTag::Done, Vec::new()).encode_padded(&mut rng);
    endpoint.send_to(&done, peer)?;

    let drain_deadline = deadline_in(TIMEOUT_NO_WAIT);
    while Instant::now() < drain_deadline {
        if matches!(endpoint.recv(Some(drain_deadline))?, Recv::Timeout) {
            break;
        }
    }

    let mut ids: Vec<u32> = fragments.keys().copied().collect();
    ids.sort_unstable();

    let mut out = Vec::with_capacity(n);
    let mut cipher = cipher;
    for id in ids {
        let mut payload = fragments[&id].clone();
        if let Some(ks) = cipher.as_deref_mut() {
            ks.apply(&mut payload);
        }
        out.extend_from_slice(&payload);
    }
    info!("teardown complete: assembled {} bytes", out.len());
    Ok(out)
}
