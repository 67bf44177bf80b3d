//! Sender side of a single transfer: SYNC, then BULK, then REPAIR.
//!
//! Drives `IDLE -> SYNC -> BULK -> REPAIR -> DRAIN -> DONE` against one
//! peer. All state lives on the stack of [`run`]; there is nothing to
//! tear down beyond dropping the retention map.

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

/// Runs a complete send of `data` to `peer` over `endpoint`.
///
/// Returns `Ok(())` once the receiver has acknowledged completion.
pub fn run(
    endpoint: &dyn DatagramEndpoint,
    peer: SocketAddr,
    data: &[u8],
    secure: bool,
) -> Result<()> {
    if data.len() < MIN_PAYLOAD_LEN {
        return Err(Error::PayloadTooShort);
    }

    endpoint.drain();

    let mut cipher = sync(endpoint, peer, data.len(), secure)?;
    let retained = bulk(endpoint, peer, data, cipher.as_mut())?;
    repair(endpoint, peer, &retained)
}

/// SYNC: up to [`SYNC_ROUNDS`] rounds of length (and, in secure mode, key)
/// agreement. Returns the initialized cipher in secure mode.
fn sync(
    endpoint: &dyn DatagramEndpoint,
    peer: SocketAddr,
    len: usize,
    secure: bool,
) -> Result<Option<Keystream>> {
    let mut rng = thread_rng();
    let n = len as u32;

    for round in 0..SYNC_ROUNDS {
        let timeout = SYNC_TIMEOUT + SYNC_TIMEOUT * round;
        debug!("sync round {round}, timeout {timeout:?}");

        if !secure {
            let mut body = n.to_le_bytes().to_vec();
            pad(&mut body, &mut rng);
            endpoint.send_to(&body, peer)?;

            match recv_before(endpoint, deadline_in(timeout))? {
                Some(resp) if resp.len() >= 4 && resp[..4] == n.to_le_bytes() => {
                    info!("sync accepted (plain), n={n}");
                    return Ok(None);
                }
                _ => continue,
            }
        }

        let keypair = dh::KeyPair::generate(&mut rng);
        let mut body = dh::encode_public(&keypair.public);
        body.extend_from_slice(&n.to_le_bytes());
        pad(&mut body, &mut rng);
        endpoint.send_to(&body, peer)?;

        let resp = match recv_before(endpoint, deadline_in(timeout))? {
            Some(resp) => resp,
            None => continue,
        };
        let Some((peer_public, consumed)) = dh::decode_public(&resp) else {
            warn!("sync: unparsable key exchange response");
            continue;
        };
        if resp.len() < consumed + 4 {
            continue;
        }
        let key = dh::derive_key(&keypair.shared_secret(&peer_public));
        let mut ks = Keystream::new(&key);
        let mut enc_n = resp[consumed..consumed + 4].to_vec();
        ks.apply(&mut enc_n);
        if enc_n == n.to_le_bytes() {
            info!("sync accepted (secure), n={n}");
            return Ok(Some(ks));
        }
    }

    Err(Error::SyncFailure)
}

/// Receives one datagram before `deadline`, ignoring who it's from.
fn recv_before(endpoint: &dyn DatagramEndpoint, deadline: Instant) -> Result<Option<Vec<u8>>> {
    match endpoint.recv(Some(deadline))? {
        Recv::Datagram(bytes, _peer) => Ok(Some(bytes)),
        Recv::Timeout => Ok(None),
    }
}

fn pad(body: &mut Vec<u8>, rng: &mut impl Rng) {
    let max_pad = MAX_DATA_SIZE / 2;
    let pad_len = rng.gen_range(0..=max_pad);
    body.extend((0..pad_len).map(|_| rng.r#gen::<u8>()));
}

/// BULK: fragments `data` into randomly sized pieces, framing and sending
/// each, then a DONE. Returns the retention map of every framed fragment.
fn bulk(
    endpoint: &dyn DatagramEndpoint,
    peer: SocketAddr,
    data: &[u8],
    mut cipher: Option<&mut Keystream>,
    ) -> Result<HashMap<u32, Vec<u8>>> {
    let mut rng = thread_rng();
    let mut retained = HashMap::new();
    let mut data_index = 0usize;
    let mut packet_id = 0u32;
    let mut emitted_since_pace = 0u32;

    while data_index < data.len() {
        let remaining = data.len() - data_index;
        let max_l = MAX_DATA_SIZE.min(remaining);
        let l = if max_l <= MIN_DATA_SIZE {
            max_l
        } else {
            rng.gen_range(MIN_DATA_SIZE..=max_l)
        };

        let mut payload = data[data_index..data_index + l].to_vec();
        if let Some(ks) = cipher.as_deref_mut() {
            ks.apply(&mut payload);
        }

        let framed = DataFrame::encode(packet_id, &payload);
        endpoint.send_to(&framed, peer)?;
        retained.insert(packet_id, framed);

        data_index += l;
        packet_id += 1;
        emitted_since_pace += 1;
        if emitted_since_pace == BULK_PACING_INTERVAL {
            emitted_since_pace = 0;
            std::thread::sleep(BULK_PACING_SLEEP);
        }
    }

    let done = ControlFrame::new(ControlTag::Done, Vec::new()).encode_padded(&mut rng);
    endpoint.send_to(&done, peer)?;
    info!("bulk complete: {} fragments", retained.len());
    Ok(retained)
}

/// REPAIR: answers the receiver's MISSING requests until it reports DONE
/// or declares a requested id OUT_OF_RANGE.
fn repair(
    endpoint: &dyn DatagramEndpoint,
    peer: SocketAddr,
    retained: &HashMap<u32, Vec<u8>>,
) -> Result<()> {
    let mut rng = thread_rng();
    let mut idle_retries = TIMEOUT_REREQUEST_COUNT;

    loop {
        let datagram = match recv_before(endpoint, deadline_in(SEND_REREQUEST_TIMEOUT))? {
            Some(d) => d,
            None => {
                idle_retries -= 1;
                if idle_retries == 0 {
                    warn!("repair: peer unreachable");
                    return Err(Error::Unreachable);
                }
                continue;
            }
        };

        match ControlFrame::classify(&datagram) {
            Some(ControlTag::Missing) => {
                let ids = ControlFrame::missing_ids(&datagram);
                if ids.is_empty() {
                    info!("repair: receiver reports completion");
                    return Ok(());
                }

                std::thread::sleep(REPAIR_BURST_DELAY);
                for (i, id) in ids.iter().enumerate() {
                    match retained.get(id) {
                        Some(frame) => endpoint.send_to(frame, peer)?,
                        None => {
                            let body = id.to_le_bytes().to_vec();
                            let oor = ControlFrame::new(ControlTag::OutOfRange, body)
                                .encode_padded(&mut rng);
                            endpoint.send_to(&oor, peer)?;
                            break;
                        }
                    }
                    if (i as u32 + 1).is_multiple_of(REPAIR_BURST_INTERVAL) {
                        std::thread::sleep(REPAIR_BURST_SLEEP);
                    }
                }
            }
            Some(ControlTag::Done) => {
                let done = ControlFrame::new(ControlTag::Done, Vec::new()).encode_padded(&mut rng);
                endpoint.send_to(&done, peer)?;
                info!("repair: receiver acknowledged, done");
                return Ok(());
            }
            Some(ControlTag::OutOfRange) | None => {
                warn!("repair: protocol violation from peer");
                return Err(Error::ProtocolViolation);
            }
        }
    }
}
