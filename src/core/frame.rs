//! Frame encoding and decoding for the transfer protocol.
//!
//! # Wire format
//!
//! ```text
//! Data frame:     CHK(16) | ID(4, LE) | PAYLOAD(L)   500 <= L <= 4076
//! Control frame:  TAG(4, LE) | random padding (optional)
//! ```
//!
//! A frame is classified by a two-step test (spec §4.1): a leading-4-byte
//! match against a reserved tag means control; otherwise the frame is
//! treated as data and its checksum is verified.

use crate::config::{LEN_CHECKSUM, LEN_HEADERS, LEN_PACKET_ID, MAX_DATA_SIZE};
use crate::core::checksum::{digest16, verify16};
use rand::Rng;

/// A decoded data frame: one payload fragment plus its id.
#[derive(Debug, Clone)]
pub struct DataFrame {
    pub packet_id: u32,
    pub payload: Vec<u8>,
}

impl DataFrame {
    /// Encodes `payload` (already ciphered, if secure mode applies) under `packet_id`.
    ///
    /// `payload.len()` is expected to be within `[MIN_DATA_SIZE, MAX_DATA_SIZE]`
    /// for data emitted during BULK, but retransmission of an already-framed
    /// fragment never re-enters this path, so no bound is enforced here.
    pub fn encode(packet_id: u32, payload: &[u8]) -> Vec<u8> {
        let id_bytes = packet_id.to_le_bytes();
        let chk = digest16(&[&id_bytes, payload]);

        let mut out = Vec::with_capacity(LEN_HEADERS + payload.len());
        out.extend_from_slice(&chk);
        out.extend_from_slice(&id_bytes);
        out.extend_from_slice(payload);
        out
    }

    /// Attempts to decode `buf` as a data frame, verifying its checksum.
    ///
    /// Returns `None` on any malformed or corrupted frame; the caller
    /// treats that as a frame to silently discard, per spec §7 (`MalformedFrame`).
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < LEN_HEADERS {
            return None;
        }

        let chk: [u8; LEN_CHECKSUM] = buf[..LEN_CHECKSUM].try_into().ok()?;
        let id_bytes = &buf[LEN_CHECKSUM..LEN_CHECKSUM + LEN_PACKET_ID];
        let payload = &buf[LEN_HEADERS..];

        if !verify16(&[id_bytes, payload], &chk) {
            return None;
        }

        let packet_id = u32::from_le_bytes(id_bytes.try_into().ok()?);
        Some(DataFrame {
            packet_id,
            payload: payload.to_vec(),
        })
    }
}

/// The three reserved control signals exchanged outside of data transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTag {
    Missing,
    OutOfRange,
    Done,
}

impl ControlTag {
    const fn value(self) -> u32 {
        match self {
            ControlTag::Missing => crate::config::TAG_MISSING,
            ControlTag::OutOfRange => crate::config::TAG_OUT_OF_RANGE,
            ControlTag::Done => crate::config::TAG_DONE,
        }
    }

    fn from_value(v: u32) -> Option<Self> {
        match v {
            crate::config::TAG_MISSING => Some(ControlTag::Missing),
            crate::config::TAG_OUT_OF_RANGE => Some(ControlTag::OutOfRange),
            crate::config::TAG_DONE => Some(ControlTag::Done),
            _ => None,
        }
    }
}

/// A control frame: a 4-byte tag, optionally carrying trailing bytes
/// (a list of missing ids, an out-of-range id) and/or random padding.
#[derive(Debug, Clone)]
pub struct ControlFrame {
    pub tag: ControlTag,
    /// Payload meaningful to the tag (e.g. the MISSING id list). Does not
    /// include random padding, which is stripped on decode.
    pub body: Vec<u8>,
}

impl ControlFrame {
    pub fn new(tag: ControlTag, body: Vec<u8>) -> Self {
        ControlFrame { tag, body }
    }

    /// Encodes the frame, right-padding with random bytes up to a random
    /// length <= MAX_DATA_SIZE/2, per spec §4.1 (defeats trivial
    /// traffic-length fingerprinting of control vs. data frames).
    pub fn encode_padded(&self, rng: &mut impl Rng) -> Vec<u8> {
        let mut out = Vec::with_capacity(crate::config::LEN_TAG + self.body.len());
        out.extend_from_slice(&self.tag.value().to_le_bytes());
        out.extend_from_slice(&self.body);

        let max_pad = MAX_DATA_SIZE / 2;
        let pad_len = rng.gen_range(0..=max_pad);
        out.extend((0..pad_len).map(|_| rng.r#gen::<u8>()));
        out
    }

    /// Classifies a raw datagram as a control frame iff its leading 4 bytes
    /// match a reserved tag. Trailing bytes beyond the tag are ignored
    /// (meaningful body, random padding, or both).
    pub fn classify(buf: &[u8]) -> Option<ControlTag> {
        if buf.len() < crate::config::LEN_TAG {
            return None;
        }
        let tag_bytes: [u8; 4] = buf[..4].try_into().ok()?;
        ControlTag::from_value(u32::from_le_bytes(tag_bytes))
    }

    /// Decodes a MISSING request's trailing id list.
    ///
    /// A MISSING request carries no internal length prefix or padding
    /// (the receiver never pads a non-empty request, see receiver.rs), so
    /// every whole 4-byte group after the tag is a requested id.
    pub fn missing_ids(buf: &[u8]) -> Vec<u32> {
        let rest = &buf[crate::config::LEN_TAG.min(buf.len())..];
        rest.chunks_exact(4)
            .map(|c| u32::from_le_bytes(c.try_into().unwrap()))
            .collect()
    }

    /// Decodes an OUT_OF_RANGE frame's single trailing id.
    pub fn out_of_range_id(buf: &[u8]) -> Option<u32> {
        let rest = buf.get(crate::config::LEN_TAG..)?;
        if rest.len() < 4 {
            return None;
        }
        Some(u32::from_le_bytes(rest[..4].try_into().ok()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MIN_DATA_SIZE;
    use rand::thread_rng;

    #[test]
    fn data_frame_roundtrip() {
        let payload = vec![0x41u8; 500];
        let encoded = DataFrame::encode(7, &payload);
        let decoded = DataFrame::decode(&encoded).unwrap();
        assert_eq!(decoded.packet_id, 7);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn data_frame_rejects_bit_flip() {
        let payload = vec![0x41u8; 32];
        let mut encoded = DataFrame::encode(1, &payload);
        *encoded.last_mut().unwrap() ^= 0xFF;
        assert!(DataFrame::decode(&encoded).is_none());

        let mut encoded = DataFrame::encode(1, &payload);
        encoded[LEN_CHECKSUM] ^= 0x01; // flip a bit of the id
        assert!(DataFrame::decode(&encoded).is_none());
    }

    #[test]
    fn control_frame_classify_ignores_padding() {
        let frame = ControlFrame::new(ControlTag::Done, vec![]);
        let encoded = frame.encode_padded(&mut thread_rng());
        assert_eq!(ControlFrame::classify(&encoded), Some(ControlTag::Done));
    }

    #[test]
    fn control_frame_not_confused_with_data() {
        // A data frame's random checksum bytes essentially never collide
        // with a control tag; classify() should return None for them.
        let payload = vec![0x41u8; MIN_DATA_SIZE];
        let encoded = DataFrame::encode(0, &payload);
        assert_eq!(ControlFrame::classify(&encoded), None);
    }

    #[test]
    fn missing_ids_roundtrip() {
        let ids: Vec<u32> = vec![1, 5, 9];
        let mut body = Vec::new();
        for id in &ids {
            body.extend_from_slice(&id.to_le_bytes());
        }
        let frame = ControlFrame::new(ControlTag::Missing, body);
        let mut raw = Vec::new();
        raw.extend_from_slice(&ControlTag::Missing.value().to_le_bytes());
        raw.extend_from_slice(&frame.body);
        assert_eq!(ControlFrame::missing_ids(&raw), ids);
    }

    #[test]
    fn out_of_range_roundtrip() {
        let frame = ControlFrame::new(ControlTag::OutOfRange, 999u32.to_le_bytes().to_vec());
        let mut raw = Vec::new();
        raw.extend_from_slice(&ControlTag::OutOfRange.value().to_le_bytes());
        raw.extend_from_slice(&frame.body);
        assert_eq!(ControlFrame::out_of_range_id(&raw), Some(999));
    }
}
