//! Protocol constants, collected in one place so a higher-latency
//! deployment can be tuned without touching state machine logic.

use std::time::Duration;

/// Maximum size of a single datagram on the wire.
pub const MAX_PACKET_SIZE: usize = 4096;
/// Size of the leading digest in a data frame.
pub const LEN_CHECKSUM: usize = 16;
/// Size of the little-endian packet id field in a data frame.
pub const LEN_PACKET_ID: usize = 4;
/// `LEN_CHECKSUM + LEN_PACKET_ID`.
pub const LEN_HEADERS: usize = LEN_CHECKSUM + LEN_PACKET_ID;

/// Largest payload a single data frame may carry.
pub const MAX_DATA_SIZE: usize = MAX_PACKET_SIZE - LEN_HEADERS;
/// Smallest payload a single data frame may carry.
pub const MIN_DATA_SIZE: usize = 500;

/// Size in bytes of a control frame's tag.
pub const LEN_TAG: usize = 4;
/// Size of a single MISSING id entry.
pub const LEN_MISSING_PKT: usize = 4;

/// Control tag: receiver requests retransmission of the trailing id list.
pub const TAG_MISSING: u32 = 0x155168C7;
/// Control tag: sender informs the receiver a requested id was never emitted.
pub const TAG_OUT_OF_RANGE: u32 = 0x070F124E;
/// Control tag: sender (or receiver, in acknowledgment) signals completion.
pub const TAG_DONE: u32 = 0xD0E53D16;

/// Shortest payload `Session::send` accepts; shorter payloads are rejected
/// rather than silently padded (see DESIGN.md, Open Question 1).
pub const MIN_PAYLOAD_LEN: usize = 2;

/// Base per-round SYNC timeout; round `i` (0-based) waits `SYNC_TIMEOUT + i * SYNC_TIMEOUT`.
pub const SYNC_TIMEOUT: Duration = Duration::from_secs(1);
/// Number of SYNC rounds attempted before reporting [`crate::Error::SyncFailure`].
pub const SYNC_ROUNDS: u32 = 3;

/// Deadline for a single datagram during BULK reception.
pub const RECV_LOOP_TIMEOUT: Duration = Duration::from_secs(5);
/// Sender's deadline while waiting for the next REPAIR-phase datagram.
pub const SEND_REREQUEST_TIMEOUT: Duration = Duration::from_secs(8);
/// Receiver's per-datagram deadline while awaiting a REPAIR response.
pub const RECV_REREQUEST_TIMEOUT: Duration = Duration::from_millis(500);
/// Idle-round budget before REPAIR gives up and reports [`crate::Error::Unreachable`].
pub const TIMEOUT_REREQUEST_COUNT: u32 = 4;

/// How long both roles drain stray datagrams for before starting/ending a session.
pub const TIMEOUT_NO_WAIT: Duration = Duration::from_millis(100);

/// Sleep inserted every 10th fragment emitted during BULK, the sender's sole
/// backpressure mechanism.
pub const BULK_PACING_INTERVAL: u32 = 10;
pub const BULK_PACING_SLEEP: Duration = Duration::from_millis(5);

/// Sleep before a REPAIR retransmission burst, and every 30th frame within it.
pub const REPAIR_BURST_DELAY: Duration = Duration::from_millis(100);
pub const REPAIR_BURST_INTERVAL: u32 = 30;
pub const REPAIR_BURST_SLEEP: Duration = Duration::from_millis(1);
