//! Gesture server wire format.
//!
//! Each event is one 29-byte record, all fields big-endian:
//!
//! | offset | size | field                                   |
//! |--------|------|-----------------------------------------|
//! | 0      | 4    | point count, always -1 (length follows) |
//! | 4      | 4    | per-point length, always 21             |
//! | 8      | 4    | output ID                               |
//! | 12     | 4    | x, f32, normalized                      |
//! | 16     | 4    | y, f32, normalized                      |
//! | 20     | 1    | state: 0 birth, 1 death, 2 move         |
//! | 21     | 8    | ms since relay start, u64               |

use crate::multitouch::{EventKind, TouchEvent};

/// Port the gesture server listens on for this device.
pub const DEFAULT_PORT: u16 = 5947;

/// Device type byte sent once after connecting.
pub const HANDSHAKE: u8 = 1;

/// Negative point count: per-point length follows.
pub const POINT_COUNT: i32 = -1;

/// Bytes per point payload.
pub const POINT_LEN: usize = 21;

/// Bytes per record, including the two header ints.
pub const RECORD_LEN: usize = 8 + POINT_LEN;

pub type Record = [u8; RECORD_LEN];

/// Encode one event. NaN and out-of-range coordinates pass through untouched.
pub fn encode(event: &TouchEvent) -> Record {
    let mut out = [0u8; RECORD_LEN];
    out[0..4].copy_from_slice(&POINT_COUNT.to_be_bytes());
    out[4..8].copy_from_slice(&(POINT_LEN as i32).to_be_bytes());
    out[8..12].copy_from_slice(&i32::from(event.id).to_be_bytes());
    out[12..16].copy_from_slice(&event.x.to_be_bytes());
    out[16..20].copy_from_slice(&event.y.to_be_bytes());
    out[20] = event.kind.code();
    out[21..29].copy_from_slice(&event.time_ms.to_be_bytes());
    out
}

/// Fields of a decoded record.
#[cfg(test)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WirePoint {
    pub id: i32,
    pub x: f32,
    pub y: f32,
    pub kind: EventKind,
    pub time_ms: u64,
}

#[cfg(test)]
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("record too short: {0} bytes")]
    Short(usize),
    #[error("unexpected header: count {count}, length {len}")]
    Header { count: i32, len: i32 },
    #[error("unknown state code {0}")]
    State(u8),
}

/// Decode one record, as a gesture server would.
#[cfg(test)]
pub fn decode(bytes: &[u8]) -> Result<WirePoint, DecodeError> {
    if bytes.len() < RECORD_LEN {
        return Err(DecodeError::Short(bytes.len()));
    }
    let word = |at: usize| [bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]];
    let be_i32 = |at: usize| i32::from_be_bytes(word(at));
    let be_f32 = |at: usize| f32::from_be_bytes(word(at));

    let count = be_i32(0);
    let len = be_i32(4);
    if count != POINT_COUNT || len != POINT_LEN as i32 {
        return Err(DecodeError::Header { count, len });
    }
    let kind = EventKind::try_from(bytes[20]).map_err(DecodeError::State)?;
    let mut time = [0u8; 8];
    time.copy_from_slice(&bytes[21..29]);

    Ok(WirePoint {
        id: be_i32(8),
        x: be_f32(12),
        y: be_f32(16),
        kind,
        time_ms: u64::from_be_bytes(time),
    })
}
