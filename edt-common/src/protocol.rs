//! The wire protocol carried over the message bus: a NUL-or-newline-terminated
//! text frame `"<type> <x> <y> <unix_ts>"`.

use crate::limits::MAX_FRAME_BYTES;

/// A raw, not-yet-validated emergency submission read off the bus.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRequest {
    pub type_name: String,
    pub x: i32,
    pub y: i32,
    pub timestamp: i64,
}

/// Parses one wire frame: whitespace-separated, exactly four fields, the
/// first of which must not itself contain whitespace.
pub fn parse_frame(frame: &str) -> Option<RawRequest> {
    let frame = frame.trim_end_matches(['\0', '\n', '\r']);
    let mut parts = frame.split_whitespace();
    let type_name = parts.next()?.to_string();
    let x: i32 = parts.next()?.parse().ok()?;
    let y: i32 = parts.next()?.parse().ok()?;
    let timestamp: i64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    if type_name.is_empty() {
        return None;
    }
    Some(RawRequest {
        type_name,
        x,
        y,
        timestamp,
    })
}

/// Encodes a request into the wire frame format, as the submission CLI does.
pub fn encode_frame(type_name: &str, x: i32, y: i32, timestamp: i64) -> String {
    format!("{type_name} {x} {y} {timestamp}")
}

/// Checks a frame fits the bus's fixed slot size before it is ever sent.
pub fn fits_frame_budget(frame: &str) -> bool {
    frame.len() < MAX_FRAME_BYTES
}
