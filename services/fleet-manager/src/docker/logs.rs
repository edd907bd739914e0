//! Log stream decoding.
//!
//! Containers started without a TTY return logs as a sequence of frames:
//!
//! ```text
//! [stream: u8][0u8; 3][len: u32 big-endian][payload; len]
//! ```
//!
//! where `stream` is 0 (stdin), 1 (stdout) or 2 (stderr). Containers with a
//! TTY return the raw bytes.

const HEADER_LEN: usize = 8;

fn frame_header(buf: &[u8]) -> Option<usize> {
    let header = buf.get(..HEADER_LEN)?;
    if header[0] > 2 || header[1..4] != [0, 0, 0] {
        return None;
    }
    let len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
    Some(len as usize)
}

/// Decode a log response body into text, stripping frame headers.
///
/// Falls back to the raw bytes when the body does not start with a frame
/// header. A truncated final frame keeps whatever payload is present.
pub fn demultiplex(raw: &[u8]) -> String {
    if frame_header(raw).is_none() {
        return String::from_utf8_lossy(raw).into_owned();
    }

    let mut out = Vec::with_capacity(raw.len());
    let mut rest = raw;
    while !rest.is_empty() {
        let Some(len) = frame_header(rest) else {
            out.extend_from_slice(rest);
            break;
        };
        let payload = &rest[HEADER_LEN..];
        let take = len.min(payload.len());
        out.extend_from_slice(&payload[..take]);
        rest = &payload[take..];
    }

    String::from_utf8_lossy(&out).into_owned()
}
