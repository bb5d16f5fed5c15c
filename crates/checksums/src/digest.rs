//! Canonicalizing SHA-256 of a mail file.

use std::borrow::Cow;

use memchr::memmem;
use sha2::{Digest, Sha256};

/// Line prefix that is stripped before hashing.
pub const TRACKING_PREFIX: &[u8] = b"X-TUID: ";

/// Returns the lower-case hex SHA-256 of `data` with the first `X-TUID:`
/// line removed.
///
/// Only a line *beginning* with the eight-byte prefix counts, and only the
/// first one is stripped, up to and including its terminating newline. An
/// occurrence without a terminating newline is left in place and hashed
/// as-is.
#[must_use]
pub fn content_digest(data: &[u8]) -> String {
    let canonical = strip_tracking_line(data);
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_ref());
    let out = hasher.finalize();

    let mut hex = String::with_capacity(out.len() * 2);
    for byte in out {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

fn strip_tracking_line(data: &[u8]) -> Cow<'_, [u8]> {
    let mut offset = 0;
    while let Some(pos) = memmem::find(&data[offset..], TRACKING_PREFIX) {
        let start = offset + pos;
        let at_line_start = start == 0 || data[start - 1] == b'\n';
        if !at_line_start {
            offset = start + 1;
            continue;
        }
        match memchr::memchr(b'\n', &data[start..]) {
            Some(nl) => {
                let end = start + nl + 1;
                let mut canonical = Vec::with_capacity(data.len() - (end - start));
                canonical.extend_from_slice(&data[..start]);
                canonical.extend_from_slice(&data[end..]);
                return Cow::Owned(canonical);
            }
            // Unterminated tracking line, hash unchanged.
            None => return Cow::Borrowed(data),
        }
    }
    Cow::Borrowed(data)
}
