//! Signature scanning for stream realignment

use super::header::PAVE_SIGNATURE;

/// Find the first complete signature in `buffer[start..end)`.
///
/// Returns the absolute offset of the match. A match must lie entirely
/// inside the range, so a signature cut off at `end` is not reported.
pub fn find_signature(buffer: &[u8], start: usize, end: usize) -> Option<usize> {
    let end = end.min(buffer.len());
    if start >= end {
        return None;
    }
    buffer[start..end]
        .windows(PAVE_SIGNATURE.len())
        .position(|window| window == PAVE_SIGNATURE)
        .map(|pos| start + pos)
}
