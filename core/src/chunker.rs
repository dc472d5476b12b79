//! Splitting and reassembly of a serialized blob into transport parts.
//!
//! The serialized public blob is a string of packed characters (2 bytes
//! per character, see [`crate::bytestring`]). `split` partitions it on
//! character boundaries into parts no larger than a byte ceiling; `join`
//! is plain concatenation in index order. There is no reordering
//! tolerance: part numbers are mandatory transport metadata and the
//! transfer session re-sorts by number before joining.

/// Default part ceiling: 4 MiB, under typical request-body limits.
pub const MAX_PART_BYTES: usize = 4 * 1024 * 1024;

/// Split a serialized blob into ordered parts of at most `max_bytes`
/// (2 bytes per character). An empty string yields no parts.
pub fn split(serialized: &str, max_bytes: usize) -> Vec<String> {
    let max_chars = (max_bytes / 2).max(1);
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;
    for c in serialized.chars() {
        current.push(c);
        count += 1;
        if count == max_chars {
            parts.push(std::mem::take(&mut current));
            count = 0;
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Reassemble parts in index order.
pub fn join(parts: &[String]) -> String {
    parts.concat()
}
