//! Reversible byte-to-string packing.
//!
//! Binary payloads are carried inside JSON as strings, two bytes per
//! character: each big-endian byte pair becomes one code point. Pairs that
//! would land in the UTF-16 surrogate range (U+D800..=U+DFFF) are lifted
//! into the supplementary plane by adding 0x10000 so every packed
//! character is a valid scalar value; decoding reverses the lift. An odd
//! trailing byte is zero-padded, so the original byte length must travel
//! alongside the packed string and is used to strip the pad on decode.

use crate::error::{Error, Result};

const SURROGATE_LO: u32 = 0xD800;
const SURROGATE_HI: u32 = 0xDFFF;
const SURROGATE_LIFT: u32 = 0x10000;

/// Pack bytes into a string, two bytes per character.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() / 2 + 1);
    for pair in bytes.chunks(2) {
        let hi = u32::from(pair[0]);
        let lo = u32::from(*pair.get(1).unwrap_or(&0));
        let value = (hi << 8) | lo;
        let codepoint = if (SURROGATE_LO..=SURROGATE_HI).contains(&value) {
            value + SURROGATE_LIFT
        } else {
            value
        };
        // Lifted values land in U+1D800..=U+1DFFF, never a surrogate.
        out.push(char::from_u32(codepoint).unwrap_or(char::REPLACEMENT_CHARACTER));
    }
    out
}

/// Unpack a string produced by [`encode`], truncating to `byte_len`.
pub fn decode(packed: &str, byte_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(packed.len() * 2);
    let mut chars = 0usize;
    for c in packed.chars() {
        chars += 1;
        let mut value = c as u32;
        if value >= SURROGATE_LIFT {
            let lowered = value - SURROGATE_LIFT;
            if !(SURROGATE_LO..=SURROGATE_HI).contains(&lowered) {
                return Err(Error::InvalidPackedChar { codepoint: value });
            }
            value = lowered;
        }
        out.push((value >> 8) as u8);
        out.push((value & 0xFF) as u8);
    }

    // The pad is at most one zero byte on the final character.
    if byte_len > out.len() || out.len() - byte_len > 1 {
        return Err(Error::ByteLengthMismatch {
            declared: byte_len,
            chars,
        });
    }
    out.truncate(byte_len);
    Ok(out)
}
