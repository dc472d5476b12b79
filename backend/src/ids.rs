//! URL-safe, unguessable identifiers and server-generated credentials.
//!
//! An identifier is `prefix + time component + random component`, all
//! base-62. The time component is the creation instant in milliseconds,
//! fixed-width so identifiers of one prefix sort chronologically; the
//! random component carries ~83 bits of entropy, which is what makes the
//! identifier usable as a public link token.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Base-62 alphabet in ASCII order, so encoded values sort as strings.
const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Fixed width of the time component (62^8 ms reaches past year 8000).
const TIME_WIDTH: usize = 8;

/// Width of the random component (62^14, ~83 bits).
const RANDOM_WIDTH: usize = 14;

/// Length of server-generated passwords (parts and view passwords).
pub const PASSWORD_LEN: usize = 20;

/// Length of confirmation codes sent to a confirmation address.
pub const CONFIRMATION_CODE_LEN: usize = 6;

/// Generate a fresh identifier with the given prefix.
pub fn generate(prefix: &str) -> String {
    generate_at(prefix, Utc::now())
}

/// Generate an identifier with an explicit creation instant.
pub fn generate_at(prefix: &str, at: DateTime<Utc>) -> String {
    let millis = u64::try_from(at.timestamp_millis()).unwrap_or(0);
    let mut id = String::with_capacity(prefix.len() + TIME_WIDTH + RANDOM_WIDTH);
    id.push_str(prefix);
    id.push_str(&encode_fixed(millis, TIME_WIDTH));
    let mut rng = rand::thread_rng();
    for _ in 0..RANDOM_WIDTH {
        id.push(ALPHABET[rng.gen_range(0..ALPHABET.len())] as char);
    }
    id
}

/// Encode `value` in base 62, left-padded with `0` to `width`.
fn encode_fixed(mut value: u64, width: usize) -> String {
    let mut buf = vec![b'0'; width];
    let mut i = width;
    while value > 0 && i > 0 {
        i -= 1;
        buf[i] = ALPHABET[(value % 62) as usize];
        value /= 62;
    }
    String::from_utf8(buf).unwrap_or_default()
}

/// Generate a random alphanumeric password.
///
/// Used for both parts passwords and view passwords; the two are
/// generated independently and never intentionally equal.
pub fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Generate a numeric confirmation code.
pub fn confirmation_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CONFIRMATION_CODE_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
