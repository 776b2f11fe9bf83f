//! # Token Generation
//!
//! Short pseudo-random tokens used for listener ids, heartbeats and device
//! identifiers. Not a security primitive.

use rand::Rng;

/// Length of generated listener ids.
pub const DEFAULT_TOKEN_LENGTH: usize = 8;

/// Radix of generated listener ids.
pub const DEFAULT_TOKEN_RADIX: u32 = 32;

/// Generate a token of exactly `length` characters.
///
/// Random 64-bit numbers are rendered in `radix` and concatenated until the
/// token is long enough, then truncated. `radix` is clamped to `2..=36`.
#[must_use]
pub fn token(length: usize, radix: u32) -> String {
    let radix = radix.clamp(2, 36);
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(length + 64);

    while out.len() < length {
        let mut chunk: u64 = rng.gen();
        // Digits come out least-significant first; order is irrelevant here.
        loop {
            let digit = (chunk % u64::from(radix)) as u32;
            if let Some(c) = char::from_digit(digit, radix) {
                out.push(c);
            }
            chunk /= u64::from(radix);
            if chunk == 0 {
                break;
            }
        }
    }

    out.truncate(length);
    out
}

/// Generate a default listener id (8 characters, base 32).
#[must_use]
pub fn generate_id() -> String {
    token(DEFAULT_TOKEN_LENGTH, DEFAULT_TOKEN_RADIX)
}
