//! Stable string hashing.
//!
//! Bucketing and fingerprints must produce the same value on every platform,
//! across restarts, and in every SDK that shares a backend. That rules out
//! `DefaultHasher`, whose output is randomly seeded. This is the classic
//! 31-multiplier hash over UTF-16 code units with 32-bit wrapping.

/// Hashes a string to a signed 32-bit value.
pub fn string_hash(input: &str) -> i32 {
    input.encode_utf16().fold(0i32, |hash, unit| {
        (hash << 5).wrapping_sub(hash).wrapping_add(i32::from(unit))
    })
}

/// Reduces a string to a bucket in `[0, buckets)`.
pub fn bucket_of(input: &str, buckets: u32) -> u32 {
    let magnitude = i64::from(string_hash(input)).unsigned_abs();
    (magnitude % u64::from(buckets.max(1))) as u32
}

/// Short base36 rendering of a string's hash.
pub fn short_hash(input: &str) -> String {
    let mut n = i64::from(string_hash(input)).unsigned_abs();
    if n == 0 {
        return "0".to_string();
    }

    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
