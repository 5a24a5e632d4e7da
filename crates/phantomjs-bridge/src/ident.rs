//! Collision-resistant identifiers for request/response correlation.

/// Entropy contributed by each random chunk, in bytes.
const CHUNK_BYTES: usize = 4;

/// Build an opaque identifier carrying at least `min_bytes` of randomness.
///
/// Each chunk is a uniformly random `u32` rendered in base 36, so the result
/// only ever contains `0-9a-z`. Collision resistance is probabilistic;
/// callers that need strict uniqueness must check against their own live
/// set.
pub(crate) fn generate(min_bytes: usize) -> String {
    let chunks = min_bytes.div_ceil(CHUNK_BYTES);
    let mut out = String::with_capacity(chunks * 7);
    for _ in 0..chunks {
        push_base36(&mut out, rand::random::<u32>());
    }
    out
}

fn push_base36(out: &mut String, mut value: u32) {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    // 36^7 > 2^32, so seven digits always suffice.
    let mut buf = [0u8; 7];
    let mut i = buf.len();
    loop {
        i -= 1;
        buf[i] = DIGITS[(value % 36) as usize];
        value /= 36;
        if value == 0 {
            break;
        }
    }
    for &digit in &buf[i..] {
        out.push(digit as char);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixteen_bytes_yields_long_lowercase_alphanumeric() {
        let id = generate(16);
        assert!(id.len() >= 16, "unexpectedly short id: {id}");
        assert!(
            id.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()),
            "unexpected character in id: {id}"
        );
    }

    #[test]
    fn successive_ids_differ() {
        assert_ne!(generate(16), generate(16));
    }

    #[test]
    fn zero_bytes_yields_empty_id() {
        assert_eq!(generate(0), "");
    }

    #[test]
    fn partial_chunk_still_counts() {
        // 1 through 4 bytes all need exactly one chunk.
        assert!(!generate(1).is_empty());
        assert!(!generate(4).is_empty());
    }

    #[test]
    fn base36_rendering_round_trips() {
        let mut out = String::new();
        push_base36(&mut out, 0);
        assert_eq!(out, "0");

        let mut out = String::new();
        push_base36(&mut out, u32::MAX);
        assert_eq!(u32::from_str_radix(&out, 36), Ok(u32::MAX));
    }
}
