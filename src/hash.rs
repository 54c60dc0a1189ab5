//! Key hashing
//!
//! Keys are bucketed by a 32-bit djb2 variant computed over their UTF-8
//! bytes. The hash is part of the on-disk format (root index entries are
//! keyed by it), so it must stay bit-for-bit stable.

const SEED: u32 = 5381;

/// XOR variant of djb2 (djb2a): `h = h * 33 ^ b`
pub fn djb2a(input: &[u8]) -> u32 {
    input
        .iter()
        .fold(SEED, |h, &b| (h << 5).wrapping_add(h) ^ b as u32)
}

/// Hash used to place a key in the root index
#[inline]
pub fn key_hash(key: &str) -> u32 {
    djb2a(key.as_bytes())
}
