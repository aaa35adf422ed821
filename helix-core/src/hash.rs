//! Deterministic string hashing for latency seeds.

/// FNV-1a offset basis used for latency seeding.
///
/// Note: this is the historical Helix basis, not the textbook
/// `0xCBF29CE484222325`; recorded latency fits depend on it, so it must not
/// change.
const FNV_OFFSET: u64 = 1_469_598_103_934_665_603;
const FNV_PRIME: u64 = 1_099_511_628_211;

/// 64-bit FNV-1a over the raw bytes of `input`.
#[must_use]
pub fn fnv1a64(input: &str) -> u64 {
    let mut hash = FNV_OFFSET;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
