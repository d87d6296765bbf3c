/// Bernstein's `djb2`: `hash = hash * 33 + byte`, starting from 5381, with
/// wrapping arithmetic.
pub fn djb2(key: &str) -> u64 {
    key.bytes()
        .fold(5381u64, |hash, byte| hash.wrapping_mul(33).wrapping_add(u64::from(byte)))
}
