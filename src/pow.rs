use primitive_types::U256;

/// Bitcoin-family difficulty-1 target numerator, 0xffff0000 * 2^192.
const DIFF1: f64 = 4294901760.0 * 6277101735386680763835789423207666416102355444464034512896.0;

/// Parse a big-endian (display order) hash string such as the `hash`
/// field of a `getauxblock` reply.
pub fn u256_from_be_hex(s: &str) -> Option<U256> {
    let bytes = hex::decode(s).ok()?;
    if bytes.len() > 32 {
        return None;
    }
    Some(U256::from_big_endian(&bytes))
}

/// Parse a little-endian (node byte order) hex string, as merged-mining
/// nodes return the aux target.
pub fn u256_from_le_hex(s: &str) -> Option<U256> {
    let bytes = hex::decode(s).ok()?;
    if bytes.len() > 32 {
        return None;
    }
    Some(U256::from_little_endian(&bytes))
}

pub fn u256_to_f64(value: U256) -> f64 {
    value
        .0
        .iter()
        .rev()
        .fold(0.0, |acc, limb| acc * 18446744073709551616.0 + *limb as f64)
}

pub fn difficulty(target: U256) -> f64 {
    DIFF1 / (u256_to_f64(target) + 1.0)
}

/// Compact bits for the largest representable target not above `target`.
pub fn compact_bits_upper_bound(target: U256) -> u32 {
    let mut full = [0u8; 32];
    target.to_big_endian(&mut full);
    let start = full.iter().position(|b| *b != 0).unwrap_or(32);

    let mut n = Vec::with_capacity(33);
    if full.get(start).is_some_and(|b| *b >= 0x80) {
        n.push(0);
    }
    n.extend_from_slice(&full[start..]);

    let mut mant = [0u8; 3];
    for (dst, src) in mant.iter_mut().zip(n.iter()) {
        *dst = *src;
    }
    ((n.len() as u32) << 24) | ((mant[0] as u32) << 16) | ((mant[1] as u32) << 8) | mant[2] as u32
}

/// `hex_bits` as carried in block reports.
pub fn hex_bits(target: U256) -> String {
    format!("{:06X}", compact_bits_upper_bound(target))
}
