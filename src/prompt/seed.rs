//! Seed normalization.
//!
//! Callers send arbitrary seed strings; vendors want an unsigned 32-bit
//! integer. The mapping is 32-bit FNV-1a over the UTF-8 bytes, so a given
//! seed yields the same value across restarts and hosts.

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

pub fn fnv1a_32(bytes: &[u8]) -> u32 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u32::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// `None` (or a blank seed) means "let the vendor pick".
pub fn normalize_seed(seed: Option<&str>) -> Option<u32> {
    let seed = seed?.trim();
    if seed.is_empty() {
        return None;
    }
    Some(fnv1a_32(seed.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_reference_vectors() {
        assert_eq!(fnv1a_32(b""), 0x811c_9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c_292c);
        assert_eq!(fnv1a_32(b"foobar"), 0xbf9c_f968);
    }

    #[test]
    fn same_seed_same_value() {
        assert_eq!(normalize_seed(Some("monet-42")), normalize_seed(Some("monet-42")));
        assert_ne!(normalize_seed(Some("monet-42")), normalize_seed(Some("monet-43")));
    }

    #[test]
    fn absent_or_blank_seed_is_none() {
        assert_eq!(normalize_seed(None), None);
        assert_eq!(normalize_seed(Some("")), None);
        assert_eq!(normalize_seed(Some("   ")), None);
    }
}
