//! Resource name hashing
//!
//! Slot tables identify named resources by a 32-bit hash plus a
//! case-insensitive name comparison. The hash folds ASCII case so that
//! `"Ship.TX"` and `"ship.tx"` land on the same value.

/// Hash a resource name, ignoring ASCII case
pub fn name_hash(name: &str) -> u32 {
    let mut hash: u32 = 0;
    for byte in name.bytes() {
        hash = (hash << 4).wrapping_add(u32::from(byte.to_ascii_lowercase()));
        let high = hash & 0xF000_0000;
        if high != 0 {
            hash ^= high >> 24;
            hash ^= high;
        }
    }
    hash
}

/// Compare two resource names the way slot tables do
pub fn names_match(hash_a: u32, name_a: &str, hash_b: u32, name_b: &str) -> bool {
    hash_a == hash_b && name_a.eq_ignore_ascii_case(name_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_ignores_case() {
        assert_eq!(name_hash("RESOURCE/TEXTURES/SHIP.TX"), name_hash("resource/textures/ship.tx"));
    }

    #[test]
    fn test_hash_distinguishes_names() {
        assert_ne!(name_hash("ship.tx"), name_hash("sail.tx"));
        assert_eq!(name_hash(""), 0);
    }

    #[test]
    fn test_names_match_requires_hash_and_name() {
        let a = name_hash("Ship");
        assert!(names_match(a, "Ship", name_hash("SHIP"), "SHIP"));
        assert!(!names_match(a, "Ship", a, "Sail"));
    }
}
