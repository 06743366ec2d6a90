/// djb2 over the UTF-8 bytes of `s` (`h = h * 33 + byte`, seed 5381).
pub fn djb2(s: &str) -> u32 {
    s.bytes()
        .fold(5381u32, |h, b| h.wrapping_mul(33).wrapping_add(u32::from(b)))
}

/// Palette slot of a group that has no mapped value.
pub fn group_index(group: &str, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    djb2(group) as usize % len
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_djb2_known_values() {
        assert_eq!(djb2(""), 5381);
        assert_eq!(djb2("a"), 5381 * 33 + 97);
        assert_ne!(djb2("ab"), djb2("ba"));
    }

    proptest! {
        #[test]
        fn group_index_is_stable(group in ".*", len in 1usize..32) {
            let first = group_index(&group, len);
            prop_assert!(first < len);
            for _ in 0..3 {
                prop_assert_eq!(group_index(&group, len), first);
            }
        }
    }
}
