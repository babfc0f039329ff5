//! Packing of `(subscription, section, index)` triples into the single
//! 32-bit integer id DBusMenu addresses items by.
//!
//! The original proxy this engine re-implements hid this behind a helper
//! whose definition wasn't part of the retrieved reference sources — only
//! its call sites survived. The layout below is a fresh, injective design
//! sized to the ranges real GMenu exporters use in practice.

use crate::error::IdError;

/// Subscription id the panel addresses the synthetic application-menu root
/// under; the real remote app-menu subscription is rewritten to this value
/// by [`crate::gmenu::model::MenuModel`] so GMenu's own `0` can mean "the
/// virtual root" instead of colliding with it.
pub const START_INDEX: u32 = 100;

const SUB_BITS: u32 = 11;
const SEC_BITS: u32 = 10;
const IDX_BITS: u32 = 10;

const SUB_MAX: u32 = (1 << SUB_BITS) - 2; // top value reserved, see below
const SEC_MAX: u32 = (1 << SEC_BITS) - 1;

/// Largest packable item index. Also reserved as the index synthetic
/// separator nodes between sibling section groups are packed under, so
/// they get distinct, valid ids instead of colliding at `0`.
pub const IDX_MAX: u32 = (1 << IDX_BITS) - 1;

const IDX_SHIFT: u32 = 0;
const SEC_SHIFT: u32 = IDX_BITS;
const SUB_SHIFT: u32 = IDX_BITS + SEC_BITS;

/// Packs a `(subscription, section, index)` triple into a single non-negative
/// `i32`. Id `0` is reserved for the root and is produced only by
/// `pack(0, 0, 0)`.
///
/// Returns an error rather than wrapping when any field exceeds its
/// reserved width — seeing this in practice would mean either a malformed
/// remote or a bug, and silently wrapping would make two distinct items
/// collide.
pub fn pack(subscription: u32, section: u32, index: u32) -> Result<i32, IdError> {
    if subscription > SUB_MAX {
        return Err(IdError::SubscriptionOutOfRange(subscription));
    }
    if section > SEC_MAX {
        return Err(IdError::SectionOutOfRange(section));
    }
    if index > IDX_MAX {
        return Err(IdError::IndexOutOfRange(index));
    }

    let packed = (subscription << SUB_SHIFT) | (section << SEC_SHIFT) | (index << IDX_SHIFT);
    Ok(packed as i32)
}

/// Inverse of [`pack`]. Never fails: every bit pattern produced by `pack`
/// round-trips, and `unpack` is total over the full `i32` domain because it
/// simply masks out the three fields (the sign bit is always zero for ids
/// this engine produces).
pub fn unpack(id: i32) -> (u32, u32, u32) {
    let id = id as u32;
    let subscription = (id >> SUB_SHIFT) & ((1 << SUB_BITS) - 1);
    let section = (id >> SEC_SHIFT) & ((1 << SEC_BITS) - 1);
    let index = (id >> IDX_SHIFT) & ((1 << IDX_BITS) - 1);
    (subscription, section, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_root() {
        let id = pack(0, 0, 0).unwrap();
        assert_eq!(id, 0);
        assert_eq!(unpack(id), (0, 0, 0));
    }

    #[test]
    fn roundtrip_arbitrary_values() {
        let cases = [
            (1, 0, 0),
            (START_INDEX, 0, 0),
            (START_INDEX, 3, 7),
            (SUB_MAX, SEC_MAX, IDX_MAX),
            (42, 12, 512),
        ];
        for (sub, sec, idx) in cases {
            let id = pack(sub, sec, idx).expect("should pack");
            assert_eq!(unpack(id), (sub, sec, idx), "roundtrip failed for {:?}", (sub, sec, idx));
        }
    }

    #[test]
    fn pack_rejects_out_of_range_fields() {
        assert!(matches!(
            pack(SUB_MAX + 1, 0, 0),
            Err(IdError::SubscriptionOutOfRange(_))
        ));
        assert!(matches!(
            pack(0, SEC_MAX + 1, 0),
            Err(IdError::SectionOutOfRange(_))
        ));
        assert!(matches!(
            pack(0, 0, IDX_MAX + 1),
            Err(IdError::IndexOutOfRange(_))
        ));
    }

    #[test]
    fn distinct_triples_never_collide() {
        use std::collections::HashSet;
        let mut seen = HashSet::new();
        for sub in [0, 1, 2, START_INDEX, SUB_MAX] {
            for sec in [0, 1, 5, SEC_MAX] {
                for idx in [0, 1, 9, IDX_MAX] {
                    let id = pack(sub, sec, idx).unwrap();
                    assert!(seen.insert(id), "collision for {:?}", (sub, sec, idx));
                }
            }
        }
    }
}
