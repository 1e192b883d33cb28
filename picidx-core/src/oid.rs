//! Object IDs and their mapping to bucket file offsets, grounded in
//! `original_source/lib/bucket.h`'s `OBUCK_*` constants.

pub type Oid = u32;

pub const OID_DELETED: Oid = !0u32;
pub const OID_FIRST_SPECIAL: Oid = !0xffffu32;
pub const OBUCK_SHIFT: u32 = 7;
pub const OBUCK_ALIGN: u64 = 1 << OBUCK_SHIFT;

pub fn oid_to_offset(oid: Oid) -> u64 {
    (oid as u64) << OBUCK_SHIFT
}

pub fn offset_to_oid(offset: u64) -> Oid {
    (offset >> OBUCK_SHIFT) as Oid
}

pub fn is_special(oid: Oid) -> bool {
    oid >= OID_FIRST_SPECIAL
}

/// Size of the aligned on-disk extent for a bucket whose payload is
/// `length` bytes: header + payload + trailer, rounded up to `OBUCK_ALIGN`.
pub fn aligned_bucket_size(length: u32) -> u64 {
    const HEADER_LEN: u64 = 16;
    const TRAILER_LEN: u64 = 4;
    let raw = HEADER_LEN + length as u64 + TRAILER_LEN;
    (raw + OBUCK_ALIGN - 1) & !(OBUCK_ALIGN - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_round_trip() {
        for oid in [0u32, 1, 42, 1_000_000] {
            assert_eq!(offset_to_oid(oid_to_offset(oid)), oid);
        }
    }

    #[test]
    fn aligned_size_exact_boundary() {
        // 16 + length + 4 == 128 exactly when length == 108.
        assert_eq!(aligned_bucket_size(108), 128);
        assert_eq!(aligned_bucket_size(109), 256);
    }

    #[test]
    fn aligned_size_zero_length() {
        assert_eq!(aligned_bucket_size(0), 128);
    }
}
