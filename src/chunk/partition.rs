//! Byte-range arithmetic for fixed-size partitions.
//!
//! Part `n` (1-based) covers `[(n-1)*chunk, min(n*chunk, total) - 1]`.

use crate::chunk::error::{ChunkError, ChunkResult};
use crate::chunk::types::ChunkDescriptor;

/// `ceil(total_size / chunk_size)`, at least one part for a non-empty file.
///
/// `None` when `chunk_size` is zero or the count does not fit a part number.
pub fn total_chunks(total_size: u64, chunk_size: u64) -> Option<u32> {
    if chunk_size == 0 {
        return None;
    }
    u32::try_from(total_size.div_ceil(chunk_size)).ok()
}

/// Inclusive byte range of `part_number`, or `None` if the part does not exist.
pub fn expected_range(part_number: u32, chunk_size: u64, total_size: u64) -> Option<(u64, u64)> {
    if part_number == 0 || chunk_size == 0 {
        return None;
    }
    let start = (part_number as u64 - 1).checked_mul(chunk_size)?;
    if start >= total_size {
        return None;
    }
    let end = start.saturating_add(chunk_size).min(total_size) - 1;
    Some((start, end))
}

/// Whether `total_chunks` parts of `chunk_size` tile exactly `total_size` bytes
pub fn layout_is_consistent(total_size: u64, chunk_size: u64, total_chunks: u32) -> bool {
    if total_chunks == 0 || chunk_size == 0 {
        return false;
    }
    let n = total_chunks as u64;
    match chunk_size.checked_mul(n - 1) {
        Some(before_last) if before_last < total_size => {
            // Overflow past u64 always covers total_size
            chunk_size.checked_mul(n).map_or(true, |covered| total_size <= covered)
        }
        _ => false,
    }
}

/// Check a server-issued batch against the expected partition and return it
/// ordered by part number.
///
/// Every part in `from..=to` must be present exactly once with the exact
/// byte range the partition implies and a non-empty URL.
pub fn validate_batch(
    mut descriptors: Vec<ChunkDescriptor>,
    from: u32,
    to: u32,
    chunk_size: u64,
    total_size: u64,
) -> ChunkResult<Vec<ChunkDescriptor>> {
    descriptors.sort_by_key(|d| d.part_number);

    let expected = (to - from + 1) as usize;
    if descriptors.len() != expected {
        return Err(ChunkError::Protocol(format!(
            "expected {expected} chunk URLs for parts {from}-{to}, got {}",
            descriptors.len()
        )));
    }

    for (descriptor, part) in descriptors.iter().zip(from..=to) {
        if descriptor.part_number != part {
            return Err(ChunkError::Protocol(format!(
                "unexpected part {} in batch {from}-{to}",
                descriptor.part_number
            )));
        }

        let range = expected_range(part, chunk_size, total_size);
        if range != Some((descriptor.start_byte, descriptor.end_byte)) {
            return Err(ChunkError::Protocol(format!(
                "part {part} covers {}-{}, expected {:?}",
                descriptor.start_byte, descriptor.end_byte, range
            )));
        }

        if descriptor.upload_url.is_empty() {
            return Err(ChunkError::Protocol(format!("part {part} has no upload URL")));
        }
    }

    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn descriptor(part: u32, start: u64, end: u64) -> ChunkDescriptor {
        ChunkDescriptor {
            part_number: part,
            start_byte: start,
            end_byte: end,
            upload_url: format!("https://s3/part{part}"),
        }
    }

    #[test]
    fn test_total_chunks_rounds_up() {
        assert_eq!(total_chunks(25 * MIB, 5 * MIB), Some(5));
        assert_eq!(total_chunks(25 * MIB + 1, 5 * MIB), Some(6));
        assert_eq!(total_chunks(1, 5 * MIB), Some(1));
        assert_eq!(total_chunks(10, 0), None);
    }

    #[test]
    fn test_total_chunks_beyond_part_numbers() {
        // 8 TiB in 1 KiB parts needs 2^33 parts
        assert_eq!(total_chunks(8 << 40, 1024), None);
        assert_eq!(total_chunks(u32::MAX as u64, 1), Some(u32::MAX));
    }

    #[test]
    fn test_huge_layout_values_do_not_overflow() {
        assert!(!layout_is_consistent(25 * MIB, 1 << 40, u32::MAX));
        assert!(!layout_is_consistent(u64::MAX, u64::MAX, u32::MAX));
        assert!(layout_is_consistent(u64::MAX, u64::MAX, 1));
        assert_eq!(expected_range(u32::MAX, u64::MAX, u64::MAX), None);
        assert_eq!(expected_range(2, u64::MAX - 1, u64::MAX), Some((u64::MAX - 1, u64::MAX - 1)));
    }

    #[test]
    fn test_partition_is_exact_and_disjoint() {
        let total = 11 * MIB + 17;
        let chunk = 5 * MIB;
        let n = total_chunks(total, chunk).unwrap();
        assert_eq!(n, 3);

        let mut covered = 0u64;
        let mut next_start = 0u64;
        for part in 1..=n {
            let (start, end) = expected_range(part, chunk, total).unwrap();
            assert_eq!(start, next_start);
            covered += end - start + 1;
            next_start = end + 1;
        }
        assert_eq!(covered, total);
        assert_eq!(expected_range(3, chunk, total), Some((10 * MIB, total - 1)));
        assert_eq!(expected_range(n + 1, chunk, total), None);
        assert_eq!(expected_range(0, chunk, total), None);
    }

    #[test]
    fn test_layout_consistency() {
        assert!(layout_is_consistent(25 * MIB, 5 * MIB, 5));
        assert!(layout_is_consistent(21 * MIB, 5 * MIB, 5));
        // Too many parts: the last one would be empty
        assert!(!layout_is_consistent(20 * MIB, 5 * MIB, 5));
        // Too few parts
        assert!(!layout_is_consistent(26 * MIB, 5 * MIB, 5));
        assert!(!layout_is_consistent(10, 5, 0));
    }

    #[test]
    fn test_validate_batch_sorts_by_part() {
        let batch = vec![descriptor(2, 5, 9), descriptor(1, 0, 4), descriptor(3, 10, 11)];
        let ordered = validate_batch(batch, 1, 3, 5, 12).unwrap();
        let parts: Vec<u32> = ordered.iter().map(|d| d.part_number).collect();
        assert_eq!(parts, vec![1, 2, 3]);
    }

    #[test]
    fn test_validate_batch_rejects_wrong_range() {
        let batch = vec![descriptor(1, 0, 4), descriptor(2, 5, 10)];
        assert!(matches!(
            validate_batch(batch, 1, 2, 5, 12),
            Err(ChunkError::Protocol(_))
        ));
    }

    #[test]
    fn test_validate_batch_rejects_gaps_and_duplicates() {
        let missing = vec![descriptor(1, 0, 4)];
        assert!(validate_batch(missing, 1, 2, 5, 12).is_err());

        let duplicate = vec![descriptor(1, 0, 4), descriptor(1, 0, 4)];
        assert!(validate_batch(duplicate, 1, 2, 5, 12).is_err());
    }

    #[test]
    fn test_validate_batch_rejects_empty_url() {
        let mut d = descriptor(1, 0, 4);
        d.upload_url.clear();
        assert!(validate_batch(vec![d], 1, 1, 5, 5).is_err());
    }
}
