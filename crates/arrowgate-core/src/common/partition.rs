//! Pure partition planning functions.
//!
//! A dataset is streamed as an ordered list of record batches. To let the
//! gateway fetch a large dataset over several tunnels in parallel, the
//! metadata response advertises a partition count derived from the dataset's
//! byte size, and each streaming request carries a ticket selecting one
//! contiguous slice of the batch list.
//!
//! Both functions here are pure so the planning decision can be tested
//! exhaustively and never depends on connection state.

use core::ops::Range;

const MIB: u64 = 1024 * 1024;

/// Recommended partition count for a dataset of `total_bytes`.
///
/// Thresholds are byte-driven, not row-driven, because transfer cost tracks
/// bytes: under 10 MiB a single stream wins, then 2, 4, and finally 8
/// partitions for datasets of 100 MiB and above. Returns 1 whenever
/// partitioned fetch is disabled by configuration.
pub fn partition_count(total_bytes: u64, enabled: bool) -> u32 {
    if !enabled {
        return 1;
    }
    if total_bytes < 10 * MIB {
        1
    } else if total_bytes < 50 * MIB {
        2
    } else if total_bytes < 100 * MIB {
        4
    } else {
        8
    }
}

/// Batch-index range owned by partition `index` of `count` over a list of
/// `len` batches.
///
/// Boundaries are computed by even index scaling (`start = len * p / n`),
/// which makes the slices contiguous, non-overlapping, and their union the
/// full list. A request with `count <= 1`, or a dataset with a single batch,
/// maps the entire list to partition 0. An out-of-range index (a malformed
/// ticket) saturates to an empty range past the end rather than failing the
/// request.
pub fn partition_slice(index: u32, count: u32, len: usize) -> Range<usize> {
    if count <= 1 || len <= 1 {
        // Everything lands in partition 0; higher indices own nothing.
        return if index == 0 { 0..len } else { len..len };
    }
    let count = count as usize;
    let index = index as usize;
    let start = (len * index / count).min(len);
    let end = (len * (index + 1) / count).min(len);
    start..end
}
