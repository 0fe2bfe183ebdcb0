//! Buffer contents initialization tracking: a bitset of fixed-size chunks
//! recording which byte ranges of a buffer have been written (`spec.md`
//! §4.9). Marking rounds outward to whole chunks so a single-byte write
//! never leaves a sliver of an untracked chunk behind.

/// Byte span of one tracked chunk.
const CHUNK_SIZE: u64 = 4096;

/// Tracks which byte ranges of a resource have been initialized, at
/// [`CHUNK_SIZE`]-byte granularity.
#[derive(Debug, Clone)]
pub struct InitTracker {
    size: u64,
    chunks: Vec<bool>,
}

fn chunk_count(size: u64) -> usize {
    ((size + CHUNK_SIZE - 1) / CHUNK_SIZE) as usize
}

fn chunk_range(offset: u64, len: u64, chunk_count: usize) -> std::ops::Range<usize> {
    if len == 0 {
        return 0..0;
    }
    let start = (offset / CHUNK_SIZE) as usize;
    let end_byte = offset + len;
    let end = ((end_byte + CHUNK_SIZE - 1) / CHUNK_SIZE) as usize;
    start..end.min(chunk_count)
}

impl InitTracker {
    /// A tracker for a resource of `size` bytes, entirely uninitialized.
    pub fn new(size: u64) -> Self {
        Self {
            size,
            chunks: vec![false; chunk_count(size)],
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Mark every chunk overlapping `[offset, offset + len)` as
    /// initialized. Idempotent: marking an already-initialized range is a
    /// no-op.
    pub fn mark_initialized(&mut self, offset: u64, len: u64) {
        let range = chunk_range(offset, len, self.chunks.len());
        for chunk in &mut self.chunks[range] {
            *chunk = true;
        }
    }

    /// `true` iff every chunk overlapping `[offset, offset + len)` has been
    /// marked initialized. An empty range is vacuously initialized.
    pub fn is_initialized(&self, offset: u64, len: u64) -> bool {
        let range = chunk_range(offset, len, self.chunks.len());
        self.chunks[range].iter().all(|&c| c)
    }

    /// `true` iff the whole resource has been initialized.
    pub fn is_fully_initialized(&self) -> bool {
        self.chunks.iter().all(|&c| c)
    }

    /// Every uninitialized sub-range, in chunk-aligned, ascending order, as
    /// `(offset, len)` byte pairs clamped to `size`.
    pub fn uninitialized_ranges(&self) -> Vec<(u64, u64)> {
        let mut ranges = Vec::new();
        let mut run_start: Option<usize> = None;
        for (i, &initialized) in self.chunks.iter().enumerate() {
            match (initialized, run_start) {
                (false, None) => run_start = Some(i),
                (true, Some(start)) => {
                    ranges.push(self.byte_range(start, i));
                    run_start = None;
                }
                _ => {}
            }
        }
        if let Some(start) = run_start {
            ranges.push(self.byte_range(start, self.chunks.len()));
        }
        ranges
    }

    fn byte_range(&self, chunk_start: usize, chunk_end: usize) -> (u64, u64) {
        let start = chunk_start as u64 * CHUNK_SIZE;
        let end = (chunk_end as u64 * CHUNK_SIZE).min(self.size);
        (start, end - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tracker_is_fully_uninitialized() {
        let t = InitTracker::new(10_000);
        assert!(!t.is_fully_initialized());
        assert!(!t.is_initialized(0, 10_000));
    }

    #[test]
    fn marking_rounds_up_to_chunk_boundaries() {
        let mut t = InitTracker::new(CHUNK_SIZE * 4);
        t.mark_initialized(CHUNK_SIZE + 1, 1);
        // Only the chunk containing byte `CHUNK_SIZE + 1` is marked, not its
        // neighbors.
        assert!(!t.is_initialized(0, CHUNK_SIZE));
        assert!(t.is_initialized(CHUNK_SIZE, CHUNK_SIZE));
        assert!(!t.is_initialized(CHUNK_SIZE * 2, CHUNK_SIZE));
    }

    #[test]
    fn mark_is_idempotent_and_monotonic() {
        let mut t = InitTracker::new(CHUNK_SIZE * 2);
        t.mark_initialized(0, CHUNK_SIZE);
        let after_first = t.uninitialized_ranges();
        t.mark_initialized(0, CHUNK_SIZE);
        assert_eq!(t.uninitialized_ranges(), after_first);

        t.mark_initialized(CHUNK_SIZE, CHUNK_SIZE);
        assert!(t.is_fully_initialized());
        // Once fully initialized, further marking cannot un-initialize.
        t.mark_initialized(0, CHUNK_SIZE * 2);
        assert!(t.is_fully_initialized());
    }

    #[test]
    fn uninitialized_ranges_merges_adjacent_chunks() {
        let mut t = InitTracker::new(CHUNK_SIZE * 4);
        t.mark_initialized(CHUNK_SIZE, CHUNK_SIZE);
        assert_eq!(
            t.uninitialized_ranges(),
            vec![(0, CHUNK_SIZE), (CHUNK_SIZE * 2, CHUNK_SIZE * 2)]
        );
    }

    #[test]
    fn last_chunk_clamps_to_resource_size() {
        let size = CHUNK_SIZE + 10;
        let mut t = InitTracker::new(size);
        assert_eq!(t.uninitialized_ranges(), vec![(0, size)]);
        t.mark_initialized(0, size);
        assert!(t.is_fully_initialized());
        assert!(t.uninitialized_ranges().is_empty());
    }

    #[test]
    fn empty_range_is_vacuously_initialized() {
        let t = InitTracker::new(CHUNK_SIZE);
        assert!(t.is_initialized(123, 0));
    }
}
