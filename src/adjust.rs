//! Index arithmetic for structural edits.
//!
//! When `n` rows are inserted at `at`, every index `>= at` moves down by `n`.
//! When the range `[at, at + n)` is removed, indices inside it disappear and
//! every index past it moves up by `n`. The same rules apply to columns.

/// Helper to adjust indices after an insert or remove of a contiguous range.
pub struct IndexAdjuster;

impl IndexAdjuster {
    /// New position of `index` after inserting `count` entries at `at`.
    pub fn after_insert(index: usize, at: usize, count: usize) -> usize {
        if index >= at {
            index + count
        } else {
            index
        }
    }

    /// New position of `index` after removing `[at, at + count)`, or `None`
    /// if the index itself was removed.
    pub fn after_remove(index: usize, at: usize, count: usize) -> Option<usize> {
        if index < at {
            Some(index)
        } else if index < at + count {
            None
        } else {
            Some(index - count)
        }
    }

    /// Number of entries of `[start, start + len)` that fall in `[at, at + count)`.
    pub fn overlap(start: usize, len: usize, at: usize, count: usize) -> usize {
        let lo = start.max(at);
        let hi = (start + len).min(at + count);
        hi.saturating_sub(lo)
    }

    /// Adjust a region `[start, start + len)` for a removal. Returns the new
    /// start and length; the length may become zero.
    pub fn shrink_range(start: usize, len: usize, at: usize, count: usize) -> (usize, usize) {
        let removed = Self::overlap(start, len, at, count);
        let new_start = if start < at {
            start
        } else if start < at + count {
            at
        } else {
            start - count
        };
        (new_start, len - removed)
    }
}
