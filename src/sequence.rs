//! Row storage for materialized tables.
//!
//! `TieredVec` keeps its elements in blocks of roughly √N entries with a
//! cumulative start index per block, so reads are a binary search over block
//! starts and mid-table inserts or removals only shift one block plus the
//! start array.

/// Tiered vector using sqrt decomposition.
///
/// - O(log √N) random access
/// - O(√N) insert/remove of a single element
/// - O(1) amortized append
#[derive(Debug, Clone)]
pub struct TieredVec<T> {
    blocks: Vec<Vec<T>>,
    block_starts: Vec<usize>,
    size: usize,
}

impl<T> TieredVec<T> {
    const MIN_BLOCK_SIZE: usize = 16;
    const MAX_BLOCK_SIZE: usize = 4096;

    pub fn new() -> Self {
        TieredVec {
            blocks: Vec::new(),
            block_starts: Vec::new(),
            size: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn ideal_block_size(&self) -> usize {
        let sqrt = (self.size as f64).sqrt() as usize;
        sqrt.clamp(Self::MIN_BLOCK_SIZE, Self::MAX_BLOCK_SIZE)
    }

    /// (block, offset) of `index`; caller guarantees `index < size`.
    fn locate(&self, index: usize) -> (usize, usize) {
        let block = match self.block_starts.binary_search(&index) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        (block, index - self.block_starts[block])
    }

    fn shift_starts_after(&mut self, block: usize, delta: isize) {
        for start in self.block_starts.iter_mut().skip(block + 1) {
            *start = start.wrapping_add_signed(delta);
        }
    }

    fn maybe_split(&mut self, block: usize) {
        let threshold = 2 * self.ideal_block_size();
        if self.blocks[block].len() <= threshold {
            return;
        }
        let mid = self.blocks[block].len() / 2;
        let tail = self.blocks[block].split_off(mid);
        let tail_start = self.block_starts[block] + mid;
        self.blocks.insert(block + 1, tail);
        self.block_starts.insert(block + 1, tail_start);
    }

    fn maybe_merge(&mut self, block: usize) {
        if self.blocks[block].is_empty() {
            self.blocks.remove(block);
            self.block_starts.remove(block);
            return;
        }
        if self.blocks.len() <= 1 {
            return;
        }
        let ideal = self.ideal_block_size();
        if self.blocks[block].len() >= ideal / 4 {
            return;
        }
        if block + 1 < self.blocks.len()
            && self.blocks[block].len() + self.blocks[block + 1].len() <= 2 * ideal
        {
            let next = self.blocks.remove(block + 1);
            self.block_starts.remove(block + 1);
            self.blocks[block].extend(next);
        } else if block > 0
            && self.blocks[block - 1].len() + self.blocks[block].len() <= 2 * ideal
        {
            let current = self.blocks.remove(block);
            self.block_starts.remove(block);
            self.blocks[block - 1].extend(current);
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.size {
            return None;
        }
        let (block, offset) = self.locate(index);
        self.blocks[block].get(offset)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.size {
            return None;
        }
        let (block, offset) = self.locate(index);
        self.blocks[block].get_mut(offset)
    }

    pub fn push(&mut self, value: T) {
        match self.blocks.last_mut() {
            Some(last) => last.push(value),
            None => {
                self.blocks.push(vec![value]);
                self.block_starts.push(0);
            }
        }
        self.size += 1;
        let last = self.blocks.len() - 1;
        self.maybe_split(last);
    }

    /// Insert at `index` (`index == len` appends). Returns false when out of range.
    pub fn insert(&mut self, index: usize, value: T) -> bool {
        if index > self.size {
            return false;
        }
        if index == self.size {
            self.push(value);
            return true;
        }
        let (block, offset) = self.locate(index);
        self.blocks[block].insert(offset, value);
        self.size += 1;
        self.shift_starts_after(block, 1);
        self.maybe_split(block);
        true
    }

    pub fn remove(&mut self, index: usize) -> Option<T> {
        if index >= self.size {
            return None;
        }
        let (block, offset) = self.locate(index);
        let value = self.blocks[block].remove(offset);
        self.size -= 1;
        self.shift_starts_after(block, -1);
        self.maybe_merge(block);
        Some(value)
    }

    /// Remove `[at, at + count)` clamped to the current length.
    pub fn remove_range(&mut self, at: usize, count: usize) -> Vec<T> {
        let end = (at + count).min(self.size);
        let mut removed = Vec::with_capacity(end.saturating_sub(at));
        for _ in at..end {
            if let Some(value) = self.remove(at) {
                removed.push(value);
            }
        }
        removed
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
        self.block_starts.clear();
        self.size = 0;
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.blocks.iter().flat_map(|block| block.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.blocks.iter_mut().flat_map(|block| block.iter_mut())
    }

    pub(crate) fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl<T: Clone> TieredVec<T> {
    /// Insert `count` copies of `value` at `index`.
    pub fn insert_many(&mut self, index: usize, count: usize, value: T) -> bool {
        if index > self.size {
            return false;
        }
        for i in 0..count {
            self.insert(index + i, value.clone());
        }
        true
    }
}

impl<T> Default for TieredVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> FromIterator<T> for TieredVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut vec = TieredVec::new();
        for value in iter {
            vec.push(value);
        }
        vec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_get() {
        let mut seq = TieredVec::new();
        seq.push(10);
        seq.push(20);
        seq.push(30);

        assert_eq!(seq.len(), 3);
        assert_eq!(seq.get(0), Some(&10));
        assert_eq!(seq.get(2), Some(&30));
        assert_eq!(seq.get(3), None);
    }

    #[test]
    fn test_insert_middle() {
        let mut seq: TieredVec<i32> = (0..10).collect();
        assert!(seq.insert(5, 99));
        assert_eq!(seq.len(), 11);
        assert_eq!(seq.get(5), Some(&99));
        assert_eq!(seq.get(6), Some(&5));
        assert!(!seq.insert(20, 1));
    }

    #[test]
    fn test_remove_range() {
        let mut seq: TieredVec<i32> = (0..10).collect();
        assert_eq!(seq.remove_range(2, 3), vec![2, 3, 4]);
        assert_eq!(seq.iter().copied().collect::<Vec<_>>(), vec![0, 1, 5, 6, 7, 8, 9]);
        assert_eq!(seq.remove_range(5, 10), vec![8, 9]);
        assert_eq!(seq.len(), 5);
    }

    #[test]
    fn test_large_sequence_splits_blocks() {
        let mut seq: TieredVec<usize> = (0..10_000).collect();
        assert!(seq.block_count() > 1);
        for i in 0..10_000 {
            assert_eq!(seq.get(i), Some(&i));
        }

        seq.insert(5000, usize::MAX);
        assert_eq!(seq.get(5000), Some(&usize::MAX));
        assert_eq!(seq.get(5001), Some(&5000));
        assert_eq!(seq.remove(5000), Some(usize::MAX));
        assert_eq!(seq.get(5000), Some(&5000));
    }

    #[test]
    fn test_remove_all_then_reuse() {
        let mut seq: TieredVec<i32> = (0..100).collect();
        while seq.remove(0).is_some() {}
        assert!(seq.is_empty());
        seq.push(7);
        assert_eq!(seq.get(0), Some(&7));
    }

    #[test]
    fn test_insert_many_and_mutate() {
        let mut seq: TieredVec<i32> = vec![1, 2].into_iter().collect();
        seq.insert_many(1, 3, 0);
        assert_eq!(seq.iter().copied().collect::<Vec<_>>(), vec![1, 0, 0, 0, 2]);
        if let Some(v) = seq.get_mut(2) {
            *v = 5;
        }
        for v in seq.iter_mut() {
            *v += 1;
        }
        assert_eq!(seq.iter().copied().collect::<Vec<_>>(), vec![2, 1, 6, 1, 3]);
    }
}
