//! Chunk buffer and chunk capacity policy.

use std::mem;

use log;
use rayon;

use crate::value::Value;

/// Memory budget used when none is configured (100 MiB).
pub const DEFAULT_MEMORY_BUDGET: u64 = 100 * 1024 * 1024;

/// Share of the memory budget a chunk may occupy. The rest is headroom for allocations made while sorting.
pub const MEMORY_SAFETY_FACTOR: f64 = 0.7;

/// Computes how many values one chunk may hold under the given memory budget.
///
/// The budget is divided by the in-memory size of a value, the chunk vector's own bookkeeping is subtracted and the
/// result is scaled by [`MEMORY_SAFETY_FACTOR`]. Never returns less than 1.
pub fn chunk_capacity_for_memory(budget_bytes: u64) -> usize {
    let values = budget_bytes / mem::size_of::<f64>() as u64;
    let values = values.saturating_sub(mem::size_of::<Vec<f64>>() as u64);
    let capacity = (values as f64 * MEMORY_SAFETY_FACTOR) as u64;

    usize::try_from(capacity).unwrap_or(usize::MAX).max(1)
}

/// Buffer limited by values count.
pub struct ChunkBuffer {
    limit: usize,
    inner: Vec<Value>,
}

impl ChunkBuffer {
    /// Creates an empty buffer reserving room for `limit` values up front.
    /// Falls back to growing on demand if the reservation cannot be made.
    pub fn new(limit: usize) -> Self {
        let mut inner = Vec::new();
        if let Err(err) = inner.try_reserve_exact(limit) {
            log::debug!("chunk buffer preallocation of {} values failed: {}", limit, err);
        }

        ChunkBuffer { limit, inner }
    }

    /// Adds a new value to the buffer.
    pub fn push(&mut self, value: Value) {
        self.inner.push(value);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }
}

impl IntoIterator for ChunkBuffer {
    type Item = Value;
    type IntoIter = <Vec<Value> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<Value> for ChunkBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [Value] {
        self.inner.as_mut_slice()
    }
}

#[cfg(test)]
mod test {
    use rayon::slice::ParallelSliceMut;
    use rstest::*;

    use super::{chunk_capacity_for_memory, ChunkBuffer, DEFAULT_MEMORY_BUDGET};
    use crate::value::Value;

    fn value(number: f64) -> Value {
        Value::new(number).unwrap()
    }

    #[test]
    fn test_chunk_buffer() {
        let mut buffer = ChunkBuffer::new(2);
        assert!(buffer.is_empty());

        buffer.push(value(1.0));
        assert!(!buffer.is_full());
        buffer.push(value(0.0));
        assert!(buffer.is_full());
        assert_eq!(buffer.len(), 2);

        buffer.par_sort_unstable();

        let data: Vec<f64> = buffer.into_iter().map(Value::get).collect();
        assert_eq!(data, vec![0.0, 1.0]);
    }

    #[rstest]
    #[case(DEFAULT_MEMORY_BUDGET, 9_175_023)]
    #[case(8 * 1024, 700)]
    #[case(0, 1)]
    #[case(64, 1)]
    fn test_chunk_capacity_for_memory(#[case] budget: u64, #[case] expected: usize) {
        assert_eq!(chunk_capacity_for_memory(budget), expected);
    }
}
