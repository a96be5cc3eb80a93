//! K-way mergers of sorted runs.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::marker::PhantomData;

/// Merge algorithm used to combine sorted runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeStrategy {
    /// Min-heap over run heads. *m* \* log(*n*).
    #[default]
    Heap,
    /// Scans every run head for each emitted item. *m* \* *n*.
    LinearScan,
}

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of runs (inputs).
///
/// A run is dropped, releasing whatever it holds, as soon as it is drained.
pub struct BinaryHeapMerger<T, E, C>
where
    T: Ord,
    C: IntoIterator<Item = Result<T, E>>,
{
    // min-heap of run heads, ties are taken from the run with the lower index
    heads: BinaryHeap<Reverse<(T, usize)>>,
    runs: Vec<Option<C::IntoIter>>,
    initiated: bool,

    error_type: PhantomData<E>,
}

impl<T, E, C> BinaryHeapMerger<T, E, C>
where
    T: Ord,
    C: IntoIterator<Item = Result<T, E>>,
{
    /// Creates an instance of a binary heap merger using runs as inputs.
    /// Run items should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `runs` - Runs to be merged in a single sorted one
    pub fn new<I>(runs: I) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let runs = Vec::from_iter(runs.into_iter().map(|run| Some(run.into_iter())));
        let heads = BinaryHeap::with_capacity(runs.len());

        return BinaryHeapMerger {
            heads,
            runs,
            initiated: false,
            error_type: PhantomData,
        };
    }

    /// Pulls the next item of a run into the heap. Drops the run once exhausted.
    fn advance(&mut self, idx: usize) -> Result<(), E> {
        if let Some(run) = self.runs[idx].as_mut() {
            match run.next() {
                Some(item) => self.heads.push(Reverse((item?, idx))),
                None => self.runs[idx] = None,
            }
        }

        return Ok(());
    }
}

impl<T, E, C> Iterator for BinaryHeapMerger<T, E, C>
where
    T: Ord,
    C: IntoIterator<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            for idx in 0..self.runs.len() {
                if let Err(err) = self.advance(idx) {
                    return Some(Err(err));
                }
            }
        }

        let Reverse((item, idx)) = self.heads.pop()?;
        if let Err(err) = self.advance(idx) {
            return Some(Err(err));
        }

        return Some(Ok(item));
    }
}

struct Cursor<T, R> {
    head: Option<T>,
    run: Option<R>,
}

impl<T, E, R> Cursor<T, R>
where
    R: Iterator<Item = Result<T, E>>,
{
    fn advance(&mut self) -> Result<(), E> {
        self.head = match self.run.as_mut().and_then(Iterator::next) {
            Some(item) => Some(item?),
            None => {
                self.run = None;
                None
            }
        };

        return Ok(());
    }
}

/// Linear scan merger implementation.
/// Keeps the current head of every run and picks the smallest one by scanning all of them.
/// Time complexity is *m* \* *n* where *m* is the number of items, *n* is the number of runs.
/// Emits exactly the same sequence as [`BinaryHeapMerger`].
pub struct LinearScanMerger<T, E, C>
where
    T: Ord,
    C: IntoIterator<Item = Result<T, E>>,
{
    cursors: Vec<Cursor<T, C::IntoIter>>,
    initiated: bool,

    error_type: PhantomData<E>,
}

impl<T, E, C> LinearScanMerger<T, E, C>
where
    T: Ord,
    C: IntoIterator<Item = Result<T, E>>,
{
    /// Creates an instance of a linear scan merger using runs as inputs.
    /// Run items should be sorted in ascending order otherwise the result is undefined.
    pub fn new<I>(runs: I) -> Self
    where
        I: IntoIterator<Item = C>,
    {
        let cursors = Vec::from_iter(runs.into_iter().map(|run| Cursor {
            head: None,
            run: Some(run.into_iter()),
        }));

        return LinearScanMerger {
            cursors,
            initiated: false,
            error_type: PhantomData,
        };
    }
}

impl<T, E, C> Iterator for LinearScanMerger<T, E, C>
where
    T: Ord,
    C: IntoIterator<Item = Result<T, E>>,
{
    type Item = Result<T, E>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.initiated {
            self.initiated = true;
            for cursor in self.cursors.iter_mut() {
                if let Err(err) = cursor.advance() {
                    return Some(Err(err));
                }
            }
        }

        let mut min_idx: Option<usize> = None;
        for (idx, cursor) in self.cursors.iter().enumerate() {
            if let Some(head) = &cursor.head {
                let is_smaller = match min_idx.and_then(|min_idx| self.cursors[min_idx].head.as_ref()) {
                    Some(min_head) => head < min_head,
                    None => true,
                };
                if is_smaller {
                    min_idx = Some(idx);
                }
            }
        }

        let cursor = &mut self.cursors[min_idx?];
        let item = cursor.head.take()?;
        if let Err(err) = cursor.advance() {
            return Some(Err(err));
        }

        return Some(Ok(item));
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{BinaryHeapMerger, LinearScanMerger, MergeStrategy};

    type Run = Vec<Result<i32, String>>;

    fn merge(strategy: MergeStrategy, runs: Vec<Run>) -> Run {
        match strategy {
            MergeStrategy::Heap => BinaryHeapMerger::new(runs).collect(),
            MergeStrategy::LinearScan => LinearScanMerger::new(runs).collect(),
        }
    }

    #[rstest]
    #[case(
        vec![],
        vec![],
    )]
    #[case(
        vec![
            vec![],
            vec![]
        ],
        vec![],
    )]
    #[case(
        vec![
            vec![Ok(4), Ok(5), Ok(7)],
            vec![Ok(1), Ok(6)],
            vec![Ok(3)],
            vec![],
        ],
        vec![Ok(1), Ok(3), Ok(4), Ok(5), Ok(6), Ok(7)],
    )]
    #[case(
        vec![
            vec![Ok(2), Ok(2)],
            vec![Ok(1), Ok(2)],
        ],
        vec![Ok(1), Ok(2), Ok(2), Ok(2)],
    )]
    #[case(
        vec![
            vec![Err("test error".to_string())]
        ],
        vec![
            Err("test error".to_string())
        ],
    )]
    #[case(
        vec![
            vec![Ok(3), Err("test error".to_string())],
            vec![Ok(1), Ok(2)],
        ],
        vec![
            Ok(1),
            Ok(2),
            Err("test error".to_string()),
        ],
    )]
    fn test_merger(#[case] runs: Vec<Run>, #[case] expected_result: Run) {
        for strategy in [MergeStrategy::Heap, MergeStrategy::LinearScan] {
            let actual_result = merge(strategy, runs.clone());
            assert_eq!(actual_result, expected_result, "strategy={:?}", strategy);
        }
    }

    #[test]
    fn test_strategies_agree() {
        let runs: Vec<Run> = (0..7)
            .map(|run| {
                let mut items = Vec::from_iter((0..50).map(|i| (i * 7 + run * 13) % 41));
                items.sort();
                items.into_iter().map(Ok).collect()
            })
            .collect();

        let heap = merge(MergeStrategy::Heap, runs.clone());
        let scan = merge(MergeStrategy::LinearScan, runs.clone());

        let mut expected: Run = runs.into_iter().flatten().collect();
        expected.sort();

        assert_eq!(heap.len(), 350);
        assert_eq!(heap, expected);
        assert_eq!(scan, expected);
    }

    #[test]
    fn test_drained_runs_are_released() {
        let mut merger = BinaryHeapMerger::new(vec![vec![Ok::<i32, String>(1)], vec![Ok(2), Ok(3)]]);
        assert_eq!(merger.next(), Some(Ok(1)));
        assert!(merger.runs[0].is_none());
        assert!(merger.runs[1].is_some());
    }
}
