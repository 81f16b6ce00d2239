//! Batch planning and statement generation.

pub mod statements;

use std::num::NonZeroUsize;

use crate::core::value::Row;

pub use statements::{select_eligible, StatementGenerator, StatementSet};

/// A contiguous slice of the eligible rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T = Row> {
    /// 0-based position in the plan.
    pub index: usize,
    pub rows: Vec<T>,
}

impl<T> Batch<T> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Split `rows` into batches of `size`, keeping their order.
///
/// Produces `ceil(n / size)` batches; all but the last hold exactly `size`
/// rows and every row appears exactly once.
pub fn plan_batches<T>(rows: Vec<T>, size: NonZeroUsize) -> Vec<Batch<T>> {
    let size = size.get();
    let mut batches = Vec::with_capacity(rows.len().div_ceil(size));
    let mut iter = rows.into_iter().peekable();

    while iter.peek().is_some() {
        let chunk: Vec<T> = iter.by_ref().take(size).collect();
        batches.push(Batch {
            index: batches.len(),
            rows: chunk,
        });
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_empty_input() {
        assert!(plan_batches(Vec::<u32>::new(), size(3)).is_empty());
    }

    #[test]
    fn test_exact_multiple() {
        let batches = plan_batches((0..1000).collect(), size(10));
        assert_eq!(batches.len(), 100);
        assert!(batches.iter().all(|b| b.len() == 10));
        assert_eq!(batches[99].index, 99);
        assert_eq!(batches[99].rows[9], 999);
    }

    #[test]
    fn test_batch_size_larger_than_input() {
        let batches = plan_batches(vec!['a', 'b'], size(1000));
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].rows, vec!['a', 'b']);
    }

    #[test]
    fn test_partition_properties_small_grid() {
        for n in 0..40usize {
            for s in 1..12usize {
                let batches = plan_batches((0..n).collect::<Vec<_>>(), size(s));
                assert_eq!(batches.len(), n.div_ceil(s), "n={} s={}", n, s);

                for (i, batch) in batches.iter().enumerate() {
                    assert_eq!(batch.index, i);
                    if i + 1 < batches.len() {
                        assert_eq!(batch.len(), s);
                    } else {
                        assert!(batch.len() >= 1 && batch.len() <= s);
                    }
                }

                let flattened: Vec<usize> =
                    batches.into_iter().flat_map(|b| b.rows).collect();
                assert_eq!(flattened, (0..n).collect::<Vec<_>>());
            }
        }
    }
}
