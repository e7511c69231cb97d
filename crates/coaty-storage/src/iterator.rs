//! Cursor abstraction over a query result set.

use async_trait::async_trait;

/// Outcome of draining a [`QueryIterator`]: how many items were yielded,
/// and whether consumption stopped early (the visitor returned `false`)
/// rather than exhausting the underlying result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationOutcome {
    pub count: usize,
    pub was_broken: bool,
}

impl IterationOutcome {
    fn new(count: usize, was_broken: bool) -> Self {
        Self { count, was_broken }
    }
}

/// A one-shot cursor over query results. Exactly one of `for_each` /
/// `for_batch` may be called, since both consume `self` by value: an
/// adapter is free to hold a cursor resource (e.g. a DB cursor handle)
/// that only one draining strategy can claim.
#[async_trait]
pub trait QueryIterator<T>: Send
where
    T: Send,
{
    /// Visit items one at a time in result order. `visitor` returns `false`
    /// to stop early.
    async fn for_each(self: Box<Self>, visitor: &mut (dyn FnMut(T) -> bool + Send)) -> IterationOutcome;

    /// Visit items in fixed-size batches. The final batch may be smaller
    /// than `batch_size`. `visitor` returns `false` to stop early.
    async fn for_batch(
        self: Box<Self>,
        batch_size: usize,
        visitor: &mut (dyn FnMut(Vec<T>) -> bool + Send),
    ) -> IterationOutcome;
}

/// A [`QueryIterator`] backed by an in-memory `Vec`, used by
/// [`crate::memory::MemoryAdapter`] and suitable as scaffolding for any
/// adapter whose backend already materializes results eagerly.
pub struct VecIterator<T> {
    items: Vec<T>,
}

impl<T> VecIterator<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl<T: Send> QueryIterator<T> for VecIterator<T> {
    async fn for_each(self: Box<Self>, visitor: &mut (dyn FnMut(T) -> bool + Send)) -> IterationOutcome {
        let mut count = 0;
        let mut was_broken = false;
        for item in self.items {
            count += 1;
            if !visitor(item) {
                was_broken = true;
                break;
            }
        }
        IterationOutcome::new(count, was_broken)
    }

    async fn for_batch(
        self: Box<Self>,
        batch_size: usize,
        visitor: &mut (dyn FnMut(Vec<T>) -> bool + Send),
    ) -> IterationOutcome {
        assert!(batch_size > 0, "batch_size must be positive");
        let mut count = 0;
        let mut was_broken = false;
        let mut chunk = Vec::with_capacity(batch_size);
        for item in self.items {
            chunk.push(item);
            if chunk.len() == batch_size {
                count += chunk.len();
                let batch = std::mem::replace(&mut chunk, Vec::with_capacity(batch_size));
                if !visitor(batch) {
                    was_broken = true;
                    break;
                }
            }
        }
        if !was_broken && !chunk.is_empty() {
            count += chunk.len();
            if !visitor(chunk) {
                was_broken = true;
            }
        }
        IterationOutcome::new(count, was_broken)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn for_each_visits_every_item_in_order() {
        let it = Box::new(VecIterator::new(vec![1, 2, 3]));
        let mut seen = Vec::new();
        let outcome = it
            .for_each(&mut |x| {
                seen.push(x);
                true
            })
            .await;
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(outcome, IterationOutcome::new(3, false));
    }

    #[tokio::test]
    async fn for_each_stops_early_and_reports_was_broken() {
        let it = Box::new(VecIterator::new(vec![1, 2, 3, 4]));
        let mut seen = Vec::new();
        let outcome = it
            .for_each(&mut |x| {
                seen.push(x);
                x < 2
            })
            .await;
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(outcome, IterationOutcome::new(2, true));
    }

    #[tokio::test]
    async fn for_batch_groups_into_fixed_size_chunks_with_a_final_remainder() {
        let it = Box::new(VecIterator::new(vec![1, 2, 3, 4, 5]));
        let mut batches = Vec::new();
        let outcome = it
            .for_batch(2, &mut |batch| {
                batches.push(batch);
                true
            })
            .await;
        assert_eq!(batches, vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(outcome, IterationOutcome::new(5, false));
    }

    #[tokio::test]
    async fn for_batch_stops_early_without_visiting_later_batches() {
        let it = Box::new(VecIterator::new(vec![1, 2, 3, 4, 5, 6]));
        let mut batches = Vec::new();
        let outcome = it
            .for_batch(2, &mut |batch| {
                batches.push(batch);
                false
            })
            .await;
        assert_eq!(batches, vec![vec![1, 2]]);
        assert_eq!(outcome, IterationOutcome::new(2, true));
    }

    #[tokio::test]
    async fn for_batch_on_empty_input_yields_no_batches() {
        let it: Box<VecIterator<i32>> = Box::new(VecIterator::new(vec![]));
        let mut batches: Vec<Vec<i32>> = Vec::new();
        let outcome = it
            .for_batch(3, &mut |batch| {
                batches.push(batch);
                true
            })
            .await;
        assert!(batches.is_empty());
        assert_eq!(outcome, IterationOutcome::new(0, false));
    }
}
