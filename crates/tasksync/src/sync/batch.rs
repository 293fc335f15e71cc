//! Fixed-size batch runner.
//!
//! Items are processed in batches: the calls of one batch are all started
//! and awaited together, then their results are handed to `apply` in item
//! order before the next batch begins. A pause separates consecutive
//! batches to stay under the tracker's secondary rate limits.

use futures::future::join_all;
use std::future::Future;
use std::time::Duration;
use tracing::trace;

/// Run `call` over `items` in batches of `size`, feeding results to `apply`.
///
/// A `size` of zero is treated as one.
pub async fn for_each_batch<I, T, F, Fut, A>(
    items: Vec<I>,
    size: usize,
    delay: Duration,
    call: F,
    mut apply: A,
) where
    F: Fn(I) -> Fut,
    Fut: Future<Output = T>,
    A: FnMut(T),
{
    let size = size.max(1);
    let total = items.len();
    let mut items = items.into_iter().peekable();
    let mut batch = 0usize;

    while items.peek().is_some() {
        if batch > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let calls: Vec<Fut> = items.by_ref().take(size).map(&call).collect();
        trace!(batch, size = calls.len(), total, "Running batch");
        for result in join_all(calls).await {
            apply(result);
        }
        batch += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[tokio::test(start_paused = true)]
    async fn test_batches_preserve_order_and_pause_between() {
        let started = RefCell::new(Vec::new());
        let mut applied = Vec::new();
        let start = tokio::time::Instant::now();

        for_each_batch(
            (1..=5).collect(),
            2,
            Duration::from_millis(100),
            |n: u32| {
                started.borrow_mut().push(n);
                async move { n * 10 }
            },
            |r| applied.push(r),
        )
        .await;

        assert_eq!(applied, vec![10, 20, 30, 40, 50]);
        assert_eq!(*started.borrow(), vec![1, 2, 3, 4, 5]);
        // three batches, two pauses
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_zero_size_and_empty_input() {
        let mut applied = Vec::new();
        for_each_batch(vec![1, 2], 0, Duration::ZERO, |n: u8| async move { n }, |r| {
            applied.push(r);
        })
        .await;
        assert_eq!(applied, vec![1, 2]);

        let mut called = false;
        for_each_batch(Vec::<u8>::new(), 10, Duration::ZERO, |n| async move { n }, |_| {
            called = true;
        })
        .await;
        assert!(!called);
    }
}
