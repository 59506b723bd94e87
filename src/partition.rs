//! Splitting crater work across a fixed worker pool.
//!
//! Small craters are far more expensive to buffer than large ones, so work
//! lists are interleaved largest/smallest before being cut into contiguous
//! chunks. Chunk results come back over a channel in completion order and are
//! put back into chunk order before they are returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::unbounded;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::debug;

use crate::config::WorkerMode;
use crate::error::{CsfdError, Result};

/// Raised by the first worker that fails; peers stop at their next item.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Sorts ascending by diameter and alternates largest and smallest.
pub fn interleave_by_diameter<T, F>(mut items: Vec<T>, diameter: F) -> Vec<T>
where
    F: Fn(&T) -> f64,
{
    items.sort_by(|a, b| diameter(a).total_cmp(&diameter(b)));
    let n = items.len();
    let mut out = Vec::with_capacity(n);
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    let (mut lo, mut hi) = (0, n);
    while out.len() < n {
        hi -= 1;
        if let Some(item) = slots[hi].take() {
            out.push(item);
        }
        if out.len() < n {
            if let Some(item) = slots[lo].take() {
                out.push(item);
            }
            lo += 1;
        }
    }
    out
}

/// Cuts `items` into at most `parts` contiguous chunks of near-equal size.
pub fn split_even<T>(items: Vec<T>, parts: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let size = items.len().div_ceil(parts.max(1));
    let mut chunks = Vec::with_capacity(parts);
    let mut iter = items.into_iter().peekable();
    while iter.peek().is_some() {
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}

/// Fixed-size pool running one scoped task per chunk.
pub struct WorkerPool {
    pool: ThreadPool,
    workers: usize,
}

impl WorkerPool {
    /// Pool sized for `items` work units.
    pub fn new(mode: WorkerMode, items: usize) -> Result<Self> {
        let workers = mode.resolve(items);
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("csfd-worker-{i}"))
            .build()
            .map_err(|e| CsfdError::WorkerPool(e.to_string()))?;
        Ok(Self { pool, workers })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Applies `f` to every item, keeping input order in the output.
    ///
    /// The first error cancels the remaining items and is returned; the
    /// `Cancelled` errors it causes in other chunks are not.
    pub fn map<T, U, F>(&self, items: Vec<T>, f: F) -> Result<Vec<U>>
    where
        T: Send,
        U: Send,
        F: Fn(T) -> Result<U> + Sync,
    {
        let total = items.len();
        let chunks = split_even(items, self.workers);
        let chunk_count = chunks.len();
        let token = CancellationToken::new();
        let (tx, rx) = unbounded::<(usize, Result<Vec<U>>)>();

        let f = &f;
        let token_ref = &token;
        self.pool.scope(|s| {
            for (index, chunk) in chunks.into_iter().enumerate() {
                let tx = tx.clone();
                s.spawn(move |_| {
                    let result = run_chunk(chunk, f, token_ref);
                    if result.is_err() {
                        token_ref.cancel();
                    }
                    // the receiver outlives the scope
                    let _ = tx.send((index, result));
                });
            }
        });
        drop(tx);

        let mut parts: Vec<(usize, Vec<U>)> = Vec::with_capacity(chunk_count);
        let mut failure: Option<CsfdError> = None;
        for (index, result) in rx.iter() {
            match result {
                Ok(out) => parts.push((index, out)),
                Err(CsfdError::Cancelled) => {
                    failure.get_or_insert(CsfdError::Cancelled);
                }
                Err(e) => {
                    if matches!(failure, None | Some(CsfdError::Cancelled)) {
                        failure = Some(e);
                    }
                }
            }
        }
        if let Some(e) = failure {
            return Err(e);
        }

        parts.sort_by_key(|(index, _)| *index);
        debug!(items = total, chunks = chunk_count, workers = self.workers, "pool map finished");
        Ok(parts.into_iter().flat_map(|(_, out)| out).collect())
    }
}

fn run_chunk<T, U, F>(chunk: Vec<T>, f: &F, token: &CancellationToken) -> Result<Vec<U>>
where
    F: Fn(T) -> Result<U>,
{
    let mut out = Vec::with_capacity(chunk.len());
    for item in chunk {
        if token.is_cancelled() {
            return Err(CsfdError::Cancelled);
        }
        out.push(f(item)?);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleave_alternates_extremes() {
        let out = interleave_by_diameter(vec![3.0, 1.0, 5.0, 2.0, 4.0], |d| *d);
        assert_eq!(out, vec![5.0, 1.0, 4.0, 2.0, 3.0]);
        let even = interleave_by_diameter(vec![1.0, 2.0, 3.0, 4.0], |d| *d);
        assert_eq!(even, vec![4.0, 1.0, 3.0, 2.0]);
        assert!(interleave_by_diameter(Vec::<f64>::new(), |d| *d).is_empty());
    }

    #[test]
    fn split_even_covers_everything() {
        let chunks = split_even((0..10).collect::<Vec<_>>(), 3);
        assert_eq!(chunks, vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7], vec![8, 9]]);
        assert_eq!(split_even(vec![1, 2], 5), vec![vec![1], vec![2]]);
        assert!(split_even(Vec::<i32>::new(), 4).is_empty());
    }

    #[test]
    fn map_keeps_input_order() {
        let pool = WorkerPool::new(WorkerMode::MultiCore { workers: Some(3) }, 100).unwrap();
        assert_eq!(pool.workers(), 3);
        let out = pool.map((0..100).collect(), |i: u64| Ok(i * 2)).unwrap();
        assert_eq!(out, (0..100).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[test]
    fn single_core_pool_runs_inline_chunks() {
        let pool = WorkerPool::new(WorkerMode::SingleCore, 10).unwrap();
        assert_eq!(pool.workers(), 1);
        let out = pool.map(vec![1, 2, 3], |i: i32| Ok(i + 1)).unwrap();
        assert_eq!(out, vec![2, 3, 4]);
    }

    #[test]
    fn first_failure_is_reported_not_cancellation() {
        let pool = WorkerPool::new(WorkerMode::MultiCore { workers: Some(4) }, 400).unwrap();
        let err = pool
            .map((0..400).collect(), |i: usize| {
                if i == 7 {
                    Err(CsfdError::UngeometrizableSelfIntersection {
                        feature: format!("crater {i}"),
                        depth: 4,
                    })
                } else {
                    Ok(i)
                }
            })
            .unwrap_err();
        assert_eq!(
            err,
            CsfdError::UngeometrizableSelfIntersection {
                feature: "crater 7".to_string(),
                depth: 4
            }
        );
    }

    #[test]
    fn token_is_shared_between_clones() {
        let token = CancellationToken::new();
        let peer = token.clone();
        assert!(!peer.is_cancelled());
        token.cancel();
        assert!(peer.is_cancelled());
    }
}
