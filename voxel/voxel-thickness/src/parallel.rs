//! Chunked parallel loops with per-worker scratch state.
//!
//! Every stage of the pipeline is a loop over independent rows, slices, or
//! voxels. [`ParallelForEach`] splits such a loop into one contiguous chunk
//! per worker and runs the chunks on a dedicated rayon pool. Scratch buffers
//! are passed in explicitly, one per worker, so that a stage can reuse them
//! across calls without any thread-local state.

use std::marker::PhantomData;
use std::num::NonZeroUsize;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::debug;

use crate::error::{ThicknessError, ThicknessResult};

/// Cooperative cancellation flag shared between a caller and running loops.
///
/// # Example
///
/// ```
/// use voxel_thickness::Interrupt;
///
/// let interrupt = Interrupt::new();
/// let handle = interrupt.clone();
/// handle.raise();
/// assert!(interrupt.is_raised());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    /// Creates a lowered flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once cancellation was requested.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Lowers the flag again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

/// Executes index loops in parallel on a fixed pool of workers.
///
/// The range `[start, stop)` is cut into at most `workers` contiguous chunks.
/// All chunks run to completion or to their first error; the error of the
/// lowest-numbered failing chunk is returned.
///
/// # Example
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use voxel_thickness::ParallelForEach;
///
/// let pool = ParallelForEach::new(Some(3)).unwrap();
/// let sum = AtomicUsize::new(0);
/// pool.for_each(0..100, |i| {
///     sum.fetch_add(i, Ordering::Relaxed);
///     Ok(())
/// })
/// .unwrap();
/// assert_eq!(sum.into_inner(), 4950);
/// ```
#[derive(Debug)]
pub struct ParallelForEach {
    pool: rayon::ThreadPool,
    workers: usize,
    interrupt: Interrupt,
}

impl ParallelForEach {
    /// Starts a pool with `threads` workers, or one per hardware thread.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::InvalidArgument`] for zero threads and
    /// [`ThicknessError::WorkerPool`] if the pool cannot be started.
    pub fn new(threads: Option<usize>) -> ThicknessResult<Self> {
        let workers = threads.unwrap_or_else(|| {
            std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
        });
        if workers == 0 {
            return Err(ThicknessError::invalid_argument("worker count must be positive"));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("thickness-worker-{i}"))
            .build()?;
        debug!(workers, "Started worker pool");
        Ok(Self {
            pool,
            workers,
            interrupt: Interrupt::new(),
        })
    }

    /// Replaces the interrupt flag checked by every loop.
    #[must_use]
    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// The interrupt flag checked by every loop.
    #[must_use]
    pub const fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    /// Number of workers.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Builds one scratch state per worker.
    pub fn scratch<S>(&self, mut init: impl FnMut() -> S) -> Vec<S> {
        (0..self.workers).map(|_| init()).collect()
    }

    /// Fails with [`ThicknessError::Interrupted`] if cancellation was requested.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::Interrupted`] when the flag is raised.
    pub fn check_interrupt(&self) -> ThicknessResult<()> {
        if self.interrupt.is_raised() {
            Err(ThicknessError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Runs `body` for every index in `range`.
    ///
    /// # Errors
    ///
    /// Returns the first error produced by `body`, in chunk order, or
    /// [`ThicknessError::Interrupted`].
    pub fn for_each<F>(&self, range: Range<usize>, body: F) -> ThicknessResult<()>
    where
        F: Fn(usize) -> ThicknessResult<()> + Sync,
    {
        let mut units = vec![(); self.workers];
        self.for_each_with(range, &mut units, |i, ()| body(i))
    }

    /// Runs `body` for every index in `range`, handing each chunk exclusive
    /// access to one element of `states`.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::InvalidArgument`] if fewer states than
    /// workers are supplied, otherwise the first error produced by `body`
    /// in chunk order, or [`ThicknessError::Interrupted`].
    pub fn for_each_with<S, F>(
        &self,
        range: Range<usize>,
        states: &mut [S],
        body: F,
    ) -> ThicknessResult<()>
    where
        S: Send,
        F: Fn(usize, &mut S) -> ThicknessResult<()> + Sync,
    {
        if range.is_empty() {
            return Ok(());
        }
        let len = range.len();
        let chunk = len.div_ceil(self.workers.min(len));
        let chunks = len.div_ceil(chunk);
        if states.len() < chunks {
            return Err(ThicknessError::invalid_argument(format!(
                "{} scratch states for {chunks} chunks",
                states.len()
            )));
        }

        let start = range.start;
        let stop = range.end;
        let results: Vec<ThicknessResult<()>> = self.pool.install(|| {
            states[..chunks]
                .par_iter_mut()
                .enumerate()
                .map(|(k, state)| {
                    let lo = start + k * chunk;
                    let hi = (lo + chunk).min(stop);
                    for i in lo..hi {
                        self.check_interrupt()?;
                        body(i, state)?;
                    }
                    Ok(())
                })
                .collect()
        });
        results.into_iter().collect()
    }

    /// Runs `body` on consecutive `chunk_len`-sized pieces of `data`, passing
    /// each piece its ordinal. The last piece may be shorter.
    ///
    /// Use this for loops over contiguous rows or slices; pieces are plain
    /// `&mut [T]` borrows.
    ///
    /// # Errors
    ///
    /// Returns [`ThicknessError::InvalidArgument`] for a zero `chunk_len` on
    /// non-empty data, otherwise the first error produced by `body` in piece
    /// order, or [`ThicknessError::Interrupted`].
    ///
    /// # Example
    ///
    /// ```
    /// use voxel_thickness::ParallelForEach;
    ///
    /// let pool = ParallelForEach::new(Some(2)).unwrap();
    /// let mut rows = vec![0u32; 12];
    /// pool.for_each_chunk_mut(&mut rows, 4, |row, values| {
    ///     values.fill(row as u32);
    ///     Ok(())
    /// })
    /// .unwrap();
    /// assert_eq!(rows, [0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2]);
    /// ```
    pub fn for_each_chunk_mut<T, F>(
        &self,
        data: &mut [T],
        chunk_len: usize,
        body: F,
    ) -> ThicknessResult<()>
    where
        T: Send,
        F: Fn(usize, &mut [T]) -> ThicknessResult<()> + Sync,
    {
        if data.is_empty() {
            return Ok(());
        }
        if chunk_len == 0 {
            return Err(ThicknessError::invalid_argument("chunk length must be positive"));
        }
        let results: Vec<ThicknessResult<()>> = self.pool.install(|| {
            data.par_chunks_mut(chunk_len)
                .enumerate()
                .map(|(i, chunk)| {
                    self.check_interrupt()?;
                    body(i, chunk)
                })
                .collect()
        });
        results.into_iter().collect()
    }
}

/// Shared write access to a slice for tasks that touch disjoint indices.
///
/// Only for strided access: Y and Z row sweeps read and write positions
/// spaced a row or a slice apart, which no slice split can express.
/// Contiguous pieces go through [`ParallelForEach::for_each_chunk_mut`].
pub(crate) struct DisjointWriter<'a, T> {
    ptr: *mut T,
    len: usize,
    _marker: PhantomData<&'a mut [T]>,
}

// SAFETY: the writer only hands out access to `T` under the per-index
// exclusivity contract of its unsafe methods.
unsafe impl<T: Send> Send for DisjointWriter<'_, T> {}
// SAFETY: as above; shared references to `T` may cross threads.
unsafe impl<T: Send + Sync> Sync for DisjointWriter<'_, T> {}

impl<'a, T> DisjointWriter<'a, T> {
    pub(crate) fn new(slice: &'a mut [T]) -> Self {
        Self {
            ptr: slice.as_mut_ptr(),
            len: slice.len(),
            _marker: PhantomData,
        }
    }

    /// Reference to element `index`.
    ///
    /// # Safety
    ///
    /// No other task may write `index` while the reference is alive.
    pub(crate) unsafe fn get(&self, index: usize) -> &T {
        assert!(index < self.len, "index {index} out of bounds for {}", self.len);
        // SAFETY: in bounds; exclusivity is the caller's contract.
        unsafe { &*self.ptr.add(index) }
    }

    /// Replaces element `index`, returning the previous value.
    ///
    /// # Safety
    ///
    /// No other task may read or write `index` during the current parallel
    /// call.
    pub(crate) unsafe fn replace(&self, index: usize, value: T) -> T {
        assert!(index < self.len, "index {index} out of bounds for {}", self.len);
        // SAFETY: in bounds; exclusivity is the caller's contract.
        unsafe { std::ptr::replace(self.ptr.add(index), value) }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(
            ParallelForEach::new(Some(0)),
            Err(ThicknessError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_every_index_visited_once() {
        let pool = ParallelForEach::new(Some(4)).unwrap();
        let hits: Vec<AtomicUsize> = (0..37).map(|_| AtomicUsize::new(0)).collect();
        pool.for_each(3..37, |i| {
            hits[i].fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
        .unwrap();
        for (i, hit) in hits.iter().enumerate() {
            let expected = usize::from(i >= 3);
            assert_eq!(hit.load(Ordering::Relaxed), expected, "index {i}");
        }
    }

    #[test]
    fn test_range_smaller_than_workers() {
        let pool = ParallelForEach::new(Some(8)).unwrap();
        let mut states = pool.scratch(Vec::new);
        pool.for_each_with(0..3, &mut states, |i, seen: &mut Vec<usize>| {
            seen.push(i);
            Ok(())
        })
        .unwrap();
        let mut all: Vec<usize> = states.into_iter().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, vec![0, 1, 2]);
    }

    #[test]
    fn test_chunks_are_contiguous_per_state() {
        let pool = ParallelForEach::new(Some(3)).unwrap();
        let mut states = pool.scratch(Vec::new);
        pool.for_each_with(0..10, &mut states, |i, seen: &mut Vec<usize>| {
            seen.push(i);
            Ok(())
        })
        .unwrap();
        assert_eq!(states[0], vec![0, 1, 2, 3]);
        assert_eq!(states[1], vec![4, 5, 6, 7]);
        assert_eq!(states[2], vec![8, 9]);
    }

    #[test]
    fn test_too_few_states() {
        let pool = ParallelForEach::new(Some(4)).unwrap();
        let mut states = vec![0u8; 2];
        let result = pool.for_each_with(0..100, &mut states, |_, _| Ok(()));
        assert!(matches!(result, Err(ThicknessError::InvalidArgument(_))));
    }

    #[test]
    fn test_first_error_in_chunk_order() {
        let pool = ParallelForEach::new(Some(4)).unwrap();
        let result = pool.for_each(0..40, |i| {
            if i == 35 || i == 12 {
                Err(ThicknessError::invalid_argument(format!("bad {i}")))
            } else {
                Ok(())
            }
        });
        match result {
            Err(ThicknessError::InvalidArgument(msg)) => assert_eq!(msg, "bad 12"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_interrupt_stops_loop() {
        let interrupt = Interrupt::new();
        let pool = ParallelForEach::new(Some(2)).unwrap().with_interrupt(interrupt.clone());
        interrupt.raise();
        let result = pool.for_each(0..10, |_| Ok(()));
        assert!(matches!(result, Err(ThicknessError::Interrupted)));

        interrupt.reset();
        assert!(pool.for_each(0..10, |_| Ok(())).is_ok());
    }

    #[test]
    fn test_chunk_mut_pieces_in_order() {
        let pool = ParallelForEach::new(Some(3)).unwrap();
        let mut data = vec![(0usize, 0usize); 11];
        pool.for_each_chunk_mut(&mut data, 4, |piece, values| {
            let len = values.len();
            for v in values.iter_mut() {
                *v = (piece, len);
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(data[0], (0, 4));
        assert_eq!(data[7], (1, 4));
        assert_eq!(data[8], (2, 3));
        assert_eq!(data[10], (2, 3));
    }

    #[test]
    fn test_chunk_mut_errors() {
        let pool = ParallelForEach::new(Some(4)).unwrap();
        let mut data = vec![0u8; 20];
        let zero = pool.for_each_chunk_mut(&mut data, 0, |_, _| Ok(()));
        assert!(matches!(zero, Err(ThicknessError::InvalidArgument(_))));
        assert!(pool.for_each_chunk_mut(&mut [] as &mut [u8], 0, |_, _| Ok(())).is_ok());

        let result = pool.for_each_chunk_mut(&mut data, 2, |piece, _| {
            if piece == 3 || piece == 8 {
                Err(ThicknessError::invalid_argument(format!("bad {piece}")))
            } else {
                Ok(())
            }
        });
        match result {
            Err(ThicknessError::InvalidArgument(msg)) => assert_eq!(msg, "bad 3"),
            other => panic!("unexpected {other:?}"),
        }

        pool.interrupt().raise();
        let result = pool.for_each_chunk_mut(&mut data, 2, |_, _| Ok(()));
        assert!(matches!(result, Err(ThicknessError::Interrupted)));
    }

    #[test]
    fn test_disjoint_writer_strided_rows() {
        let pool = ParallelForEach::new(Some(4)).unwrap();
        let mut data = vec![0usize; 6 * 5];
        {
            let writer = DisjointWriter::new(&mut data);
            // Columns of a 6x5 image: each task owns one column.
            pool.for_each(0..6, |column| {
                for row in 0..5 {
                    // SAFETY: index belongs to this column only.
                    unsafe { writer.replace(row * 6 + column, column * 10 + row) };
                }
                Ok(())
            })
            .unwrap();
        }
        assert_eq!(data[6 * 4 + 5], 54);
        assert_eq!(data[3], 30);
    }
}
