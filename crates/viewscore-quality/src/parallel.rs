use rayon::prelude::*;
use thiserror::Error;

/// Errors that can occur during parallel execution.
#[derive(Error, Debug, PartialEq)]
pub enum ParallelError {
    /// The thread pool failed to build.
    #[error("failed to build thread pool: {0}")]
    BuildError(String),

    /// The requested thread count is invalid.
    #[error("thread count must be > 0, got {0}")]
    InvalidThreadCount(usize),

    /// The row stride must divide the buffer into whole rows.
    #[error("row stride must be > 0 and divide the buffer length, got {0}")]
    InvalidRowStride(usize),
}

/// Controls how the data-parallel passes are executed.
///
/// A dispatch call returns only after every work item has completed, which is the barrier
/// between two pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum ExecutionStrategy {
    /// Use the global Rayon thread pool to process every work item in parallel.
    #[default]
    ParallelElements,

    /// Run sequentially on the current thread.
    ///
    /// Useful for debugging or tiny inputs.
    Serial,

    /// Run on a local thread pool with `n` threads.
    ///
    /// # Warning
    /// Creates a new thread pool on every call, which has significant overhead.
    /// Use this primarily for benchmarking or specific isolation needs.
    Fixed(usize),
}

impl ExecutionStrategy {
    fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> Result<R, ParallelError> {
        match *self {
            ExecutionStrategy::Fixed(0) => Err(ParallelError::InvalidThreadCount(0)),
            ExecutionStrategy::Fixed(n) => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| ParallelError::BuildError(e.to_string()))?;
                Ok(pool.install(op))
            }
            _ => Ok(op()),
        }
    }
}

/// Run `op` once for every index in `0..len`.
///
/// # Arguments
///
/// * `strategy` - The execution strategy.
/// * `len` - The number of work items.
/// * `op` - The work item, called with its index.
pub fn dispatch_for_each<F>(
    strategy: ExecutionStrategy,
    len: usize,
    op: F,
) -> Result<(), ParallelError>
where
    F: Fn(usize) + Sync + Send,
{
    match strategy {
        ExecutionStrategy::Serial => (0..len).for_each(op),
        _ => strategy.install(|| (0..len).into_par_iter().for_each(op))?,
    }
    Ok(())
}

/// Run `op` once for every row of `data`, each row `stride` elements long.
///
/// Every row is owned by exactly one call, so `op` writes without synchronization.
pub fn dispatch_rows<T, F>(
    strategy: ExecutionStrategy,
    data: &mut [T],
    stride: usize,
    op: F,
) -> Result<(), ParallelError>
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync + Send,
{
    if stride == 0 || data.len() % stride != 0 {
        return Err(ParallelError::InvalidRowStride(stride));
    }

    match strategy {
        ExecutionStrategy::Serial => data
            .chunks_exact_mut(stride)
            .enumerate()
            .for_each(|(row, chunk)| op(row, chunk)),
        _ => strategy.install(|| {
            data.par_chunks_exact_mut(stride)
                .enumerate()
                .for_each(|(row, chunk)| op(row, chunk))
        })?,
    }
    Ok(())
}
