//! Parallel processing utilities

use crate::error::{Result, SentinelError};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for parallel processing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// Number of worker threads (None = use all available)
    pub n_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    /// Get the number of threads to use
    pub fn num_threads(&self) -> usize {
        self.n_threads
            .filter(|&n| n > 0)
            .unwrap_or_else(rayon::current_num_threads)
    }
}

/// Parallel map on the global pool. Output order follows input order.
pub fn parallel_map<T, U, F>(items: Vec<T>, f: F) -> Vec<U>
where
    T: Send + Sync,
    U: Send,
    F: Fn(T) -> U + Send + Sync,
{
    items.into_par_iter().map(f).collect()
}

/// Parallel map on a dedicated pool bounded by `config`. Output order
/// follows input order regardless of the thread count.
pub fn parallel_map_with_config<T, U, F>(items: Vec<T>, config: &ParallelConfig, f: F) -> Result<Vec<U>>
where
    T: Send + Sync,
    U: Send,
    F: Fn(T) -> U + Send + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.num_threads())
        .build()
        .map_err(|e| SentinelError::TrainingError(format!("Failed to build worker pool: {}", e)))?;

    Ok(pool.install(|| items.into_par_iter().map(f).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallel_map() {
        let items: Vec<i32> = (0..1000).collect();
        let results = parallel_map(items, |x| x * 2);

        assert_eq!(results.len(), 1000);
        assert_eq!(results[0], 0);
        assert_eq!(results[500], 1000);
    }

    #[test]
    fn test_bounded_pool_preserves_order() {
        let config = ParallelConfig::new().with_threads(2);
        let results = parallel_map_with_config((0..100).collect(), &config, |x: u32| x + 1).unwrap();
        assert_eq!(results, (1..=100).collect::<Vec<u32>>());
    }

    #[test]
    fn test_zero_threads_means_all() {
        let config = ParallelConfig::new().with_threads(0);
        assert_eq!(config.num_threads(), rayon::current_num_threads());
    }
}
