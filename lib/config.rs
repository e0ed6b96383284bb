//! Engine settings and construction of the worker pool.

use rayon::{ ThreadPool, ThreadPoolBuilder };
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to build worker pool: {0}")]
    Build(rayon::ThreadPoolBuildError),

    #[error("failed to build worker pool: zero threads requested")]
    NoThreads,
}
use PoolError::*;
pub type PoolResult<T> = Result<T, PoolError>;

/// Settings shared by the sweep and the effective Hamiltonian.
///
/// ```
/// use renorm_ops::config::EngineConfig;
///
/// let config = EngineConfig::new().threads(2).offset_energy(-1.5);
/// assert_eq!(config.n_threads(), 2);
/// let pool = config.build_pool().unwrap();
/// assert_eq!(pool.current_num_threads(), 2);
/// ```
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct EngineConfig {
    threads: usize,
    offset_energy: f64,
    log_blocks: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self { threads: num_cpus::get(), offset_energy: 0.0, log_blocks: false }
    }
}

impl EngineConfig {
    /// Default settings: one thread per logical CPU, no energy offset.
    pub fn new() -> Self { Self::default() }

    /// Set the number of worker threads.
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the constant added to the diagonal of the effective Hamiltonian.
    pub fn offset_energy(mut self, offset: f64) -> Self {
        self.offset_energy = offset;
        self
    }

    /// Emit a `trace` record for every block processed.
    pub fn log_blocks(mut self, log_blocks: bool) -> Self {
        self.log_blocks = log_blocks;
        self
    }

    pub fn n_threads(&self) -> usize { self.threads }

    pub fn energy_offset(&self) -> f64 { self.offset_energy }

    pub fn logs_blocks(&self) -> bool { self.log_blocks }

    /// Build a dedicated pool with the configured number of threads.
    pub fn build_pool(&self) -> PoolResult<ThreadPool> {
        if self.threads == 0 { return Err(NoThreads); }
        ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .thread_name(|k| format!("renorm-worker-{k}"))
            .build()
            .map_err(Build)
    }
}
