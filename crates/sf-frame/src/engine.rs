//! Partitioned execution with an explicitly sized worker pool.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use sf_core::{Error, Result};

use crate::source::{EventSource, Partition};

/// Runs event loops over the partitions of a source.
///
/// Each engine owns its own worker pool; nothing is configured process-wide.
#[derive(Debug, Clone)]
pub struct Engine {
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl Engine {
    /// Engine with `threads` workers: 0 = one per available core, 1 = sequential.
    pub fn new(threads: usize) -> Result<Self> {
        if threads == 1 {
            return Ok(Self::sequential());
        }
        let mut builder =
            rayon::ThreadPoolBuilder::new().thread_name(|i| format!("skimflow-worker-{i}"));
        if threads > 0 {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Validation(format!("failed to create thread pool: {e}")))?;
        Ok(Self { pool: Some(Arc::new(pool)) })
    }

    /// Engine that processes partitions one after another on the calling thread.
    pub fn sequential() -> Self {
        Self { pool: None }
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Apply `f` to every partition and return the results in partition order.
    ///
    /// `f` returns its result together with the number of events it read.
    /// Any failure is reported as [`Error::EngineExecution`] naming the
    /// partition and the number of events fully processed before it.
    pub fn run<T, F>(&self, source: &dyn EventSource, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(&Partition) -> Result<(T, u64)> + Sync,
    {
        let partitions = source.partitions();
        let processed = AtomicU64::new(0);
        tracing::debug!(
            source = %source.describe(),
            partitions = partitions.len(),
            threads = self.threads(),
            "starting event loop"
        );

        let one = |p: &Partition| -> Result<T> {
            match f(p) {
                Ok((out, n)) => {
                    processed.fetch_add(n, Ordering::Relaxed);
                    tracing::trace!(partition = %p.label, events = n, "partition done");
                    Ok(out)
                }
                Err(e) => Err(into_execution_error(e, p, processed.load(Ordering::Relaxed))),
            }
        };

        let results = match &self.pool {
            None => partitions.iter().map(one).collect::<Result<Vec<T>>>(),
            Some(pool) => pool.install(|| partitions.par_iter().map(one).collect()),
        };
        if let Err(e) = &results {
            tracing::warn!(error = %e, "event loop failed");
        }
        results
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::sequential()
    }
}

fn into_execution_error(e: Error, p: &Partition, events_processed: u64) -> Error {
    match e {
        Error::EngineExecution { .. } => e,
        other => Error::EngineExecution {
            source_name: p.label.clone(),
            events_processed,
            message: other.to_string(),
        },
    }
}
