//! Work decomposition for simulation and baking
//!
//! A `JobGraph` is an ordered list of independent jobs; a `ThreadPool`
//! with a fixed worker count executes every job before returning. Baking
//! jobs poll a shared cancellation flag between iterations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A unit of work: a plain function with no suspension points.
type Job<'scope> = Box<dyn FnOnce() + Send + 'scope>;

/// Ordered collection of jobs to run on a `ThreadPool`. Jobs may borrow
/// from the enclosing stack frame; `process` joins them all before
/// returning.
#[derive(Default)]
pub struct JobGraph<'scope> {
    jobs: Vec<Job<'scope>>,
}

impl<'scope> JobGraph<'scope> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a job.
    pub fn add_job(&mut self, job: impl FnOnce() + Send + 'scope) {
        self.jobs.push(Box::new(job));
    }

    pub fn num_jobs(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

/// Fixed-worker pool executing job graphs to completion
pub struct ThreadPool {
    pool: rayon::ThreadPool,
    num_workers: usize,
}

impl ThreadPool {
    /// Build with an explicit worker count; 0 selects one worker per
    /// available core minus one, floored at 1.
    pub fn new(num_workers: usize) -> Self {
        let num_workers = if num_workers == 0 {
            (num_cpus::get().saturating_sub(1)).max(1)
        } else {
            num_workers
        };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|i| format!("ef-worker-{i}"))
            .build()
            .expect("worker pool construction cannot fail with a fixed thread count");
        log::debug!("worker pool started with {num_workers} threads");
        Self { pool, num_workers }
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Run every job in the graph; returns when all have finished.
    pub fn process<'scope>(&self, graph: JobGraph<'scope>) {
        if graph.is_empty() {
            return;
        }
        self.pool.scope(|scope| {
            for job in graph.jobs {
                scope.spawn(move |_| job());
            }
        });
    }

    /// Run a closure inside this pool so nested `rayon` iterators use the
    /// fixed worker set instead of the global pool.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }
}

/// Shared cancellation flag polled by baking jobs between probe iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    flag: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request termination at the next probe boundary.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Rearm for a new bake.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_all_jobs_run() {
        let pool = ThreadPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));

        let mut graph = JobGraph::new();
        for _ in 0..64 {
            let counter = Arc::clone(&counter);
            graph.add_job(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.process(graph);
        assert_eq!(counter.load(Ordering::Relaxed), 64);
    }

    #[test]
    fn test_empty_graph() {
        let pool = ThreadPool::new(1);
        pool.process(JobGraph::new());
    }

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        flag.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!flag.is_cancelled());
    }
}
