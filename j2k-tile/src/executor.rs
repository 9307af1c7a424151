//! A fixed-size worker pool that runs work in stages.
//!
//! Items of one stage are independent and may run in any order or
//! concurrently. A stage only starts once every item of the previous stage has
//! finished.

use crate::log::{ldebug, lwarn};

/// Runs stages of independent work items on a fixed number of workers.
#[derive(Debug)]
pub struct Executor {
    pool: Option<rayon_core::ThreadPool>,
    num_workers: usize,
}

impl Executor {
    /// Create an executor with `num_workers` workers. Zero selects the
    /// available hardware parallelism.
    ///
    /// With a single worker no threads are started and all work runs on the
    /// calling thread. If the pool cannot be started, the executor falls back
    /// to a single worker.
    pub fn new(num_workers: usize) -> Self {
        let num_workers = if num_workers == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            num_workers
        };

        if num_workers == 1 {
            return Self::single();
        }

        let maybe_pool = rayon_core::ThreadPoolBuilder::new()
            .num_threads(num_workers)
            .thread_name(|index| format!("j2k tile worker #{index}"))
            .build();

        match maybe_pool {
            Ok(pool) => {
                ldebug!("started worker pool with {num_workers} threads");

                Self {
                    pool: Some(pool),
                    num_workers,
                }
            }
            Err(_e) => {
                lwarn!("failed to start worker pool, running sequentially: {_e}");
                Self::single()
            }
        }
    }

    /// Create an executor that runs everything on the calling thread.
    pub fn single() -> Self {
        Self {
            pool: None,
            num_workers: 1,
        }
    }

    /// The number of workers.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Run all stages in order. `work` receives the index of the worker it
    /// runs on, which is always smaller than [`Executor::num_workers`].
    pub fn run_stages<D, F>(&self, stages: Vec<Vec<D>>, work: F)
    where
        D: Send,
        F: Fn(usize, D) + Sync,
    {
        let Some(pool) = &self.pool else {
            for item in stages.into_iter().flatten() {
                work(0, item);
            }

            return;
        };

        let work = &work;

        for stage in stages {
            if stage.is_empty() {
                continue;
            }

            // The scope only returns once all spawned items have finished,
            // which gives the barrier between stages.
            pool.scope_fifo(|s| {
                for item in stage {
                    s.spawn_fifo(move |_| {
                        let worker = rayon_core::current_thread_index().unwrap_or(0);
                        work(worker, item);
                    });
                }
            });
        }
    }

    /// Run a single stage.
    pub fn run_each<D, F>(&self, items: Vec<D>, work: F)
    where
        D: Send,
        F: Fn(usize, D) + Sync,
    {
        self.run_stages(vec![items], work);
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(0)
    }
}
