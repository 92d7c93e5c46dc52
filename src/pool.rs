//! Bounded worker pool for bulk import.

use std::sync::atomic::{AtomicUsize, Ordering};

pub const DEFAULT_WORKERS: usize = 8;

/// Fixed number of scoped workers. Each [`WorkerPool::map`] call spawns at
/// most `workers` threads and joins all of them before returning, so nothing
/// is left in flight between calls.
#[derive(Clone, Copy, Debug)]
pub struct WorkerPool {
    workers: usize,
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl WorkerPool {
    /// A zero count is raised to one worker.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs `f` over every job and returns the results in job order.
    ///
    /// Workers claim jobs through a shared cursor. A panicking job is
    /// re-raised on the caller once the scope has joined.
    pub fn map<J, T, F>(&self, jobs: &[J], f: F) -> Vec<T>
    where
        J: Sync,
        T: Send,
        F: Fn(&J) -> T + Sync,
    {
        if jobs.is_empty() {
            return Vec::new();
        }
        let threads = self.workers.min(jobs.len());
        if threads == 1 {
            return jobs.iter().map(&f).collect();
        }

        let cursor = AtomicUsize::new(0);
        let mut slots: Vec<(usize, T)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    let cursor = &cursor;
                    let f = &f;
                    s.spawn(move || {
                        let mut done = Vec::new();
                        loop {
                            let idx = cursor.fetch_add(1, Ordering::Relaxed);
                            if idx >= jobs.len() {
                                break;
                            }
                            done.push((idx, f(&jobs[idx])));
                        }
                        done
                    })
                })
                .collect();

            handles
                .into_iter()
                .flat_map(|h| match h.join() {
                    Ok(done) => done,
                    Err(e) => std::panic::resume_unwind(e),
                })
                .collect()
        });
        slots.sort_unstable_by_key(|(idx, _)| *idx);
        slots.into_iter().map(|(_, result)| result).collect()
    }
}
