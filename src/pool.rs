//! Background materialization on tokio's blocking pool.
//!
//! Filter validation jobs block on other filters (a distinct over a join waits
//! for the join's rows), so they run through `spawn_blocking`: a job goes to an
//! idle blocking thread or to a new one up to the thread cap, and threads that
//! stay idle for the keep-alive period exit.

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

const DEFAULT_MAX_WORKERS: usize = 256;
const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

pub struct WorkerPool {
    name: String,
    runtime: Option<Runtime>,
}

impl WorkerPool {
    pub fn new(name: impl Into<String>, max_workers: usize, keep_alive: Duration) -> Self {
        let name = name.into();
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(max_workers.max(1))
            .thread_keep_alive(keep_alive)
            .thread_name(format!("{name}-worker"))
            .build();
        let runtime = match runtime {
            Ok(runtime) => Some(runtime),
            Err(e) => {
                log::error!("failed to start {name} runtime, jobs get their own threads: {e}");
                None
            }
        };
        WorkerPool { name, runtime }
    }

    /// The process-wide pool every filter schedules on.
    pub fn global() -> &'static WorkerPool {
        static POOL: OnceLock<WorkerPool> = OnceLock::new();
        POOL.get_or_init(|| WorkerPool::new("tablelens", DEFAULT_MAX_WORKERS, DEFAULT_KEEP_ALIVE))
    }

    /// Run `job` on a blocking thread. A panicking job is logged and does not
    /// take the pool down.
    pub fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match &self.runtime {
            Some(runtime) => {
                let handle = runtime.spawn_blocking(job);
                let name = self.name.clone();
                runtime.spawn(async move {
                    if let Err(e) = handle.await {
                        log::error!("{name} job failed: {e}");
                    }
                });
            }
            None => {
                let spawned = thread::Builder::new()
                    .name(format!("{}-job", self.name))
                    .spawn(job);
                if let Err(e) = spawned {
                    log::error!("failed to spawn {} job thread: {e}", self.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Arc};

    #[test]
    fn test_runs_jobs() {
        let pool = WorkerPool::new("test", 4, Duration::from_millis(100));
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            pool.execute(move || {
                tx.send(i).unwrap();
            });
        }
        let mut got: Vec<i32> = (0..10).map(|_| rx.recv().unwrap()).collect();
        got.sort();
        assert_eq!(got, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_blocking_jobs_do_not_starve() {
        // The first job waits for the second.
        let pool = WorkerPool::new("test", 8, Duration::from_millis(100));
        let (tx, rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();
        pool.execute(move || {
            rx.recv().unwrap();
            done_tx.send(()).unwrap();
        });
        pool.execute(move || {
            tx.send(()).unwrap();
        });
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_panicking_job_does_not_kill_pool() {
        let pool = WorkerPool::new("test", 1, Duration::from_millis(200));
        pool.execute(|| panic!("boom"));
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let c = Arc::clone(&counter);
        pool.execute(move || {
            c.fetch_add(1, Ordering::SeqCst);
            tx.send(()).unwrap();
        });
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_jobs_can_schedule_jobs() {
        let (tx, rx) = mpsc::channel();
        WorkerPool::global().execute(move || {
            WorkerPool::global().execute(move || {
                tx.send(7).unwrap();
            });
        });
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }
}
