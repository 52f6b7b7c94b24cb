//! Worker pool the solver runs on between `simulate` and `fetch_results`.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size pool of solver threads fed through a shared job queue.
pub struct SolverDispatcher {
    tx_job: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl SolverDispatcher {
    pub fn new(worker_count: usize) -> Self {
        let (tx_job, rx_job) = unbounded::<Job>();
        let workers = (0..worker_count.max(1))
            .filter_map(|i| {
                let rx = rx_job.clone();
                match thread::Builder::new()
                    .name(format!("physics-solver-{}", i))
                    .spawn(move || worker_loop(rx))
                {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        log::error!("Failed to spawn physics solver worker {}: {}", i, e);
                        None
                    }
                }
            })
            .collect::<Vec<_>>();
        log::debug!("Physics dispatcher started with {} workers", workers.len());

        Self {
            tx_job: Some(tx_job),
            workers,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Queue a job. Returns false if the pool is shut down or has no workers.
    pub fn dispatch(&self, job: impl FnOnce() + Send + 'static) -> bool {
        if self.workers.is_empty() {
            return false;
        }
        match &self.tx_job {
            Some(tx) => tx.send(Box::new(job)).is_ok(),
            None => false,
        }
    }

    /// Queue a job, or run it on the calling thread when no worker can take it.
    pub fn execute(&self, job: impl FnOnce() + Send + 'static) {
        let job: Job = Box::new(job);
        let job = match &self.tx_job {
            Some(tx) if !self.workers.is_empty() => match tx.send(job) {
                Ok(()) => return,
                Err(err) => err.0,
            },
            _ => job,
        };
        log::warn!("No physics solver worker available, running job inline");
        job();
    }

    /// Stop accepting jobs and join every worker once the queue drains.
    pub fn shutdown(&mut self) {
        self.tx_job.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for SolverDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(rx_job: Receiver<Job>) {
    while let Ok(job) = rx_job.recv() {
        // A panicking solve drops its result sender, which the waiting scene reports.
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            log::error!(
                "Physics job panicked on {}",
                thread::current().name().unwrap_or("solver thread")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn jobs_run_on_workers() {
        let dispatcher = SolverDispatcher::new(2);
        assert_eq!(dispatcher.worker_count(), 2);

        let (tx, rx) = bounded(4);
        for i in 0..4 {
            let tx = tx.clone();
            assert!(dispatcher.dispatch(move || {
                let _ = tx.send(i * 2);
            }));
        }
        let mut results: Vec<i32> = (0..4).map(|_| rx.recv().unwrap()).collect();
        results.sort();
        assert_eq!(results, vec![0, 2, 4, 6]);
    }

    #[test]
    fn panicking_job_does_not_kill_the_worker() {
        let dispatcher = SolverDispatcher::new(1);
        let (tx, rx) = bounded::<u32>(1);
        let dropped = tx.clone();
        dispatcher.dispatch(move || {
            let _keep = dropped;
            panic!("solver blew up");
        });
        dispatcher.dispatch(move || {
            let _ = tx.send(7);
        });
        assert_eq!(rx.recv().unwrap(), 7);
    }

    #[test]
    fn shut_down_pool_refuses_jobs() {
        let mut dispatcher = SolverDispatcher::new(1);
        dispatcher.shutdown();
        assert!(!dispatcher.dispatch(|| {}));
    }

    #[test]
    fn execute_falls_back_to_calling_thread() {
        let mut dispatcher = SolverDispatcher::new(1);
        dispatcher.shutdown();
        let (tx, rx) = bounded(1);
        dispatcher.execute(move || {
            let _ = tx.send(thread::current().id());
        });
        assert_eq!(rx.try_recv().unwrap(), thread::current().id());
    }
}
