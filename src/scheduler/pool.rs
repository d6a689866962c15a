// src/scheduler/pool.rs
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Sender};

use crate::core::lock::lock_mutex;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed set of worker threads draining one job queue.
pub struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(size: usize, name: &str) -> std::io::Result<Self> {
        let (tx, rx) = channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(size.max(1));

        for i in 0..size.max(1) {
            let rx = rx.clone();
            let handle = thread::Builder::new()
                .name(format!("{}-{}", name, i))
                .spawn(move || {
                    for job in rx.iter() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            log::error!("[pool] job panicked");
                        }
                    }
                })?;
            workers.push(handle);
        }

        Ok(Self {
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
        })
    }

    /// Queues a job. Returns false (and drops the job) once the pool is shut down.
    pub fn execute(&self, job: Job) -> bool {
        match lock_mutex(&self.sender, "pool.execute").as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        }
    }

    /// Closes the queue and waits for every queued and running job.
    pub fn shutdown(&self) {
        drop(lock_mutex(&self.sender, "pool.shutdown").take());
        let workers = std::mem::take(&mut *lock_mutex(&self.workers, "pool.shutdown.workers"));
        for worker in workers {
            if worker.join().is_err() {
                log::error!("[pool] worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
