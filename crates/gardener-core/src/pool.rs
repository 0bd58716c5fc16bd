//! Fixed-size worker pool fed by a bounded job queue.
//!
//! One producer submits jobs; `threads` named workers drain the queue until it
//! is closed. Submitting blocks while the queue is full.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use thiserror::Error;
use tracing::{debug, error};

/// Queue slots per worker thread.
pub const QUEUE_SLOTS_PER_WORKER: usize = 64;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("number of threads is set to {0}, please use at least one worker thread")]
    InvalidThreadCount(usize),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("{0} worker thread(s) panicked")]
    WorkerPanicked(usize),
}

/// Worker threads sharing one handler.
pub struct WorkerPool<T> {
    sender: Option<Sender<T>>,
    workers: Vec<JoinHandle<usize>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Start `threads` workers that run `handler` on every submitted job.
    pub fn spawn<F>(threads: usize, capacity: usize, handler: F) -> Result<Self, PoolError>
    where
        F: Fn(T) + Send + Sync + 'static,
    {
        if threads == 0 {
            return Err(PoolError::InvalidThreadCount(threads));
        }

        let (sender, receiver) = crossbeam_channel::bounded::<T>(capacity.max(1));
        let handler = Arc::new(handler);
        let mut workers = Vec::with_capacity(threads);

        for id in 0..threads {
            let receiver = receiver.clone();
            let handler = Arc::clone(&handler);

            let spawned = thread::Builder::new()
                .name(format!("gardener-worker-{}", id))
                .spawn(move || {
                    debug!("Worker {} started", id);
                    let mut processed = 0;
                    for job in receiver.iter() {
                        handler(job);
                        processed += 1;
                    }
                    debug!("Worker {} finished after {} job(s)", id, processed);
                    processed
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(source) => {
                    drop(sender);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(source));
                }
            }
        }

        Ok(Self {
            sender: Some(sender),
            workers,
        })
    }

    /// Queue a job, blocking while the queue is full.
    ///
    /// Returns false if no worker is left to take it.
    pub fn submit(&self, job: T) -> bool {
        self.sender
            .as_ref()
            .is_some_and(|sender| sender.send(job).is_ok())
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue, wait for every worker and return the number of jobs run.
    pub fn close_and_join(mut self) -> Result<usize, PoolError> {
        self.sender.take();

        let mut processed = 0;
        let mut panicked = 0;
        for handle in self.workers.drain(..) {
            match handle.join() {
                Ok(count) => processed += count,
                Err(_) => panicked += 1,
            }
        }

        if panicked > 0 {
            error!("{} worker thread(s) panicked", panicked);
            return Err(PoolError::WorkerPanicked(panicked));
        }
        Ok(processed)
    }
}

impl<T> Drop for WorkerPool<T> {
    fn drop(&mut self) {
        self.sender.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
