//! WorkerPool - bounded work queue with a fixed set of async workers
//!
//! Each worker owns one bounded channel. Submission never waits: a full
//! queue rejects the job with `Error::QueueFull` and the caller decides
//! whether to log it as lost. Keyed submission always lands on the same
//! worker, so jobs sharing a key run in submission order.

use crate::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Processes one job. Failures are the handler's to log.
#[async_trait]
pub trait JobHandler<J>: Send + Sync + 'static {
    async fn handle(&self, job: J);
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerPoolStats {
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    rejected: AtomicU64,
    completed: AtomicU64,
}

pub struct WorkerPool<J> {
    name: &'static str,
    senders: Mutex<Option<Vec<mpsc::Sender<J>>>>,
    handles: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    next: AtomicUsize,
    workers: usize,
    counters: Arc<Counters>,
}

impl<J: Send + 'static> WorkerPool<J> {
    /// Spawn `workers` tasks, each with a queue of `capacity` jobs.
    /// Must be called from within a tokio runtime.
    pub fn new<H: JobHandler<J>>(
        name: &'static str,
        workers: usize,
        capacity: usize,
        handler: Arc<H>,
    ) -> Self {
        let workers = workers.max(1);
        let counters = Arc::new(Counters::default());
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for worker in 0..workers {
            let (tx, mut rx) = mpsc::channel::<J>(capacity.max(1));
            let handler = handler.clone();
            let counters = counters.clone();
            handles.push(tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    handler.handle(job).await;
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                }
                tracing::debug!(pool = name, worker, "Worker drained");
            }));
            senders.push(tx);
        }

        tracing::info!(pool = name, workers, capacity, "Worker pool started");

        Self {
            name,
            senders: Mutex::new(Some(senders)),
            handles: tokio::sync::Mutex::new(handles),
            next: AtomicUsize::new(0),
            workers,
            counters,
        }
    }

    /// Submit to the next worker in rotation
    pub fn submit(&self, job: J) -> Result<()> {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.workers;
        self.submit_to(index, job)
    }

    /// Submit to the worker owning `key`
    pub fn submit_keyed<K: Hash + ?Sized>(&self, key: &K, job: J) -> Result<()> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() % self.workers as u64) as usize;
        self.submit_to(index, job)
    }

    fn submit_to(&self, index: usize, job: J) -> Result<()> {
        let senders = self.senders.lock().unwrap_or_else(|p| p.into_inner());
        let Some(senders) = senders.as_ref() else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(Error::QueueFull(format!("{} pool is shut down", self.name)));
        };

        match senders[index].try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(Error::QueueFull(format!(
                    "{} worker {} queue is full",
                    self.name, index
                )))
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(Error::QueueFull(format!(
                    "{} worker {} has exited",
                    self.name, index
                )))
            }
        }
    }

    /// Close the queues and wait for queued jobs to finish
    pub async fn shutdown(&self) {
        let senders = self
            .senders
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        drop(senders);

        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(pool = self.name, error = %e, "Worker task failed");
            }
        }

        let stats = self.stats();
        tracing::info!(
            pool = self.name,
            submitted = stats.submitted,
            rejected = stats.rejected,
            completed = stats.completed,
            "Worker pool stopped"
        );
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::{Notify, Semaphore};

    struct Recorder {
        seen: Mutex<Vec<(u32, u32)>>,
    }

    #[async_trait]
    impl JobHandler<(u32, u32)> for Recorder {
        async fn handle(&self, job: (u32, u32)) {
            tokio::task::yield_now().await;
            self.seen.lock().unwrap().push(job);
        }
    }

    #[tokio::test]
    async fn test_keyed_jobs_keep_order() {
        let handler = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let pool = WorkerPool::new("test", 4, 64, handler.clone());

        for key in 0..5u32 {
            for seq in 0..5u32 {
                pool.submit_keyed(&key, (key, seq)).unwrap();
            }
        }
        pool.shutdown().await;

        let seen = handler.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 25);
        for key in 0..5u32 {
            let seqs: Vec<u32> = seen.iter().filter(|j| j.0 == key).map(|j| j.1).collect();
            assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
        }
        assert_eq!(pool.stats().completed, 25);
    }

    struct Gate {
        started: Notify,
        permits: Semaphore,
    }

    #[async_trait]
    impl JobHandler<u32> for Gate {
        async fn handle(&self, _job: u32) {
            self.started.notify_one();
            if let Ok(permit) = self.permits.acquire().await {
                permit.forget();
            }
        }
    }

    #[tokio::test]
    async fn test_full_queue_rejects_without_blocking() {
        let gate = Arc::new(Gate {
            started: Notify::new(),
            permits: Semaphore::new(0),
        });
        let pool = WorkerPool::new("gated", 1, 1, gate.clone());

        pool.submit(1).unwrap();
        gate.started.notified().await;
        // worker is busy with job 1; job 2 fills the single slot
        pool.submit(2).unwrap();
        let rejected = pool.submit(3);
        assert!(matches!(rejected, Err(Error::QueueFull(_))));
        assert_eq!(pool.stats().rejected, 1);

        gate.permits.add_permits(2);
        pool.shutdown().await;
        assert_eq!(pool.stats().completed, 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails() {
        let handler = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        let pool = WorkerPool::new("closed", 2, 4, handler);
        pool.shutdown().await;
        assert!(pool.submit((0, 0)).is_err());
    }
}
