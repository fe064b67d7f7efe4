//! Fixed-size async worker pool with a bounded submission queue.
//!
//! ```text
//!   submit() ──► [ bounded mpsc, capacity N ] ──► worker 1..W ──► job.await
//!      ▲ blocks while full                          │
//!      └──────────── cancel ◄── shutdown() ─────────┘
//! ```
//!
//! - [`WorkerPool::submit`] waits for a free slot; this is the only
//!   backpressure between the queue reader and the workers.
//! - Workers check the cancellation token between jobs. A job that has
//!   started always runs to completion.
//! - [`WorkerPool::shutdown`] discards jobs still waiting in the queue and
//!   reports how many were dropped.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A unit of work run by one worker.
pub type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

pub struct WorkerPool {
    sender: mpsc::Sender<Job>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
    completed: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Spawn `workers` workers fed by a queue holding at most `capacity`
    /// pending jobs. Both values are clamped to at least 1.
    pub fn new(workers: usize, capacity: usize) -> Self {
        Self::with_token(workers, capacity, CancellationToken::new())
    }

    /// Like [`WorkerPool::new`], stopping when `cancel` fires.
    pub fn with_token(workers: usize, capacity: usize, cancel: CancellationToken) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let completed = Arc::new(AtomicUsize::new(0));

        let handles = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    receiver.clone(),
                    cancel.clone(),
                    completed.clone(),
                ))
            })
            .collect();

        Self {
            sender,
            receiver,
            cancel,
            workers: handles,
            completed,
        }
    }

    /// Queue `job`, waiting while the queue is full.
    ///
    /// Fails only once the pool is shutting down; a job is never dropped
    /// silently by a successful submit.
    pub async fn submit<F>(&self, job: F) -> Result<(), PoolClosed>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(PoolClosed);
        }
        let job: Job = Box::pin(job);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PoolClosed),
            sent = self.sender.send(job) => sent.map_err(|_| PoolClosed),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Jobs run to completion so far.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop the pool: idle workers exit at once, busy ones after their
    /// current job. Jobs still queued are dropped unrun. Returns the number
    /// of dropped jobs.
    pub async fn shutdown(self) -> usize {
        self.cancel.cancel();
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        let mut receiver = self.receiver.lock().await;
        receiver.close();
        let mut discarded = 0;
        while receiver.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            warn!(discarded, "Worker pool shut down with queued jobs");
        } else {
            info!("Worker pool shut down");
        }
        discarded
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
    completed: Arc<AtomicUsize>,
) {
    debug!(worker = id, "Worker started");
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = next else { break };
        job.await;
        completed.fetch_add(1, Ordering::SeqCst);
    }
    debug!(worker = id, "Worker stopped");
}
