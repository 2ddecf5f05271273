//! Serial write queue (C2).
//!
//! At most one enqueued task runs at a time, in FIFO order. If the backlog
//! reaches `max_pending`, new tasks are dropped rather than blocking the
//! caller — mirrors the "never block the producer" shape of the teacher's
//! `github::background_sync` timer loops, but applied to a bounded work
//! queue instead of an interval.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Job {
    label: String,
    task: BoxedTask,
}

/// A single-task-at-a-time executor with a bounded backlog.
///
/// Cloning a `SerialQueue` shares the same underlying channel and counters;
/// all clones enqueue onto the same FIFO drained by the one background task
/// spawned in [`SerialQueue::new`].
#[derive(Clone)]
pub struct SerialQueue {
    sender: mpsc::Sender<Job>,
    pending: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
    max_pending: usize,
}

impl SerialQueue {
    /// Spawn a new serial queue with the given backlog bound.
    pub fn new(max_pending: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<Job>(max_pending.max(1));
        let pending = Arc::new(AtomicUsize::new(0));
        let pending_for_task = pending.clone();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                debug!(label = %job.label, "serial queue: running task");
                job.task.await;
                pending_for_task.fetch_sub(1, Ordering::SeqCst);
            }
        });

        Self {
            sender,
            pending,
            dropped: Arc::new(AtomicUsize::new(0)),
            max_pending,
        }
    }

    /// Enqueue a fire-and-forget task. If the backlog is already at
    /// `max_pending`, the task is dropped and [`SerialQueue::dropped_count`]
    /// is incremented; the caller is never blocked.
    pub fn enqueue<F>(&self, label: impl Into<String>, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let label = label.into();
        if self.pending.load(Ordering::SeqCst) >= self.max_pending {
            self.dropped.fetch_add(1, Ordering::SeqCst);
            warn!(label = %label, "serial queue: dropping task, backlog full");
            return;
        }

        let job = Job {
            label: label.clone(),
            task: Box::pin(task),
        };

        match self.sender.try_send(job) {
            Ok(()) => {
                self.pending.fetch_add(1, Ordering::SeqCst);
            }
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::SeqCst);
                warn!(label = %label, "serial queue: dropping task, channel rejected send");
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}
