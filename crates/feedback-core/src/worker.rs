//! Single-consumer feedback queue.
//!
//! Producers submit events through a cloneable [`FeedbackSender`]; one tokio
//! task drains the queue and runs each event through the [`FeedbackLoop`] in
//! arrival order. Each submission gets its own reply.

use std::sync::Arc;

use tokio::sync::oneshot::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::error::WorkerError;
use crate::domain::feedback::FeedbackEvent;
use crate::feedback_loop::{FeedbackLoop, FeedbackOutcome};

struct Job {
    event: FeedbackEvent,
    reply: oneshot::Sender<FeedbackOutcome>,
}

/// Handle for submitting events to a running worker.
#[derive(Clone)]
pub struct FeedbackSender {
    tx: mpsc::Sender<Job>,
}

impl FeedbackSender {
    /// Queue an event and wait for its outcome. Applies backpressure when the
    /// queue is full.
    pub async fn submit(&self, event: FeedbackEvent) -> Result<FeedbackOutcome, WorkerError> {
        self.enqueue(event).await?.outcome().await
    }

    /// Queue an event without waiting for it to be processed. Only waits
    /// while the queue is full.
    pub async fn enqueue(&self, event: FeedbackEvent) -> Result<PendingOutcome, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Job { event, reply })
            .await
            .map_err(|_| WorkerError::Closed)?;
        Ok(PendingOutcome { rx })
    }
}

/// The outcome of an event that is queued or being processed.
#[derive(Debug)]
pub struct PendingOutcome {
    rx: oneshot::Receiver<FeedbackOutcome>,
}

impl PendingOutcome {
    pub async fn outcome(self) -> Result<FeedbackOutcome, WorkerError> {
        self.rx.await.map_err(|_| WorkerError::Closed)
    }

    /// `None` while the event is still queued or in flight.
    pub fn try_outcome(&mut self) -> Option<Result<FeedbackOutcome, WorkerError>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(Ok(outcome)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(WorkerError::Closed)),
        }
    }
}

pub struct FeedbackWorker {
    sender: FeedbackSender,
    handle: JoinHandle<usize>,
}

impl FeedbackWorker {
    pub fn sender(&self) -> FeedbackSender {
        self.sender.clone()
    }

    /// Close the queue and wait for the worker to drain it. Returns how many
    /// events were processed.
    ///
    /// The queue only closes once every [`FeedbackSender`] clone is dropped.
    pub async fn shutdown(self) -> Result<usize, WorkerError> {
        drop(self.sender);
        self.handle
            .await
            .map_err(|e| WorkerError::Join(e.to_string()))
    }
}

/// Spawn the consumer task. `capacity` bounds the queue (minimum 1).
pub fn spawn_worker(feedback_loop: Arc<FeedbackLoop>, capacity: usize) -> FeedbackWorker {
    let (tx, mut rx) = mpsc::channel::<Job>(capacity.max(1));

    let handle = tokio::spawn(async move {
        let mut processed = 0usize;
        while let Some(job) = rx.recv().await {
            let outcome = feedback_loop.process_feedback_detailed(job.event).await;
            processed += 1;
            if job.reply.send(outcome).is_err() {
                debug!("submitter went away before the outcome was ready");
            }
        }
        info!(processed, "feedback worker stopped");
        processed
    });

    FeedbackWorker {
        sender: FeedbackSender { tx },
        handle,
    }
}
