//! Bounded queue and the worker pool draining it into the event sink.

use std::sync::Arc;

use flume::{Receiver, Sender};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::record::Event;
use crate::sink::EventSink;
use crate::stats::Stats;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SendError {
    #[error("dispatch queue closed")]
    Disconnected,
}

/// Producer handle. Sending waits while the queue is full.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<Event>,
}

impl EventSender {
    pub async fn send(&self, event: Event) -> Result<(), SendError> {
        self.tx
            .send_async(event)
            .await
            .map_err(|_| SendError::Disconnected)
    }
}

pub struct DispatchPool {
    tx: Sender<Event>,
    workers: Vec<JoinHandle<()>>,
}

impl DispatchPool {
    /// Spawn `size` workers reading from a queue holding at most `capacity`
    /// events.
    pub fn start(
        size: usize,
        capacity: usize,
        sink: Arc<dyn EventSink>,
        stats: Arc<Stats>,
    ) -> Self {
        let (tx, rx) = flume::bounded(capacity.max(1));
        let workers = (0..size.max(1))
            .map(|id| tokio::spawn(worker(id, rx.clone(), sink.clone(), stats.clone())))
            .collect();
        Self { tx, workers }
    }

    pub fn sender(&self) -> EventSender {
        EventSender {
            tx: self.tx.clone(),
        }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and wait for the workers to drain it. Senders handed
    /// out by [`DispatchPool::sender`] must be dropped first or this waits for
    /// them.
    pub async fn shutdown(self) {
        drop(self.tx);
        for handle in self.workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatch worker panicked");
            }
        }
    }
}

async fn worker(id: usize, rx: Receiver<Event>, sink: Arc<dyn EventSink>, stats: Arc<Stats>) {
    while let Ok(event) = rx.recv_async().await {
        match sink.send(&event).await {
            Ok(()) => stats.sent(),
            Err(e) => {
                stats.send_error();
                warn!(worker = id, error = %e, "failed to send event");
            }
        }
    }
    debug!(worker = id, "dispatch worker exiting");
}
