use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::relay::{RelayError, RelayTask};

/// A platform's message-posting endpoint
#[async_trait]
pub trait Outbound: Send + Sync {
    /// Short platform name used in log lines
    fn platform(&self) -> &'static str;

    async fn deliver(&self, task: &RelayTask) -> Result<()>;
}

/// Serialized outbound dispatch for one destination platform.
///
/// Enqueueing never waits. A single worker task drains the queue in FIFO
/// order and never starts a delivery before the previous one has finished,
/// so the destination sees posts in arrival order and never overlapping.
/// Failed deliveries are logged and dropped.
#[derive(Clone)]
pub struct DeliveryQueue {
    platform: &'static str,
    tx: mpsc::UnboundedSender<RelayTask>,
}

impl DeliveryQueue {
    /// Start the worker. It exits once every clone of the returned queue is
    /// dropped and the remaining tasks have been attempted.
    pub fn spawn(outbound: Arc<dyn Outbound>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let platform = outbound.platform();
        let handle = tokio::spawn(run_worker(outbound, rx));
        (Self { platform, tx }, handle)
    }

    /// A queue with no worker, for inspecting what gets enqueued
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<RelayTask>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                platform: "detached",
                tx,
            },
            rx,
        )
    }

    pub fn enqueue(&self, task: RelayTask) -> Result<(), RelayError> {
        let id = task.id;
        self.tx.send(task).map_err(|_| {
            error!("{} queue is closed, dropping task {}", self.platform, id);
            RelayError::QueueClosed
        })
    }
}

async fn run_worker(outbound: Arc<dyn Outbound>, mut rx: mpsc::UnboundedReceiver<RelayTask>) {
    let platform = outbound.platform();
    info!("{} delivery queue started", platform);

    while let Some(task) = rx.recv().await {
        match outbound.deliver(&task).await {
            Ok(()) => debug!("Delivered task {} to {}", task.id, platform),
            Err(e) => error!("{} delivery failed for task {}: {:#}", platform, task.id, e),
        }
    }

    info!("{} delivery queue stopped", platform);
}

/// Wait for delivery workers to finish. Returns how many ended abnormally.
pub async fn join_workers(workers: Vec<(&'static str, JoinHandle<()>)>) -> usize {
    let mut failed = 0;
    for (platform, handle) in workers {
        if let Err(e) = handle.await {
            error!("{} delivery worker ended abnormally: {}", platform, e);
            failed += 1;
        }
    }
    failed
}
