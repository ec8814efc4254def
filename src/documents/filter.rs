//! Concurrent access filtering for list results.
//!
//! Candidates are split round-robin across a fixed pool of workers. Each
//! worker applies [`check_access`] and forwards accepted documents over a
//! bounded channel. Cancelling the token stops the workers and yields no
//! result at all. The accepted set does not depend on the pool size; the
//! returned order is always [`Document::listing_order`].

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::access::check_access;
use crate::models::{Document, Identity};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterError {
    #[error("access filtering was cancelled")]
    Cancelled,
    #[error("access filter worker failed: {0}")]
    WorkerFailed(String),
}

/// Default pool size: half the available parallelism, at least one.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

/// Keeps the documents `viewer` may read, in listing order.
pub async fn filter_accessible(
    docs: Vec<Document>,
    viewer: &Identity,
    workers: usize,
    cancel: &CancellationToken,
) -> Result<Vec<Document>, FilterError> {
    if cancel.is_cancelled() {
        return Err(FilterError::Cancelled);
    }
    if docs.is_empty() {
        return Ok(docs);
    }

    let total = docs.len();
    let workers = workers.clamp(1, total);
    let viewer = Arc::new(viewer.clone());
    let (tx, mut rx) = mpsc::channel::<Document>(total);

    let mut partitions: Vec<Vec<Document>> = (0..workers).map(|_| Vec::new()).collect();
    for (i, doc) in docs.into_iter().enumerate() {
        partitions[i % workers].push(doc);
    }

    let mut pool = JoinSet::new();
    for (worker_id, partition) in partitions.into_iter().enumerate() {
        let tx = tx.clone();
        let viewer = Arc::clone(&viewer);
        let cancel = cancel.clone();
        pool.spawn(async move {
            for doc in partition {
                if cancel.is_cancelled() {
                    return;
                }
                if !check_access(&doc, &viewer) {
                    continue;
                }
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    sent = tx.send(doc) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
            tracing::trace!(worker_id, "Access filter worker finished");
        });
    }
    drop(tx);

    let mut accepted = Vec::new();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                pool.abort_all();
                return Err(FilterError::Cancelled);
            }
            next = rx.recv() => match next {
                Some(doc) => accepted.push(doc),
                None => break,
            }
        }
    }

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                return Err(FilterError::WorkerFailed(e.to_string()));
            }
        }
    }
    if cancel.is_cancelled() {
        return Err(FilterError::Cancelled);
    }

    tracing::debug!(
        viewer = %viewer.login,
        total,
        accepted = accepted.len(),
        workers,
        "Access filtering completed"
    );

    accepted.sort_by(Document::listing_order);
    Ok(accepted)
}
