//! Background tasks that keep a map session in sync with the presence store
//! without holding up its event loop.
use backoff::{backoff::Backoff, ExponentialBackoff, ExponentialBackoffBuilder};
use futures::StreamExt;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};

use crate::{
    error::Error,
    presence::{Location, PresenceSnapshot, PresenceStore, PresenceUpdate},
};

const SNAPSHOT_BUFFER: usize = 16;
const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(30);

fn build_resubscribe_backoff() -> ExponentialBackoff {
    ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(500))
        .with_multiplier(2.0)
        .with_max_interval(MAX_RESUBSCRIBE_DELAY)
        .with_max_elapsed_time(None) // keep trying until cancelled
        .build()
}

/// Whether the store refused the subscription for good.
fn is_final(error: &Error) -> bool {
    match error {
        Error::SubscriptionCancelled(_) => true,
        Error::Database(e) => e.status == 401 || e.status == 403,
        _ => false,
    }
}

/// A subscription to the presence collection that reopens itself whenever
/// the underlying stream ends or fails. It only gives up when the store
/// cancels it or refuses access.
///
/// The task is aborted when the subscription is dropped.
#[derive(Debug)]
pub(crate) struct Subscription {
    snapshots: mpsc::Receiver<PresenceSnapshot>,
    task: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn spawn(store: Arc<dyn PresenceStore>) -> Self {
        let (tx, snapshots) = mpsc::channel(SNAPSHOT_BUFFER);
        let task = tokio::spawn(forward_snapshots(store, tx));
        Self { snapshots, task }
    }

    /// The next snapshot, or `None` once the subscription was cancelled.
    pub(crate) async fn next(&mut self) -> Option<PresenceSnapshot> {
        self.snapshots.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn forward_snapshots(store: Arc<dyn PresenceStore>, tx: mpsc::Sender<PresenceSnapshot>) {
    let mut backoff = build_resubscribe_backoff();

    loop {
        match store.subscribe().await {
            Ok(mut snapshots) => {
                while let Some(item) = snapshots.next().await {
                    match item {
                        Ok(snapshot) => {
                            backoff.reset();
                            if tx.send(snapshot).await.is_err() {
                                return;
                            }
                        }
                        Err(e) if is_final(&e) => {
                            tracing::error!(error = %e, "presence subscription cancelled");
                            return;
                        }
                        Err(e) => tracing::warn!(error = %e, "presence subscription error"),
                    }
                }
                tracing::warn!("presence subscription ended");
            }
            Err(e) if is_final(&e) => {
                tracing::error!(error = %e, "presence subscription refused");
                return;
            }
            Err(e) => tracing::warn!(error = %e, "failed to subscribe to presence"),
        }

        if tx.is_closed() {
            return;
        }
        let delay = backoff.next_backoff().unwrap_or(MAX_RESUBSCRIBE_DELAY);
        tracing::debug!(?delay, "resubscribing to presence");
        tokio::time::sleep(delay).await;
    }
}

/// Writes the local position to the participant's record from its own task.
/// Only the latest position is kept; a position that arrives while a write
/// is in flight replaces any earlier one still waiting.
///
/// The task is aborted when the writer is dropped.
#[derive(Debug)]
pub(crate) struct LocationWriter {
    latest: watch::Sender<Option<Location>>,
    task: JoinHandle<()>,
}

impl LocationWriter {
    pub(crate) fn spawn(store: Arc<dyn PresenceStore>, identifier: String) -> Self {
        let (latest, rx) = watch::channel(None);
        let task = tokio::spawn(write_locations(store, identifier, rx));
        Self { latest, task }
    }

    pub(crate) fn push(&self, location: Location) {
        self.latest.send_replace(Some(location));
    }
}

impl Drop for LocationWriter {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn write_locations(
    store: Arc<dyn PresenceStore>,
    identifier: String,
    mut rx: watch::Receiver<Option<Location>>,
) {
    while rx.changed().await.is_ok() {
        let latest = *rx.borrow_and_update();
        let Some(location) = latest else {
            continue;
        };
        if let Err(e) = store
            .update(&identifier, &PresenceUpdate::located(location))
            .await
        {
            tracing::warn!(error = %e, "failed to write location");
        }
    }
}
