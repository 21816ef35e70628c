use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Mutex,
};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::{
    error::Result,
    presence::{Client, NewPresence, PresenceSnapshot, PresenceUpdate},
};

/// A stream of full collection snapshots, one per remote change.
pub type SnapshotStream = BoxStream<'static, Result<PresenceSnapshot>>;

/// The remote realtime store as seen by the map session and the
/// verification flow.
///
/// A client only ever writes its own record; it reads the whole collection
/// through [`PresenceStore::subscribe`].
#[async_trait]
pub trait PresenceStore: Send + Sync {
    /// Creates a record and returns its generated identifier.
    async fn create(&self, record: &NewPresence) -> Result<String>;

    /// Updates the given fields of the record identified by `id`.
    async fn update(&self, id: &str, update: &PresenceUpdate) -> Result<()>;

    /// Subscribes to the whole collection. Dropping the stream unsubscribes.
    async fn subscribe(&self) -> Result<SnapshotStream>;
}

#[async_trait]
impl PresenceStore for Client {
    async fn create(&self, record: &NewPresence) -> Result<String> {
        Client::create(self, record).await
    }

    async fn update(&self, id: &str, update: &PresenceUpdate) -> Result<()> {
        Client::update(self, id, update).await
    }

    async fn subscribe(&self) -> Result<SnapshotStream> {
        Client::subscribe(self).await
    }
}

/// An in-process presence store. Every subscriber sees the latest snapshot
/// first and then every change, like the realtime database does.
#[derive(Debug)]
pub struct MemoryPresenceStore {
    snapshot: watch::Sender<PresenceSnapshot>,
    next_key: AtomicU64,
    writes: Mutex<Vec<(String, PresenceUpdate)>>,
}

impl Default for MemoryPresenceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPresenceStore {
    pub fn new() -> Self {
        Self::with_snapshot(PresenceSnapshot::new())
    }

    /// Starts from an existing collection.
    pub fn with_snapshot(snapshot: PresenceSnapshot) -> Self {
        let (snapshot, _) = watch::channel(snapshot);
        Self {
            snapshot,
            next_key: AtomicU64::new(1),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// The current state of the collection.
    pub fn snapshot(&self) -> PresenceSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Every update applied so far, oldest first.
    pub fn updates(&self) -> Vec<(String, PresenceUpdate)> {
        self.writes
            .lock()
            .map(|writes| writes.clone())
            .unwrap_or_default()
    }

    /// Replaces the whole collection, as if another client wrote to it.
    pub fn replace(&self, snapshot: PresenceSnapshot) {
        self.snapshot.send_replace(snapshot);
    }
}

#[async_trait]
impl PresenceStore for MemoryPresenceStore {
    async fn create(&self, record: &NewPresence) -> Result<String> {
        let key = format!("-M{:06}", self.next_key.fetch_add(1, Ordering::Relaxed));
        let record = record.clone().into();
        self.snapshot.send_modify(|snapshot| {
            snapshot.insert(key.clone(), record);
        });
        Ok(key)
    }

    async fn update(&self, id: &str, update: &PresenceUpdate) -> Result<()> {
        if let Ok(mut writes) = self.writes.lock() {
            writes.push((id.to_string(), update.clone()));
        }
        // The database would create a partial node here. A record needs a
        // name and a role, so updates of unknown records are recorded but
        // not applied.
        self.snapshot.send_if_modified(|snapshot| match snapshot.get_mut(id) {
            Some(record) => {
                update.apply_to(record);
                true
            }
            None => false,
        });
        Ok(())
    }

    async fn subscribe(&self) -> Result<SnapshotStream> {
        Ok(WatchStream::new(self.snapshot.subscribe())
            .map(Ok)
            .boxed())
    }
}
