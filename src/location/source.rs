use futures::{stream::BoxStream, StreamExt};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Mutex,
};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

use crate::location::{Position, PositionError, WatchOptions};

/// Everything a watch reports, in order.
pub type PositionStream = BoxStream<'static, Result<Position, PositionError>>;

/// The device's geolocation capability.
///
/// Each call to [`watch`](PositionSource::watch) starts an independent watch
/// that lasts until the returned stream is dropped.
pub trait PositionSource: Send + Sync {
    fn watch(&self, options: &WatchOptions) -> PositionStream;
}

/// A position source fed by hand, for embedding applications that receive
/// fixes from elsewhere (and for tests).
///
/// Reports are delivered to every watch open at the time of the
/// [`feed`](ChannelPositionSource::feed) call.
#[derive(Debug)]
pub struct ChannelPositionSource {
    sender: broadcast::Sender<Result<Position, PositionError>>,
    watches: AtomicUsize,
    last_options: Mutex<Option<WatchOptions>>,
}

impl Default for ChannelPositionSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelPositionSource {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self {
            sender,
            watches: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        }
    }

    /// Delivers a report. Returns how many open watches received it.
    pub fn feed(&self, report: Result<Position, PositionError>) -> usize {
        self.sender.send(report).unwrap_or(0)
    }

    /// How many watches have been started so far.
    pub fn watch_count(&self) -> usize {
        self.watches.load(Ordering::SeqCst)
    }

    /// How many watches are currently open.
    pub fn open_watches(&self) -> usize {
        self.sender.receiver_count()
    }

    /// The options the latest watch was started with.
    pub fn last_options(&self) -> Option<WatchOptions> {
        self.last_options.lock().ok().and_then(|options| *options)
    }
}

impl PositionSource for ChannelPositionSource {
    fn watch(&self, options: &WatchOptions) -> PositionStream {
        self.watches.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_options.lock() {
            *last = Some(*options);
        }

        BroadcastStream::new(self.sender.subscribe())
            .filter_map(|report| async move {
                match report {
                    Ok(report) => Some(report),
                    Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "position watch fell behind");
                        None
                    }
                }
            })
            .boxed()
    }
}
