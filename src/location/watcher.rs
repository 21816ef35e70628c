use futures::{future, StreamExt};
use std::{pin::Pin, sync::Arc};
use tokio::time::{self, Sleep};

use crate::location::{
    retry::RetryTracker, Position, PositionError, PositionSource, PositionStream, Reaction,
    RetryPolicy, WatchOptions,
};

/// What the watcher reports to its owner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationEvent {
    /// A new fix. Any pending retry has been cancelled.
    Fix(Position),
    /// The source reported an error, and this is how it was handled.
    Failed {
        error: PositionError,
        reaction: Reaction,
    },
}

enum Wake {
    Report(Option<Result<Position, PositionError>>),
    RetryDue,
}

/// Keeps one watch on a [`PositionSource`] and retries it when the position
/// is unavailable.
///
/// Permission errors and exhausted retries end the watch until
/// [`start`](LocationWatcher::start) is called again. Timeouts are logged and
/// the watch keeps running.
pub struct LocationWatcher {
    source: Arc<dyn PositionSource>,
    options: WatchOptions,
    retries: RetryTracker,
    stream: Option<PositionStream>,
    retry: Option<Pin<Box<Sleep>>>,
}

impl std::fmt::Debug for LocationWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationWatcher")
            .field("options", &self.options)
            .field("retries", &self.retries)
            .field("watching", &self.is_watching())
            .field("retry_pending", &self.retry_pending())
            .finish()
    }
}

impl LocationWatcher {
    pub fn new(source: Arc<dyn PositionSource>, options: WatchOptions, policy: RetryPolicy) -> Self {
        Self {
            source,
            options,
            retries: RetryTracker::new(policy),
            stream: None,
            retry: None,
        }
    }

    /// Starts a fresh watch, replacing the current one. Clears the retry
    /// count and any pending retry.
    pub fn start(&mut self) {
        self.retries.reset();
        self.retry = None;
        self.watch();
    }

    /// Ends the watch and cancels any pending retry.
    pub fn stop(&mut self) {
        self.stream = None;
        self.retry = None;
    }

    pub fn is_watching(&self) -> bool {
        self.stream.is_some()
    }

    pub fn retry_pending(&self) -> bool {
        self.retry.is_some()
    }

    fn watch(&mut self) {
        tracing::debug!(options = ?self.options, "starting position watch");
        self.stream = Some(self.source.watch(&self.options));
    }

    /// Waits for the next report worth telling the owner about.
    ///
    /// Returns `None` when there is nothing left to wait for: no watch is
    /// open and no retry is pending.
    pub async fn next(&mut self) -> Option<LocationEvent> {
        loop {
            if self.stream.is_none() && self.retry.is_none() {
                return None;
            }

            let wake = {
                let stream = &mut self.stream;
                let retry = &mut self.retry;
                tokio::select! {
                    report = next_report(stream) => Wake::Report(report),
                    () = retry_due(retry) => Wake::RetryDue,
                }
            };

            match wake {
                Wake::RetryDue => {
                    self.retry = None;
                    tracing::debug!(attempt = self.retries.attempts(), "retrying position watch");
                    self.watch();
                }
                Wake::Report(None) => {
                    tracing::debug!("position watch ended");
                    self.stream = None;
                }
                Wake::Report(Some(Ok(position))) => {
                    self.retries.reset();
                    self.retry = None;
                    return Some(LocationEvent::Fix(position));
                }
                Wake::Report(Some(Err(PositionError::PositionUnavailable)))
                    if self.retry.is_some() =>
                {
                    tracing::debug!("position still unavailable, retry already pending");
                }
                Wake::Report(Some(Err(error))) => {
                    let reaction = self.retries.classify(error);
                    match reaction {
                        Reaction::OpenPermissionDrawer | Reaction::GiveUp => {
                            tracing::warn!(%error, ?reaction, "position watch stopped");
                            self.stop();
                        }
                        Reaction::ScheduleRetry { attempt, delay } => {
                            tracing::warn!(%error, attempt, ?delay, "scheduling position retry");
                            self.retry = Some(Box::pin(time::sleep(delay)));
                        }
                        Reaction::Ignore => {
                            tracing::warn!(%error, "ignoring position error");
                        }
                    }
                    return Some(LocationEvent::Failed { error, reaction });
                }
            }
        }
    }
}

async fn next_report(stream: &mut Option<PositionStream>) -> Option<Result<Position, PositionError>> {
    match stream {
        Some(stream) => stream.next().await,
        None => future::pending().await,
    }
}

async fn retry_due(retry: &mut Option<Pin<Box<Sleep>>>) {
    match retry {
        Some(sleep) => sleep.as_mut().await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::ChannelPositionSource;
    use std::time::Duration;
    use tokio::time::{timeout, Instant};

    fn watcher() -> (Arc<ChannelPositionSource>, LocationWatcher) {
        let source = Arc::new(ChannelPositionSource::new());
        let watcher = LocationWatcher::new(
            source.clone(),
            WatchOptions::default(),
            RetryPolicy::default(),
        );
        (source, watcher)
    }

    #[tokio::test(start_paused = true)]
    async fn test_fix() {
        let (source, mut watcher) = watcher();
        watcher.start();
        assert_eq!(source.last_options(), Some(WatchOptions::default()));

        source.feed(Ok(Position::new(-6.2, 106.8)));
        assert_eq!(
            watcher.next().await,
            Some(LocationEvent::Fix(Position::new(-6.2, 106.8)))
        );
        assert!(watcher.is_watching());
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_stops_without_retry() {
        let (source, mut watcher) = watcher();
        watcher.start();

        source.feed(Err(PositionError::PermissionDenied));
        assert_eq!(
            watcher.next().await,
            Some(LocationEvent::Failed {
                error: PositionError::PermissionDenied,
                reaction: Reaction::OpenPermissionDrawer,
            })
        );
        assert!(!watcher.is_watching());
        assert!(!watcher.retry_pending());
        assert_eq!(watcher.next().await, None);
        assert_eq!(source.open_watches(), 0);
        assert_eq!(source.watch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unavailable_rewatches_after_delay() {
        let (source, mut watcher) = watcher();
        watcher.start();

        source.feed(Err(PositionError::PositionUnavailable));
        assert!(matches!(
            watcher.next().await,
            Some(LocationEvent::Failed {
                reaction: Reaction::ScheduleRetry { attempt: 1, .. },
                ..
            })
        ));
        assert!(watcher.retry_pending());

        let started = Instant::now();
        assert!(timeout(Duration::from_secs(6), watcher.next()).await.is_err());
        assert_eq!(source.watch_count(), 2);
        assert_eq!(source.open_watches(), 1);
        assert!(!watcher.retry_pending());
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fix_cancels_pending_retry() {
        let (source, mut watcher) = watcher();
        watcher.start();

        source.feed(Err(PositionError::PositionUnavailable));
        watcher.next().await;
        assert!(watcher.retry_pending());

        source.feed(Ok(Position::new(1.0, 2.0)));
        assert_eq!(
            watcher.next().await,
            Some(LocationEvent::Fix(Position::new(1.0, 2.0)))
        );
        assert!(!watcher.retry_pending());

        assert!(timeout(Duration::from_secs(30), watcher.next()).await.is_err());
        assert_eq!(source.watch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_keeps_watching() {
        let (source, mut watcher) = watcher();
        watcher.start();

        source.feed(Err(PositionError::Timeout));
        assert_eq!(
            watcher.next().await,
            Some(LocationEvent::Failed {
                error: PositionError::Timeout,
                reaction: Reaction::Ignore,
            })
        );
        assert!(watcher.is_watching());
        assert!(!watcher.retry_pending());
    }
}
