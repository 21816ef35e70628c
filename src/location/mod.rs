//! Device location: position sources, error classification and the retrying
//! watcher.
//!
//! # Examples
//! ```
//! use std::sync::Arc;
//! use vendor_presence::location::{
//!     ChannelPositionSource, LocationEvent, LocationWatcher, Position, RetryPolicy,
//!     WatchOptions,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let source = Arc::new(ChannelPositionSource::new());
//! let mut watcher =
//!     LocationWatcher::new(source.clone(), WatchOptions::default(), RetryPolicy::default());
//! watcher.start();
//!
//! source.feed(Ok(Position::new(-6.2, 106.8)));
//! assert_eq!(
//!     watcher.next().await,
//!     Some(LocationEvent::Fix(Position::new(-6.2, 106.8)))
//! );
//! # }
//! ```
mod model;
mod retry;
mod source;
mod watcher;

pub use model::{Position, PositionError, WatchOptions};
pub use retry::{Reaction, RetryPolicy};
pub use source::{ChannelPositionSource, PositionSource, PositionStream};
pub use watcher::{LocationEvent, LocationWatcher};
