//! Read, write and subscribe to presence records.
//!
//! Every participant owns exactly one record at `users/<identifier>`. The
//! [`Client`] talks to the realtime database; [`MemoryPresenceStore`] keeps the
//! collection in process. Both implement [`PresenceStore`], which is what the
//! map session depends on.
//!
//! # Examples
//! ```no_run
//! use vendor_presence::{presence::{Location, PresenceUpdate}, Client, Error};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new()?;
//!
//!     client
//!         .presence()
//!         .update("-NvX1", &PresenceUpdate::located(Location::new(-6.2, 106.8)))
//!         .await?;
//!
//!     let snapshot = client.presence().list().await?;
//!     for (id, record) in &snapshot {
//!         println!("{id}: {} ({})", record.name, record.status);
//!     }
//!
//!     Ok(())
//! }
//! ```
mod client;
mod model;
pub(crate) mod relay;
mod store;
pub(crate) mod stream;

pub use client::Client;
pub use model::*;
pub use store::{MemoryPresenceStore, PresenceStore, SnapshotStream};
