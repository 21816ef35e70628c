//! Live location sharing between customers and roaming vendors.
//!
//! Participants verify themselves once with a
//! [`VerificationForm`](verification::VerificationForm), which creates their
//! presence record in a realtime database. A [`MapSession`](session::MapSession)
//! then keeps that record up to date with the device's position and projects
//! everyone else's records into map markers: customers see vendors and
//! vendors see customers.
//!
//! If you're just getting started, take a look at the [`Client`] for the
//! database and at [`session`] for the map.
//!
//! # Examples
//! ```no_run
//! use std::sync::Arc;
//! use vendor_presence::{
//!     identity::FileIdentityStore,
//!     location::ChannelPositionSource,
//!     presence::Role,
//!     session::{MapSession, Mount},
//!     verification::VerificationForm,
//!     Client, Error,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let client = Client::new()?;
//!     let identity = Arc::new(FileIdentityStore::new("storage.json"));
//!
//!     // Join as a vendor
//!     VerificationForm::new("Pak Joko", Some(Role::Vendor), true)
//!         .submit(client.presence(), identity.as_ref())
//!         .await?;
//!
//!     // Open the map and share the position fed into `source`
//!     let source = Arc::new(ChannelPositionSource::new());
//!     let store = Arc::new(client.into_presence());
//!     if let Mount::Ready(session) = MapSession::mount(store, identity, source)? {
//!         let mut handle = session.spawn();
//!         let view = handle.changed().await?;
//!         dbg!(view.markers.customers);
//!     }
//!
//!     Ok(())
//! }
//! ```
pub mod client;
pub mod error;
mod http;

pub mod drawer;
pub mod effects;
pub mod identity;
pub mod location;
pub mod markers;
pub mod presence;
pub mod session;
pub mod travel;
pub mod verification;

pub use client::Client;
pub use error::Error;

#[cfg(all(feature = "default-tls", feature = "native-tls"))]
compile_error!("Feature \"default-tls\" and \"native-tls\" cannot be enabled at the same time");

#[cfg(all(feature = "native-tls", feature = "rustls-tls"))]
compile_error!("Feature \"native-tls\" and \"rustls-tls\" cannot be enabled at the same time");

#[cfg(all(feature = "rustls-tls", feature = "default-tls"))]
compile_error!("Feature \"rustls-tls\" and \"default-tls\" cannot be enabled at the same time");
