//! The local participant's identity and where it is kept.
mod model;
mod store;

pub use model::User;
pub use store::{FileIdentityStore, IdentityStore, MemoryIdentityStore, USER_KEY};
