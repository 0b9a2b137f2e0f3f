//! Uploaded file persistence: identity scheme and the on-disk store.

pub mod identity;
pub mod store;

pub use identity::StoredIdentity;
pub use store::FileStore;
