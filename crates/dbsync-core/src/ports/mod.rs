//! Port definitions
//!
//! - [`IRemoteStore`] - operations against the remote file store

pub mod remote_store;

pub use remote_store::{IRemoteStore, RemoteError, RemoteResult};
