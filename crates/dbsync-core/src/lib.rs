//! dbsync Core - domain types and port definitions
//!
//! This crate holds the pieces of the sync engine that do not talk to the
//! network or watch the filesystem:
//! - **Domain types** - `RemotePath`, `RemoteEntry`, `Direction`, `WriteMode`
//! - **Port definitions** - the `IRemoteStore` trait implemented by the
//!   Dropbox adapter (and by in-memory stores in tests)
//! - **Configuration** - the YAML-backed `Config` with defaults and validation
//!
//! # Architecture
//!
//! Ports and adapters: the sync crate only depends on the traits defined
//! here, the adapter crates provide the implementations.

pub mod config;
pub mod domain;
pub mod ports;
