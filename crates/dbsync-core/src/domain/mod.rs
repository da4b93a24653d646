//! Domain types
//!
//! - Remote path normalization
//! - Remote listing entries
//! - Upload modes and session descriptors
//! - Direction-of-truth for the bootstrap pass

pub mod entry;
pub mod errors;
pub mod path;

pub use entry::{CommitInfo, Direction, RemoteEntry, RemoteFile, RemoteFolder, SessionCursor, WriteMode};
pub use errors::DomainError;
pub use path::RemotePath;
