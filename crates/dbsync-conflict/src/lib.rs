//! dbsync Conflict - conflict detection and resolution
//!
//! Provides:
//! - Conflict copy naming with a fixed marker token ([`namer`])
//! - The per-file decision taken when a remote file is pulled over an
//!   existing local one ([`policy`])
//!
//! A conflict copy is terminal: any path carrying [`CONFLICT_MARKER`] is
//! excluded from reconciliation and from event propagation.

pub mod namer;
pub mod policy;

pub use namer::{is_conflict_copy, ConflictNamer, CONFLICT_MARKER};
pub use policy::{ConflictPolicy, FileStat, PullDecision, PullMode};
