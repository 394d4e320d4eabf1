//! Conflict detection and resolution.
//!
//! Features:
//! - Classifies local/remote divergence into a [`ConflictKind`]
//! - Applies a configurable [`ConflictPolicy`]
//! - Keeps a durable [`ConflictLog`] with manual resolution

mod log;
mod model;
mod resolver;

pub use log::ConflictLog;
pub use model::{
    ConflictKind, ConflictPolicy, ConflictSubject, EntityKind, EntitySnapshot, Resolution,
    SyncConflict,
};
pub use resolver::ConflictResolver;
