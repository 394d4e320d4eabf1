//! Remote system of record.

mod client;
mod types;

pub use client::{CallOptions, RemoteClient, API_KEY_HEADER, CONFLICT_OVERRIDE_HEADER};
pub use types::{Endpoint, RemoteReply, SyncAck};
