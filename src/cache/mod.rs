//! Local document cache synchronized through named channels.
//!
//! This module provides:
//! - A SQLite store for facility rows and channel documents
//! - Channel creation (full fetch) and incremental sync (`since` a sequence position)
//! - Digest-based change detection so unchanged documents are not rewritten
//! - Facility rows maintained from the documents of a facilities channel
//! - Degraded reads: a failed sync keeps serving whatever is already persisted

mod manager;
mod storage;
mod traits;

pub use manager::SyncManager;
pub use storage::SqliteStorage;
pub use traits::{
  Ancestors, ChangeBatch, ChangedDocument, ChannelSource, ChannelState, Document, DocumentLookup,
  FacilityIndex, FacilityLookup, FacilityRecord,
};
