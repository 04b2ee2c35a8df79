//! Core traits and types for the channel cache.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::Result;

/// A document as persisted in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
  pub id: String,
  /// Serialized JSON payload, opaque to the cache
  pub body: String,
}

/// One entry of a channel changes feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedDocument {
  pub id: String,
  /// The document was deleted upstream or left the channel
  pub deleted: bool,
  /// Serialized payload; `None` for deletions and for feeds without bodies
  pub body: Option<String>,
}

/// A batch of changes pulled from a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatch {
  pub documents: Vec<ChangedDocument>,
  /// Sequence position to resume from on the next incremental fetch
  pub last_seq: Option<String>,
}

/// Remote source of channel documents.
pub trait ChannelSource: Send + Sync {
  /// Fetch the changes on `channel`.
  ///
  /// `since = None` requests the full current document set; otherwise only
  /// documents changed after that sequence position are returned.
  fn fetch_changes(
    &self,
    channel: &str,
    since: Option<&str>,
  ) -> impl Future<Output = Result<ChangeBatch>> + Send;
}

/// Builds the facility row described by a document of a facilities channel,
/// from `(channel, doc_id, body)`. `None` for documents that are not facilities.
pub type FacilityIndex = fn(&str, &str, &str) -> Option<FacilityRecord>;

/// Local sync state of a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelState {
  pub last_seq: Option<String>,
  pub synced_at: DateTime<Utc>,
}

/// Ancestor entities of a facility. `None` means "not applicable".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ancestors {
  pub park: Option<String>,
  pub resort: Option<String>,
  pub land: Option<String>,
  pub resort_area: Option<String>,
  pub entertainment_venue: Option<String>,
}

/// A row of the `facilities` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacilityRecord {
  pub id: String,
  pub name: String,
  pub entity_type: String,
  pub sub_type: Option<String>,
  pub doc_id: String,
  pub destination_code: String,
  pub ancestors: Ancestors,
}

/// Outcome of a facility lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FacilityLookup {
  Found(FacilityRecord),
  NotFound,
}

/// Outcome of a document lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentLookup {
  Present(Document),
  Absent,
}

impl DocumentLookup {
  pub fn into_option(self) -> Option<Document> {
    match self {
      DocumentLookup::Present(doc) => Some(doc),
      DocumentLookup::Absent => None,
    }
  }
}
