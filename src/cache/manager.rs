//! Channel sync manager: decides when to pull from the remote and merges
//! the result into the store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Duration, Utc};
use tracing::{debug, info, warn};

use super::storage::SqliteStorage;
use super::traits::{ChannelSource, ChannelState, DocumentLookup, FacilityIndex, FacilityLookup};
use crate::Result;

/// Owns the store and keeps its channels in step with the remote source.
///
/// Reads go straight to the store. Before a dynamic read the caller runs
/// [`SyncManager::refresh`], which creates the channel on first use and
/// syncs it incrementally afterwards. Sync failures never reach the
/// caller; the last persisted documents keep being served.
///
/// Facilities channels go through [`SyncManager::refresh_facilities`]
/// instead, which also keeps the `facilities` rows in step.
pub struct SyncManager<S> {
  storage: SqliteStorage,
  source: S,
  /// Skip syncing a channel synced more recently than this. `None` syncs before every read.
  status_ttl: Option<Duration>,
  /// Same as `status_ttl`, for facilities channels
  facility_ttl: Option<Duration>,
  channel_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<S: ChannelSource> SyncManager<S> {
  pub fn new(storage: SqliteStorage, source: S) -> Self {
    Self {
      storage,
      source,
      status_ttl: None,
      facility_ttl: None,
      channel_locks: Mutex::new(HashMap::new()),
    }
  }

  /// Set how long a synced channel counts as fresh.
  pub fn with_status_ttl(mut self, ttl: Duration) -> Self {
    self.status_ttl = Some(ttl);
    self
  }

  /// Set how long a synced facilities channel counts as fresh.
  pub fn with_facility_ttl(mut self, ttl: Duration) -> Self {
    self.facility_ttl = Some(ttl);
    self
  }

  /// The remote source, for requests that bypass the cache.
  pub fn source(&self) -> &S {
    &self.source
  }

  /// Whether `channel` has ever been materialized locally.
  pub fn channel_exists(&self, channel: &str) -> Result<bool> {
    Ok(self.storage.channel_state(channel)?.is_some())
  }

  /// Full fetch of `channel`, persisted as its initial document set.
  ///
  /// Returns the number of documents written.
  pub async fn create_channel(&self, channel: &str) -> Result<usize> {
    let lock = self.channel_lock(channel);
    let _guard = lock.lock().await;
    self.pull(channel, None, None).await
  }

  /// Incremental fetch of `channel` since its last sequence position.
  ///
  /// On failure the persisted documents are left as they were. Returns the
  /// number of documents that changed.
  pub async fn sync_channel(&self, channel: &str) -> Result<usize> {
    let lock = self.channel_lock(channel);
    let _guard = lock.lock().await;

    let since = self
      .storage
      .channel_state(channel)?
      .and_then(|state| state.last_seq);
    if since.is_none() {
      debug!(channel, "no sequence position recorded, doing a full fetch");
    }
    self.pull(channel, since, None).await
  }

  /// Make a best-effort attempt to bring `channel` up to date.
  ///
  /// Creates the channel if it does not exist yet, syncs it otherwise.
  /// Errors are logged and swallowed.
  pub async fn refresh(&self, channel: &str) {
    if let Err(e) = self.refresh_with(channel, self.status_ttl, None).await {
      warn!(channel, error = %e, "channel refresh failed, serving cached data");
    }
  }

  /// Bring a facilities channel up to date and rebuild the facility rows
  /// of the documents it changed, using `index` to read them.
  ///
  /// Creates the channel on first use. Returns the number of changed
  /// documents, `0` when the channel was synced within the facility ttl.
  pub async fn refresh_facilities(&self, channel: &str, index: FacilityIndex) -> Result<usize> {
    self
      .refresh_with(channel, self.facility_ttl, Some(index))
      .await
  }

  async fn refresh_with(
    &self,
    channel: &str,
    ttl: Option<Duration>,
    index: Option<FacilityIndex>,
  ) -> Result<usize> {
    let lock = self.channel_lock(channel);
    let _guard = lock.lock().await;

    match self.storage.channel_state(channel)? {
      None => self.pull(channel, None, index).await,
      Some(state) if is_fresh(&state, ttl) => {
        debug!(channel, "channel synced within ttl, skipping");
        Ok(0)
      }
      Some(state) => self.pull(channel, state.last_seq, index).await,
    }
  }

  /// Look up the static record of a facility.
  pub fn facility(&self, id: &str) -> Result<FacilityLookup> {
    self.storage.facility(id)
  }

  /// Ids of all facilities of one entity type.
  pub fn facility_ids(&self, entity_type: &str) -> Result<Vec<String>> {
    self.storage.facility_ids(entity_type)
  }

  /// Read the persisted document `id` on `channel` without syncing.
  pub fn document(&self, channel: &str, id: &str) -> Result<DocumentLookup> {
    self.storage.document(channel, id)
  }

  async fn pull(
    &self,
    channel: &str,
    since: Option<String>,
    index: Option<FacilityIndex>,
  ) -> Result<usize> {
    let batch = self.source.fetch_changes(channel, since.as_deref()).await?;
    let changed = self
      .storage
      .apply_changes_indexed(channel, &batch, index)?;
    info!(
      channel,
      received = batch.documents.len(),
      changed,
      full = since.is_none(),
      "channel synced"
    );
    Ok(changed)
  }

  fn channel_lock(&self, channel: &str) -> Arc<tokio::sync::Mutex<()>> {
    let mut locks = self
      .channel_locks
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    Arc::clone(locks.entry(channel.to_string()).or_default())
  }
}

fn is_fresh(state: &ChannelState, ttl: Option<Duration>) -> bool {
  ttl.is_some_and(|ttl| Utc::now() - state.synced_at <= ttl)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{DocumentLookup, FacilityRecord};
  use crate::testing::{batch, FakeParkApi};
  use crate::Error;

  const CHANNEL: &str = "wdw.facilitystatus.1_0";
  const FACILITIES: &str = "wdw.facilities.1_0";

  fn manager(api: FakeParkApi) -> SyncManager<FakeParkApi> {
    SyncManager::new(SqliteStorage::open_in_memory().unwrap(), api)
  }

  fn body(manager: &SyncManager<FakeParkApi>, id: &str) -> Option<String> {
    manager
      .document(CHANNEL, id)
      .unwrap()
      .into_option()
      .map(|doc| doc.body)
  }

  #[test]
  fn test_channel_exists_is_idempotent() {
    let manager = manager(FakeParkApi::new());

    assert!(!manager.channel_exists(CHANNEL).unwrap());
    assert!(!manager.channel_exists(CHANNEL).unwrap());
    assert!(manager.source().change_calls().is_empty());
  }

  #[tokio::test]
  async fn test_create_channel_does_full_fetch() {
    let api = FakeParkApi::new();
    api.push_changes(Ok(batch("10", &[("a", r#"{"waitMinutes":5}"#)])));
    let manager = manager(api);

    assert_eq!(manager.create_channel(CHANNEL).await.unwrap(), 1);
    assert!(manager.channel_exists(CHANNEL).unwrap());
    assert_eq!(body(&manager, "a").as_deref(), Some(r#"{"waitMinutes":5}"#));
    assert_eq!(
      manager.source().change_calls(),
      vec![(CHANNEL.to_string(), None)]
    );
  }

  #[tokio::test]
  async fn test_sync_channel_resumes_from_last_seq() {
    let api = FakeParkApi::new();
    api.push_changes(Ok(batch("10", &[("a", r#"{"waitMinutes":5}"#)])));
    api.push_changes(Ok(batch("11", &[("a", r#"{"waitMinutes":25}"#)])));
    let manager = manager(api);

    manager.create_channel(CHANNEL).await.unwrap();
    assert_eq!(manager.sync_channel(CHANNEL).await.unwrap(), 1);

    assert_eq!(body(&manager, "a").as_deref(), Some(r#"{"waitMinutes":25}"#));
    assert_eq!(
      manager.source().change_calls()[1],
      (CHANNEL.to_string(), Some("10".to_string()))
    );
  }

  #[tokio::test]
  async fn test_failed_sync_leaves_documents_untouched() {
    let api = FakeParkApi::new();
    api.push_changes(Ok(batch("10", &[("a", r#"{"status":"Operating"}"#)])));
    api.push_changes(Err(Error::Connectivity("unreachable".to_string())));
    let manager = manager(api);

    manager.create_channel(CHANNEL).await.unwrap();
    let before = body(&manager, "a");

    let err = manager.sync_channel(CHANNEL).await.unwrap_err();
    assert!(matches!(err, Error::Connectivity(_)));
    assert_eq!(body(&manager, "a"), before);
  }

  #[tokio::test]
  async fn test_create_channel_reports_unknown_channel() {
    let api = FakeParkApi::new();
    api.push_changes(Err(Error::NotFound("channel bogus".to_string())));
    let manager = manager(api);

    let err = manager.create_channel("bogus").await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
    assert!(!manager.channel_exists("bogus").unwrap());
  }

  #[tokio::test]
  async fn test_refresh_creates_then_syncs() {
    let api = FakeParkApi::new();
    api.push_changes(Ok(batch("1", &[("a", "{}")])));
    api.push_changes(Ok(batch("2", &[])));
    let manager = manager(api);

    manager.refresh(CHANNEL).await;
    manager.refresh(CHANNEL).await;

    assert_eq!(
      manager.source().change_calls(),
      vec![
        (CHANNEL.to_string(), None),
        (CHANNEL.to_string(), Some("1".to_string())),
      ]
    );
  }

  #[tokio::test]
  async fn test_refresh_swallows_failures() {
    // Nothing queued: every fetch fails
    let manager = manager(FakeParkApi::new());

    manager.refresh(CHANNEL).await;

    assert!(!manager.channel_exists(CHANNEL).unwrap());
    assert_eq!(
      manager.document(CHANNEL, "a").unwrap(),
      DocumentLookup::Absent
    );
  }

  #[tokio::test]
  async fn test_refresh_skips_channels_synced_within_ttl() {
    let api = FakeParkApi::new();
    api.push_changes(Ok(batch("1", &[("a", "{}")])));
    let manager = manager(api).with_status_ttl(Duration::minutes(5));

    manager.refresh(CHANNEL).await;
    manager.refresh(CHANNEL).await;

    assert_eq!(manager.source().change_calls().len(), 1);
  }

  fn index_all(channel: &str, doc_id: &str, body: &str) -> Option<FacilityRecord> {
    Some(FacilityRecord {
      id: doc_id.to_string(),
      name: body.to_string(),
      entity_type: "Attraction".to_string(),
      sub_type: None,
      doc_id: doc_id.to_string(),
      destination_code: channel.to_string(),
      ancestors: Default::default(),
    })
  }

  #[tokio::test]
  async fn test_refresh_facilities_indexes_documents() {
    let api = FakeParkApi::new();
    api.push_changes(Ok(batch("1", &[("a", "Ride A")])));
    let manager = manager(api);

    assert_eq!(
      manager
        .refresh_facilities(FACILITIES, index_all)
        .await
        .unwrap(),
      1
    );
    assert!(matches!(
      manager.facility("a").unwrap(),
      FacilityLookup::Found(record) if record.name == "Ride A"
    ));
    assert_eq!(
      manager.source().change_calls(),
      vec![(FACILITIES.to_string(), None)]
    );
  }

  #[tokio::test]
  async fn test_facility_ttl_is_separate_from_status_ttl() {
    let api = FakeParkApi::new();
    api.push_changes(Ok(batch("1", &[("a", "Ride A")])));
    api.push_changes(Ok(batch("1", &[("b", "{}")])));
    api.push_changes(Ok(batch("2", &[])));
    let manager = manager(api).with_facility_ttl(Duration::hours(24));

    manager
      .refresh_facilities(FACILITIES, index_all)
      .await
      .unwrap();
    assert_eq!(
      manager
        .refresh_facilities(FACILITIES, index_all)
        .await
        .unwrap(),
      0
    );

    // No status ttl: the status channel syncs on every read
    manager.refresh(CHANNEL).await;
    manager.refresh(CHANNEL).await;

    let channels: Vec<String> = manager
      .source()
      .change_calls()
      .into_iter()
      .map(|(channel, _)| channel)
      .collect();
    assert_eq!(channels, vec![FACILITIES, CHANNEL, CHANNEL]);
  }

  #[tokio::test]
  async fn test_refresh_facilities_reports_failures() {
    let manager = manager(FakeParkApi::new());

    let err = manager
      .refresh_facilities(FACILITIES, index_all)
      .await
      .unwrap_err();
    assert!(matches!(err, Error::Connectivity(_)));
    assert!(!manager.channel_exists(FACILITIES).unwrap());
  }
}
