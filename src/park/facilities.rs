//! Facility rows derived from the documents of a facilities channel.

use tracing::{debug, info};

use super::api_types::ApiFacilityDocument;
use super::facilities_channel;
use crate::cache::{Ancestors, ChannelSource, FacilityRecord, SyncManager};
use crate::Result;

/// Sync the facilities channel of `destination_code` and refresh the
/// facility rows built from it. Returns the number of changed documents.
pub async fn sync_facilities<S: ChannelSource>(
  manager: &SyncManager<S>,
  destination_code: &str,
) -> Result<usize> {
  let channel = facilities_channel(destination_code);
  let changed = manager.refresh_facilities(&channel, facility_record).await?;
  info!(destination = destination_code, changed, "facilities synced");
  Ok(changed)
}

/// Build the facility row of one facilities channel document.
///
/// Document ids look like `80010190;entityType=Attraction;destination=wdw`;
/// the body supplies name, type and ancestors, the id fills in whatever the
/// body leaves out. Documents without a name or entity type are skipped.
pub fn facility_record(channel: &str, doc_id: &str, body: &str) -> Option<FacilityRecord> {
  let doc: ApiFacilityDocument = match serde_json::from_str(body) {
    Ok(doc) => doc,
    Err(e) => {
      debug!(doc_id, error = %e, "not a facility document");
      return None;
    }
  };

  let id = doc
    .id
    .as_deref()
    .map(entity_id)
    .filter(|id| !id.is_empty())
    .unwrap_or_else(|| entity_id(doc_id))
    .to_string();
  let entity_type = doc
    .entity_type
    .or_else(|| doc_id_field(doc_id, "entityType").map(String::from))?;
  let destination_code = doc_id_field(doc_id, "destination")
    .or_else(|| channel.split('.').next())
    .unwrap_or(channel)
    .to_string();

  Some(FacilityRecord {
    id,
    name: doc.name?,
    entity_type,
    sub_type: doc.sub_type,
    doc_id: doc_id.to_string(),
    destination_code,
    ancestors: Ancestors {
      park: ancestor(doc.ancestor_theme_park_id.or(doc.ancestor_water_park_id)),
      resort: ancestor(doc.ancestor_resort_id),
      land: ancestor(doc.ancestor_land_id),
      resort_area: ancestor(doc.ancestor_resort_area_id),
      entertainment_venue: ancestor(doc.ancestor_entertainment_venue_id),
    },
  })
}

/// The bare entity id in front of any `;key=value` qualifiers.
fn entity_id(qualified: &str) -> &str {
  qualified.split(';').next().unwrap_or(qualified).trim()
}

fn doc_id_field<'a>(doc_id: &'a str, key: &str) -> Option<&'a str> {
  doc_id
    .split(';')
    .skip(1)
    .filter_map(|part| part.split_once('='))
    .find(|(k, _)| *k == key)
    .map(|(_, v)| v)
}

fn ancestor(id: Option<String>) -> Option<String> {
  id.map(|id| entity_id(&id).to_string())
    .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::park::Attraction;
  use crate::testing::{
    batch, space_mountain, FakeParkApi, SPACE_MOUNTAIN_DOC, SPACE_MOUNTAIN_FACILITY,
  };

  const CHANNEL: &str = "wdw.facilities.1_0";

  #[test]
  fn test_facility_record_from_document() {
    let record = facility_record(CHANNEL, SPACE_MOUNTAIN_DOC, SPACE_MOUNTAIN_FACILITY).unwrap();
    assert_eq!(record, space_mountain());
  }

  #[test]
  fn test_facility_record_falls_back_to_doc_id() {
    let record = facility_record(
      "dlr.facilities.1_0",
      "353293;entityType=Attraction;destination=dlr",
      r#"{"name": "Matterhorn Bobsleds", "ancestorWaterParkId": "80007981;entityType=water-park"}"#,
    )
    .unwrap();

    assert_eq!(record.id, "353293");
    assert_eq!(record.entity_type, "Attraction");
    assert_eq!(record.destination_code, "dlr");
    assert_eq!(record.ancestors.park.as_deref(), Some("80007981"));
    assert!(record.sub_type.is_none());
  }

  #[test]
  fn test_documents_without_name_or_type_are_skipped() {
    assert!(facility_record(CHANNEL, "80010190", r#"{"name": "No Type"}"#).is_none());
    assert!(facility_record(CHANNEL, SPACE_MOUNTAIN_DOC, r#"{"type": "Attraction"}"#).is_none());
    assert!(facility_record(CHANNEL, SPACE_MOUNTAIN_DOC, "not json").is_none());
  }

  #[tokio::test]
  async fn test_fresh_store_loads_attraction_after_sync() {
    let api = FakeParkApi::new();
    api.push_changes(Ok(batch(
      "5",
      &[(SPACE_MOUNTAIN_DOC, SPACE_MOUNTAIN_FACILITY)],
    )));
    let manager = SyncManager::new(SqliteStorage::open_in_memory().unwrap(), api);

    assert!(matches!(
      Attraction::load(&manager, "80010190"),
      Err(crate::Error::NotFound(_))
    ));

    assert_eq!(sync_facilities(&manager, "wdw").await.unwrap(), 1);

    let attraction = Attraction::load(&manager, "80010190").unwrap();
    assert_eq!(attraction.name(), "Space Mountain");
    assert_eq!(attraction.ancestor_land_id(), Some("80007798"));
    assert_eq!(Attraction::possible_ids(&manager).unwrap(), vec!["80010190"]);
    assert_eq!(
      manager.source().change_calls(),
      vec![(CHANNEL.to_string(), None)]
    );
  }

  #[tokio::test]
  async fn test_removed_facility_is_no_longer_loadable() {
    let api = FakeParkApi::new();
    api.push_changes(Ok(batch(
      "5",
      &[(SPACE_MOUNTAIN_DOC, SPACE_MOUNTAIN_FACILITY)],
    )));
    api.push_changes(Ok(crate::cache::ChangeBatch {
      documents: vec![crate::cache::ChangedDocument {
        id: SPACE_MOUNTAIN_DOC.to_string(),
        deleted: true,
        body: None,
      }],
      last_seq: Some("6".to_string()),
    }));
    let manager = SyncManager::new(SqliteStorage::open_in_memory().unwrap(), api);

    sync_facilities(&manager, "wdw").await.unwrap();
    sync_facilities(&manager, "wdw").await.unwrap();

    assert!(matches!(
      Attraction::load(&manager, "80010190"),
      Err(crate::Error::NotFound(_))
    ));
  }
}
