//! SQLite storage for facility rows and channel documents.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::traits::{
  Ancestors, ChangeBatch, ChannelState, Document, DocumentLookup, FacilityIndex, FacilityLookup,
  FacilityRecord,
};
use crate::{Error, Result};

/// SQLite-backed store. Owned by the sync manager, closed on drop.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    debug!(path = %path.display(), "opened cache database");
    Self::with_connection(conn)
  }

  /// Open a throwaway store that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    self.conn().execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    // Transactions roll back on drop, so a poisoned connection is still consistent.
    self.conn.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Look up the static record for a facility id.
  pub fn facility(&self, id: &str) -> Result<FacilityLookup> {
    let record = self
      .conn()
      .query_row(
        "SELECT id, name, entityType, subType, doc_id, destination_code,
                park_id, resort_id, land_id, resort_area_id, ent_venue_id
         FROM facilities WHERE id = ?",
        params![id],
        facility_from_row,
      )
      .optional()?;

    Ok(match record {
      Some(record) => FacilityLookup::Found(record),
      None => FacilityLookup::NotFound,
    })
  }

  /// Ids of every facility with the given entity type.
  pub fn facility_ids(&self, entity_type: &str) -> Result<Vec<String>> {
    let conn = self.conn();
    let mut stmt = conn.prepare("SELECT id FROM facilities WHERE entityType = ? ORDER BY id")?;
    let ids = stmt
      .query_map(params![entity_type], |row| row.get(0))?
      .collect::<rusqlite::Result<Vec<String>>>()?;
    Ok(ids)
  }

  /// Insert or replace a facility row.
  #[cfg(test)]
  pub(crate) fn upsert_facility(&self, record: &FacilityRecord) -> Result<()> {
    upsert_facility_row(&self.conn(), record)?;
    Ok(())
  }

  /// Read the current document `id` on `channel`.
  pub fn document(&self, channel: &str, id: &str) -> Result<DocumentLookup> {
    let body: Option<String> = self
      .conn()
      .query_row(
        "SELECT body FROM sync WHERE channel = ? AND id = ?",
        params![channel, id],
        |row| row.get(0),
      )
      .optional()?;

    Ok(match body {
      Some(body) => DocumentLookup::Present(Document {
        id: id.to_string(),
        body,
      }),
      None => DocumentLookup::Absent,
    })
  }

  /// Sync state of a channel, `None` if it was never materialized.
  pub fn channel_state(&self, channel: &str) -> Result<Option<ChannelState>> {
    let row: Option<(Option<String>, String)> = self
      .conn()
      .query_row(
        "SELECT last_seq, synced_at FROM channels WHERE name = ?",
        params![channel],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()?;

    row
      .map(|(last_seq, synced_at)| {
        Ok(ChannelState {
          last_seq,
          synced_at: parse_datetime(&synced_at)?,
        })
      })
      .transpose()
  }

  /// Merge a batch into `channel` and record its sequence position.
  ///
  /// Documents are upserted latest-wins; a body identical to the stored one
  /// is left untouched. Returns the number of documents actually changed.
  pub fn apply_changes(&self, channel: &str, batch: &ChangeBatch) -> Result<usize> {
    self.apply_changes_indexed(channel, batch, None)
  }

  /// [`Self::apply_changes`], also keeping the `facilities` rows in step
  /// with the channel's documents when `index` is given.
  pub fn apply_changes_indexed(
    &self,
    channel: &str,
    batch: &ChangeBatch,
    index: Option<FacilityIndex>,
  ) -> Result<usize> {
    let mut conn = self.conn();
    let tx = conn.transaction()?;
    let mut changed = 0;
    let mut indexed = 0;

    for doc in &batch.documents {
      if doc.deleted {
        changed += tx.execute(
          "DELETE FROM sync WHERE channel = ? AND id = ?",
          params![channel, doc.id],
        )?;
        if index.is_some() {
          tx.execute("DELETE FROM facilities WHERE doc_id = ?", params![doc.id])?;
        }
        continue;
      }

      let Some(body) = &doc.body else {
        debug!(channel, id = %doc.id, "change without a document body, skipping");
        continue;
      };

      let written = tx.execute(
        "INSERT INTO sync (channel, id, body, digest, synced_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))
         ON CONFLICT(channel, id) DO UPDATE SET
           body = excluded.body,
           digest = excluded.digest,
           synced_at = excluded.synced_at
         WHERE sync.digest <> excluded.digest",
        params![channel, doc.id, body, digest(body)],
      )?;
      changed += written;

      if let Some(record) = index.and_then(|index| index(channel, &doc.id, body)) {
        upsert_facility_row(&tx, &record)?;
        indexed += 1;
      }
    }

    tx.execute(
      "INSERT INTO channels (name, last_seq, synced_at)
       VALUES (?1, ?2, datetime('now'))
       ON CONFLICT(name) DO UPDATE SET
         last_seq = COALESCE(excluded.last_seq, channels.last_seq),
         synced_at = excluded.synced_at",
      params![channel, batch.last_seq],
    )?;

    tx.commit()?;
    if indexed > 0 {
      debug!(channel, indexed, "facility rows updated");
    }
    Ok(changed)
  }
}

/// Schema for the store. `facilities` is derived from the documents of the
/// facilities channels; `sync` and `channels` are owned by the sync manager.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS facilities (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    entityType TEXT NOT NULL,
    subType TEXT,
    doc_id TEXT NOT NULL,
    destination_code TEXT NOT NULL,
    park_id TEXT,
    resort_id TEXT,
    land_id TEXT,
    resort_area_id TEXT,
    ent_venue_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_facilities_type ON facilities(entityType);

-- Channel documents, latest version only
CREATE TABLE IF NOT EXISTS sync (
    channel TEXT NOT NULL,
    id TEXT NOT NULL,
    body TEXT NOT NULL,
    digest TEXT NOT NULL,
    synced_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (channel, id)
);

CREATE TABLE IF NOT EXISTS channels (
    name TEXT PRIMARY KEY,
    last_seq TEXT,
    synced_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

fn upsert_facility_row(conn: &Connection, record: &FacilityRecord) -> rusqlite::Result<usize> {
  let ancestors = &record.ancestors;
  conn.execute(
    "INSERT OR REPLACE INTO facilities
       (id, name, entityType, subType, doc_id, destination_code,
        park_id, resort_id, land_id, resort_area_id, ent_venue_id)
     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    params![
      record.id,
      record.name,
      record.entity_type,
      record.sub_type,
      record.doc_id,
      record.destination_code,
      ancestors.park,
      ancestors.resort,
      ancestors.land,
      ancestors.resort_area,
      ancestors.entertainment_venue,
    ],
  )
}

fn facility_from_row(row: &Row<'_>) -> rusqlite::Result<FacilityRecord> {
  Ok(FacilityRecord {
    id: row.get(0)?,
    name: row.get(1)?,
    entity_type: row.get(2)?,
    sub_type: row.get(3)?,
    doc_id: row.get(4)?,
    destination_code: row.get(5)?,
    ancestors: Ancestors {
      park: row.get(6)?,
      resort: row.get(7)?,
      land: row.get(8)?,
      resort_area: row.get(9)?,
      entertainment_venue: row.get(10)?,
    },
  })
}

/// SHA-256 of a document body, hex encoded.
fn digest(body: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(body.as_bytes());
  hex::encode(hasher.finalize())
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::DataFormat(format!("Failed to parse datetime '{}': {}", s, e)))
}
