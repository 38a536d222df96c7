//! Ordered collection of committed overlays.
//!
//! Insertion order is stacking order and serialization order. Loading is
//! lenient: records with an unknown kind or broken geometry are skipped and
//! reported, never fatal.

use std::path::Path;

use chrono::{Local, NaiveDateTime, TimeDelta};
use serde_json::Value;
use thiserror::Error;

use crate::overlay::{HexColor, Overlay, OverlayId, OverlayRecord};

/// Timestamp layout of generated ids: `YYYYMMDD_HHMMSS_mmm`.
pub const ID_FORMAT: &str = "%Y%m%d_%H%M%S_%3f";

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Index past the end of the store
    #[error("Overlay index {index} out of range (store has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// An overlay with this id already exists
    #[error("Duplicate overlay id '{0}'")]
    DuplicateId(OverlayId),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error during export/import
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Load reporting
// ============================================================================

/// A record that was skipped while loading.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRecord {
    /// Position of the record in the input sequence
    pub position: usize,
    /// Record id when one could be read
    pub id: Option<String>,
    /// Why it was skipped
    pub reason: String,
}

/// Outcome of a lenient load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    /// Number of overlays loaded
    pub loaded: usize,
    /// Records that were not loaded
    pub skipped: Vec<SkippedRecord>,
}

impl LoadReport {
    pub fn has_skipped(&self) -> bool {
        !self.skipped.is_empty()
    }

    fn skip(&mut self, position: usize, id: Option<String>, reason: impl Into<String>) {
        let reason = reason.into();
        log::warn!(
            "Skipping overlay record #{} ({}): {}",
            position,
            id.as_deref().unwrap_or("no id"),
            reason
        );
        self.skipped.push(SkippedRecord {
            position,
            id,
            reason,
        });
    }
}

// ============================================================================
// Edits
// ============================================================================

/// A single-field, in-place change to a stored overlay.
#[derive(Debug, Clone, PartialEq)]
pub enum OverlayEdit {
    /// Replace a note's text
    Text(String),
    /// Set the free-text note; empty clears it
    Note(String),
    Color(HexColor),
}

impl OverlayEdit {
    /// Apply to `overlay`. Returns `false` if the edit does not fit its kind.
    pub fn apply(&self, overlay: &mut Overlay) -> bool {
        match self {
            OverlayEdit::Text(text) => overlay.set_text(text),
            OverlayEdit::Note(note) => {
                overlay.set_note(note);
                true
            }
            OverlayEdit::Color(color) => {
                overlay.set_color(*color);
                true
            }
        }
    }
}

// ============================================================================
// Id generation
// ============================================================================

/// Produces strictly increasing timestamp ids.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    last: Option<NaiveDateTime>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Id for `now`, bumped by a millisecond past the previous id when the
    /// clock has not moved on.
    pub fn next_at(&mut self, now: NaiveDateTime) -> (NaiveDateTime, OverlayId) {
        let step = TimeDelta::milliseconds(1);
        let mut stamp = truncate_to_millis(now);
        if let Some(last) = self.last {
            if stamp <= last {
                stamp = last + step;
            }
        }
        self.last = Some(stamp);
        (stamp, OverlayId::new(stamp.format(ID_FORMAT).to_string()))
    }
}

fn truncate_to_millis(t: NaiveDateTime) -> NaiveDateTime {
    let extra_nanos = t.and_utc().timestamp_subsec_nanos() % 1_000_000;
    t - TimeDelta::nanoseconds(i64::from(extra_nanos))
}

// ============================================================================
// Store
// ============================================================================

/// The committed overlays of one viewer session.
#[derive(Debug, Clone, Default)]
pub struct OverlayStore {
    overlays: Vec<Overlay>,
    ids: IdGenerator,
    dirty: bool,
}

impl OverlayStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Overlay> {
        self.overlays.get(index)
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.overlays
    }

    pub fn iter(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays.iter()
    }

    pub fn contains_id(&self, id: &OverlayId) -> bool {
        self.overlays.iter().any(|o| &o.id == id)
    }

    pub fn index_of(&self, id: &OverlayId) -> Option<usize> {
        self.overlays.iter().position(|o| &o.id == id)
    }

    /// True when the store changed since the last [`OverlayStore::mark_clean`].
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Fresh id from the local clock, unique within this store.
    pub fn next_id(&mut self) -> OverlayId {
        self.next_id_at(Local::now().naive_local())
    }

    /// Fresh id for a given time, unique within this store.
    pub fn next_id_at(&mut self, now: NaiveDateTime) -> OverlayId {
        let (mut stamp, mut id) = self.ids.next_at(now);
        while self.contains_id(&id) {
            (stamp, id) = self.ids.next_at(stamp);
        }
        id
    }

    /// Append an overlay, returning its index.
    pub fn add(&mut self, overlay: Overlay) -> Result<usize, StoreError> {
        if self.contains_id(&overlay.id) {
            return Err(StoreError::DuplicateId(overlay.id));
        }
        log::debug!("Added {} overlay {}", overlay.kind(), overlay.id);
        self.overlays.push(overlay);
        self.dirty = true;
        Ok(self.overlays.len() - 1)
    }

    fn check_index(&self, index: usize) -> Result<(), StoreError> {
        if index >= self.overlays.len() {
            return Err(StoreError::IndexOutOfRange {
                index,
                len: self.overlays.len(),
            });
        }
        Ok(())
    }

    /// Remove and return the overlay at `index`.
    pub fn delete(&mut self, index: usize) -> Result<Overlay, StoreError> {
        self.check_index(index)?;
        let removed = self.overlays.remove(index);
        log::debug!("Deleted overlay {} at index {}", removed.id, index);
        self.dirty = true;
        Ok(removed)
    }

    /// Apply `edit` to the overlay at `index`. Returns whether it applied.
    pub fn edit(&mut self, index: usize, edit: &OverlayEdit) -> Result<bool, StoreError> {
        self.check_index(index)?;
        let overlay = &mut self.overlays[index];
        let applied = edit.apply(overlay);
        if applied {
            log::debug!("Edited overlay {}", overlay.id);
            self.dirty = true;
        } else {
            log::debug!("Edit {:?} does not apply to {} overlay", edit, overlay.kind());
        }
        Ok(applied)
    }

    /// Remove every overlay.
    pub fn clear(&mut self) {
        if !self.overlays.is_empty() {
            log::info!("Cleared {} overlays", self.overlays.len());
            self.dirty = true;
        }
        self.overlays.clear();
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    /// Records in insertion order.
    pub fn serialize(&self) -> Vec<OverlayRecord> {
        self.overlays.iter().map(Overlay::to_record).collect()
    }

    /// Records as JSON values, for key-value stores.
    pub fn to_values(&self) -> Vec<Value> {
        self.serialize()
            .iter()
            .filter_map(|record| match serde_json::to_value(record) {
                Ok(value) => Some(value),
                Err(e) => {
                    log::error!("Failed to serialize overlay {}: {}", record.id, e);
                    None
                }
            })
            .collect()
    }

    /// Rebuild a store, skipping records that cannot be loaded.
    pub fn deserialize(records: &[OverlayRecord]) -> OverlayStore {
        Self::deserialize_with_report(records).0
    }

    /// Like [`OverlayStore::deserialize`], also reporting skipped records.
    pub fn deserialize_with_report(records: &[OverlayRecord]) -> (OverlayStore, LoadReport) {
        let mut store = OverlayStore::new();
        let mut report = LoadReport::default();

        for (position, record) in records.iter().enumerate() {
            store.load_record(position, record, &mut report);
        }
        store.dirty = false;
        (store, report)
    }

    fn load_record(&mut self, position: usize, record: &OverlayRecord, report: &mut LoadReport) {
        match Overlay::from_record(record) {
            Ok(overlay) => {
                if self.contains_id(&overlay.id) {
                    report.skip(position, Some(record.id.clone()), "duplicate id");
                } else {
                    self.overlays.push(overlay);
                    report.loaded += 1;
                }
            }
            Err(e) => report.skip(position, Some(record.id.clone()), e.to_string()),
        }
    }

    /// Load from raw JSON values. Entries that are not even record-shaped are
    /// skipped like any other malformed record.
    pub fn from_values(values: &[Value]) -> (OverlayStore, LoadReport) {
        let mut store = OverlayStore::new();
        let mut report = LoadReport::default();

        for (position, value) in values.iter().enumerate() {
            match serde_json::from_value::<OverlayRecord>(value.clone()) {
                Ok(record) => store.load_record(position, &record, &mut report),
                Err(e) => {
                    let id = value.get("id").and_then(Value::as_str).map(str::to_string);
                    report.skip(position, id, format!("not an overlay record: {e}"));
                }
            }
        }
        store.dirty = false;
        (store, report)
    }

    /// Pretty JSON array of records.
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string_pretty(&self.serialize())?)
    }

    /// Parse a JSON array of records. Only a non-array document fails.
    pub fn from_json(json: &str) -> Result<(OverlayStore, LoadReport), StoreError> {
        let values: Vec<Value> = serde_json::from_str(json)?;
        Ok(Self::from_values(&values))
    }

    /// Write all overlays to `path`. Returns the number written.
    pub fn export_to_file(&self, path: &Path) -> Result<usize, StoreError> {
        std::fs::write(path, self.to_json()?)?;
        log::info!("Exported {} overlays to {:?}", self.len(), path);
        Ok(self.len())
    }

    /// Read overlays from a file written by [`OverlayStore::export_to_file`].
    pub fn import_from_file(path: &Path) -> Result<(OverlayStore, LoadReport), StoreError> {
        let json = std::fs::read_to_string(path)?;
        let (store, report) = Self::from_json(&json)?;
        log::info!(
            "Imported {} overlays from {:?} ({} skipped)",
            report.loaded,
            path,
            report.skipped.len()
        );
        Ok((store, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{EXTRA_CALIBRATED_VALUE, EXTRA_NOTE, EXTRA_UNIT, OverlayGeometry};
    use crate::zoom::Point;
    use chrono::NaiveDate;
    use serde_json::json;

    fn at(h: u32, m: u32, s: u32, ms: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_milli_opt(h, m, s, ms)
            .unwrap()
    }

    fn sample_store() -> OverlayStore {
        let mut store = OverlayStore::new();
        let id = store.next_id_at(at(10, 0, 0, 0));
        store
            .add(Overlay::note(id, Point::new(5, 6), "spike", HexColor::GREEN))
            .unwrap();
        let id = store.next_id_at(at(10, 0, 0, 0));
        store
            .add(
                Overlay::ruler(id, Point::new(10, 10), Point::new(100, 10), HexColor::RED)
                    .with_extra(EXTRA_NOTE, "baseline")
                    .with_extra(EXTRA_CALIBRATED_VALUE, 180.0)
                    .with_extra(EXTRA_UNIT, "ms"),
            )
            .unwrap();
        let id = store.next_id_at(at(10, 0, 1, 500));
        store
            .add(
                Overlay::region(id, Point::new(40, 30), Point::new(20, 10), HexColor::BLUE)
                    .with_extra("reviewed", true),
            )
            .unwrap();
        store
    }

    #[test]
    fn test_ids_use_timestamp_format_and_increase() {
        let mut store = OverlayStore::new();
        let a = store.next_id_at(at(13, 45, 2, 7));
        let b = store.next_id_at(at(13, 45, 2, 7));
        let c = store.next_id_at(at(13, 45, 1, 0));
        assert_eq!(a.as_str(), "20240309_134502_007");
        assert_eq!(b.as_str(), "20240309_134502_008");
        assert_eq!(c.as_str(), "20240309_134502_009");
    }

    #[test]
    fn test_next_id_skips_loaded_ids() {
        let mut store = OverlayStore::new();
        store
            .add(Overlay::note(
                OverlayId::new("20240309_100000_000"),
                Point::new(0, 0),
                "x",
                HexColor::GREEN,
            ))
            .unwrap();
        let id = store.next_id_at(at(10, 0, 0, 0));
        assert_eq!(id.as_str(), "20240309_100000_001");
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut store = sample_store();
        let dup = store.get(0).unwrap().clone();
        assert!(matches!(store.add(dup), Err(StoreError::DuplicateId(_))));
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_delete_out_of_range_leaves_store_unchanged() {
        let mut store = sample_store();
        let before = store.serialize();
        let err = store.delete(5).unwrap_err();
        assert!(matches!(
            err,
            StoreError::IndexOutOfRange { index: 5, len: 3 }
        ));
        assert_eq!(store.serialize(), before);
    }

    #[test]
    fn test_delete_keeps_order() {
        let mut store = sample_store();
        let removed = store.delete(1).unwrap();
        assert!(matches!(removed.geometry, OverlayGeometry::Ruler { .. }));
        assert_eq!(store.len(), 2);
        assert!(matches!(
            store.get(1).unwrap().geometry,
            OverlayGeometry::Region { .. }
        ));
    }

    #[test]
    fn test_edit_touches_one_field() {
        let mut store = sample_store();
        let before = store.get(2).unwrap().clone();
        assert!(store.edit(2, &OverlayEdit::Note("artifact".into())).unwrap());
        let after = store.get(2).unwrap();
        assert_eq!(after.note_text(), Some("artifact"));
        assert_eq!(after.geometry, before.geometry);
        assert_eq!(after.color, before.color);
        assert_eq!(after.id, before.id);

        // Text edits only apply to notes
        assert!(!store.edit(2, &OverlayEdit::Text("x".into())).unwrap());
        assert!(store.edit(9, &OverlayEdit::Color(HexColor::RED)).is_err());
    }

    #[test]
    fn test_clear_then_serialize_is_empty() {
        let mut store = sample_store();
        store.clear();
        assert_eq!(store.len(), 0);
        assert!(store.serialize().is_empty());
    }

    #[test]
    fn test_round_trip_preserves_everything() {
        let store = sample_store();
        let restored = OverlayStore::deserialize(&store.serialize());
        assert_eq!(restored.overlays(), store.overlays());
    }

    #[test]
    fn test_json_round_trip() {
        let store = sample_store();
        let json = store.to_json().unwrap();
        let (restored, report) = OverlayStore::from_json(&json).unwrap();
        assert_eq!(restored.overlays(), store.overlays());
        assert_eq!(report.loaded, 3);
        assert!(!report.has_skipped());
    }

    #[test]
    fn test_unknown_kind_skipped() {
        let records: Vec<OverlayRecord> = serde_json::from_value(json!([
            {"id": "a", "kind": "Note", "data": {"position": [1, 2], "text": "x", "color": "#00FF00"}},
            {"id": "b", "kind": "Unknown", "data": {}},
            {"id": "c", "kind": "Ruler", "data": {"start_point": [0, 0], "end_point": [5, 5], "color": "#FF0000"}}
        ]))
        .unwrap();
        let (store, report) = OverlayStore::deserialize_with_report(&records);
        assert_eq!(store.len(), 2);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].position, 1);
        assert_eq!(report.skipped[0].id.as_deref(), Some("b"));
    }

    #[test]
    fn test_from_json_skips_non_records_and_duplicates() {
        let json = r##"[
            {"id": "a", "type": "Note", "data": {"position": [1, 2], "text": "x"}},
            42,
            {"kind": "Note"},
            {"id": "a", "type": "Note", "data": {"position": [3, 4], "text": "y"}}
        ]"##;
        let (store, report) = OverlayStore::from_json(json).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(report.skipped.len(), 3);
        assert!(!store.is_dirty());
    }

    #[test]
    fn test_from_json_rejects_non_array() {
        assert!(matches!(
            OverlayStore::from_json("{\"id\": 1}"),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn test_file_export_import() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlays.json");
        let store = sample_store();
        assert_eq!(store.export_to_file(&path).unwrap(), 3);

        let (restored, _) = OverlayStore::import_from_file(&path).unwrap();
        assert_eq!(restored.overlays(), store.overlays());
    }

    #[test]
    fn test_dirty_tracking() {
        let mut store = OverlayStore::new();
        assert!(!store.is_dirty());
        let id = store.next_id_at(at(1, 0, 0, 0));
        store
            .add(Overlay::note(id, Point::new(0, 0), "n", HexColor::GREEN))
            .unwrap();
        assert!(store.is_dirty());
        store.mark_clean();
        store.clear();
        assert!(store.is_dirty());
    }
}
