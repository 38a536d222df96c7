//! Per-session viewer state.
//!
//! Loaded once when a viewer opens and written back when it closes. Loading
//! never fails as a whole: a key with an unusable value falls back to its
//! default and is reported.

use std::path::PathBuf;

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::editing::Tool;
use crate::filter::FilterMode;
use crate::measure::{Calibration, GridCalibration};
use crate::persistence::{KeyValueStore, PersistenceError, get_typed, set_typed};
use crate::zoom::{DEFAULT_ZOOM_PERCENT, MAX_ZOOM_PERCENT, MIN_ZOOM_PERCENT, ZoomState};

/// Keys written to the key-value store.
pub mod keys {
    pub const LAST_ZOOM: &str = "last_zoom";
    pub const ENHANCED_MODE: &str = "enhanced_mode";
    pub const CONTRAST_MODE: &str = "contrast_mode";
    pub const TRACE_ENHANCEMENT: &str = "trace_enhancement";
    pub const LAST_FILE: &str = "last_file";
    pub const ANALYSIS_OVERLAYS: &str = "analysis_overlays";
    pub const SAVED_ANNOTATIONS: &str = "saved_annotations";
    pub const SAVED_POSITIONS: &str = "saved_positions";
    pub const ANALYSIS_MODE_ACTIVE: &str = "analysis_mode_active";
    pub const CURRENT_ANALYSIS_TOOL: &str = "current_analysis_tool";
    pub const CALIBRATION: &str = "calibration";
    pub const GRID_CALIBRATION: &str = "grid_calibration";
}

/// Timestamp layout of saved positions.
pub const POSITION_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================================================
// Saved positions
// ============================================================================

/// A named zoom and scroll position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedPosition {
    pub zoom: u32,
    pub scroll_x: u32,
    pub scroll_y: u32,
    #[serde(default)]
    pub timestamp: String,
}

impl SavedPosition {
    pub fn capture(zoom: &ZoomState, at: NaiveDateTime) -> Self {
        let (scroll_x, scroll_y) = zoom.scroll();
        Self {
            zoom: zoom.scale_percent(),
            scroll_x,
            scroll_y,
            timestamp: at.format(POSITION_TIMESTAMP_FORMAT).to_string(),
        }
    }

    /// Zoom state this position restores, clamped to the valid range.
    pub fn to_zoom(&self) -> ZoomState {
        ZoomState::new(self.zoom).with_scroll(self.scroll_x, self.scroll_y)
    }
}

/// Saved positions in insertion order. Saving an existing name replaces it
/// in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedPositions {
    entries: Vec<(String, SavedPosition)>,
}

impl SavedPositions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&SavedPosition> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    /// Save under `name`. Empty names are refused.
    pub fn save(&mut self, name: &str, position: SavedPosition) -> bool {
        if name.is_empty() {
            return false;
        }
        match self.entries.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => *existing = position,
            None => self.entries.push((name.to_string(), position)),
        }
        log::debug!("Saved position '{}'", name);
        true
    }

    /// Save the current view under `name`, stamped with the local time.
    pub fn save_current(&mut self, name: &str, zoom: &ZoomState) -> bool {
        self.save(name, SavedPosition::capture(zoom, Local::now().naive_local()))
    }

    pub fn remove(&mut self, name: &str) -> Option<SavedPosition> {
        let index = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(index).1)
    }

    /// JSON object keyed by name, in insertion order.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, position) in &self.entries {
            if let Ok(v) = serde_json::to_value(position) {
                map.insert(name.clone(), v);
            }
        }
        Value::Object(map)
    }

    /// Parse a JSON object of positions, skipping malformed entries.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        let map = value.as_object().ok_or("expected an object")?;
        let mut positions = SavedPositions::new();
        for (name, v) in map {
            match serde_json::from_value::<SavedPosition>(v.clone()) {
                Ok(p) => {
                    positions.save(name, p);
                }
                Err(e) => log::warn!("Skipping saved position '{}': {}", name, e),
            }
        }
        Ok(positions)
    }
}

// ============================================================================
// Session settings
// ============================================================================

/// Everything a viewer restores on open.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub last_zoom: u32,
    pub enhanced_mode: bool,
    pub contrast_mode: FilterMode,
    pub trace_enhancement: bool,
    pub last_file: Option<PathBuf>,
    /// Stored overlay records, validated when the overlay store loads them
    pub analysis_overlays: Vec<Value>,
    /// Raw annotation log records, see [`crate::annotation::AnnotationLog`]
    pub saved_annotations: Value,
    pub saved_positions: SavedPositions,
    pub analysis_mode_active: bool,
    pub current_analysis_tool: Tool,
    /// Ruler calibration; `None` until the user configures one
    pub calibration: Option<Calibration>,
    pub grid_calibration: GridCalibration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            last_zoom: DEFAULT_ZOOM_PERCENT,
            enhanced_mode: false,
            contrast_mode: FilterMode::None,
            trace_enhancement: false,
            last_file: None,
            analysis_overlays: Vec::new(),
            saved_annotations: Value::Array(Vec::new()),
            saved_positions: SavedPositions::new(),
            analysis_mode_active: false,
            current_analysis_tool: Tool::Note,
            calibration: None,
            grid_calibration: GridCalibration::default(),
        }
    }
}

/// A key whose stored value was unusable and fell back to its default.
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsWarning {
    pub key: &'static str,
    pub message: String,
}

/// Older stores kept lists and maps as JSON text; accept both forms.
fn unwrap_json_text(value: Value) -> Value {
    match value {
        Value::String(s) if s.trim_start().starts_with(['[', '{']) => {
            serde_json::from_str(&s).unwrap_or(Value::String(s))
        }
        other => other,
    }
}

struct Loader<'a> {
    store: &'a dyn KeyValueStore,
    warnings: Vec<SettingsWarning>,
}

impl Loader<'_> {
    fn warn(&mut self, key: &'static str, message: impl Into<String>) {
        let message = message.into();
        log::warn!("Ignoring stored '{}': {}", key, message);
        self.warnings.push(SettingsWarning { key, message });
    }

    fn raw(&self, key: &str) -> Option<Value> {
        self.store
            .get(key)
            .filter(|v| !v.is_null())
            .map(unwrap_json_text)
    }

    fn typed<T: serde::de::DeserializeOwned>(&mut self, key: &'static str) -> Option<T> {
        match get_typed(self.store, key) {
            Ok(v) => v,
            Err(e) => {
                self.warn(key, e.to_string());
                None
            }
        }
    }
}

impl SessionSettings {
    /// Read every key from `store`. Bad values are reported, not fatal.
    pub fn load(store: &dyn KeyValueStore) -> (SessionSettings, Vec<SettingsWarning>) {
        let mut settings = SessionSettings::default();
        let mut loader = Loader {
            store,
            warnings: Vec::new(),
        };

        if let Some(zoom) = loader.typed::<u32>(keys::LAST_ZOOM) {
            if zoom > 0 {
                settings.last_zoom = zoom.clamp(MIN_ZOOM_PERCENT, MAX_ZOOM_PERCENT);
            }
        }
        if let Some(v) = loader.typed(keys::ENHANCED_MODE) {
            settings.enhanced_mode = v;
        }
        if let Some(index) = loader.typed::<u64>(keys::CONTRAST_MODE) {
            settings.contrast_mode = u8::try_from(index)
                .map(FilterMode::from_index)
                .unwrap_or_default();
        }
        if let Some(v) = loader.typed(keys::TRACE_ENHANCEMENT) {
            settings.trace_enhancement = v;
        }
        if let Some(v) = loader.typed::<String>(keys::LAST_FILE) {
            settings.last_file = (!v.is_empty()).then(|| PathBuf::from(v));
        }

        if let Some(value) = loader.raw(keys::ANALYSIS_OVERLAYS) {
            match value {
                Value::Array(items) => settings.analysis_overlays = items,
                _ => loader.warn(keys::ANALYSIS_OVERLAYS, "expected a list"),
            }
        }
        if let Some(value) = loader.raw(keys::SAVED_ANNOTATIONS) {
            if value.is_array() {
                settings.saved_annotations = value;
            } else {
                loader.warn(keys::SAVED_ANNOTATIONS, "expected a list");
            }
        }
        if let Some(value) = loader.raw(keys::SAVED_POSITIONS) {
            match SavedPositions::from_value(&value) {
                Ok(positions) => settings.saved_positions = positions,
                Err(e) => loader.warn(keys::SAVED_POSITIONS, e),
            }
        }

        if let Some(v) = loader.typed(keys::ANALYSIS_MODE_ACTIVE) {
            settings.analysis_mode_active = v;
        }
        if let Some(name) = loader.typed::<String>(keys::CURRENT_ANALYSIS_TOOL) {
            match Tool::from_name(&name) {
                Some(tool) => settings.current_analysis_tool = tool,
                None => loader.warn(keys::CURRENT_ANALYSIS_TOOL, format!("unknown tool '{name}'")),
            }
        }
        settings.calibration = loader.typed(keys::CALIBRATION);
        if let Some(v) = loader.typed(keys::GRID_CALIBRATION) {
            settings.grid_calibration = v;
        }

        log::debug!(
            "Loaded session settings ({} overlays, {} positions, {} warnings)",
            settings.analysis_overlays.len(),
            settings.saved_positions.len(),
            loader.warnings.len()
        );
        (settings, loader.warnings)
    }

    /// Write every key to `store` and flush it.
    pub fn save(&self, store: &mut dyn KeyValueStore) -> Result<(), PersistenceError> {
        set_typed(store, keys::LAST_ZOOM, &self.last_zoom)?;
        set_typed(store, keys::ENHANCED_MODE, &self.enhanced_mode)?;
        set_typed(store, keys::CONTRAST_MODE, &self.contrast_mode.index())?;
        set_typed(store, keys::TRACE_ENHANCEMENT, &self.trace_enhancement)?;
        match &self.last_file {
            Some(path) => set_typed(store, keys::LAST_FILE, &path.to_string_lossy())?,
            None => {
                store.remove(keys::LAST_FILE);
            }
        }
        set_typed(store, keys::ANALYSIS_OVERLAYS, &self.analysis_overlays)?;
        store.set(keys::SAVED_ANNOTATIONS, self.saved_annotations.clone());
        store.set(keys::SAVED_POSITIONS, self.saved_positions.to_value());
        set_typed(store, keys::ANALYSIS_MODE_ACTIVE, &self.analysis_mode_active)?;
        set_typed(
            store,
            keys::CURRENT_ANALYSIS_TOOL,
            &self.current_analysis_tool.name(),
        )?;
        match &self.calibration {
            Some(cal) => set_typed(store, keys::CALIBRATION, cal)?,
            None => {
                store.remove(keys::CALIBRATION);
            }
        }
        set_typed(store, keys::GRID_CALIBRATION, &self.grid_calibration)?;
        store.flush()
    }
}
