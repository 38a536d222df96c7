//! Persisted overlay records.
//!
//! Wire shape: `{"id": .., "kind": .., "data": {..}}` with geometry as `[x, y]`
//! integer arrays. Readers also accept the older `type` key in place of `kind`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{
    ColorParseError, ExtraValue, HexColor, Overlay, OverlayGeometry, OverlayId, OverlayKind,
    RESERVED_KEYS,
};
use crate::zoom::Point;

/// Why a record could not become an overlay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// `kind` names no known overlay
    #[error("Unknown overlay kind '{kind}'")]
    UnknownKind { kind: String },

    /// A required field is absent
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// A field is present but has the wrong shape
    #[error("Invalid field '{field}': {message}")]
    InvalidField { field: String, message: String },
}

impl RecordError {
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One serialized overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredRecord")]
pub struct OverlayRecord {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Wire form accepting the older `type` key for the kind.
#[derive(Deserialize)]
struct StoredRecord {
    id: String,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default, rename = "type")]
    legacy_kind: Option<String>,
    #[serde(default)]
    data: Map<String, Value>,
}

impl TryFrom<StoredRecord> for OverlayRecord {
    type Error = String;

    fn try_from(stored: StoredRecord) -> Result<Self, Self::Error> {
        let kind = match (stored.kind, stored.legacy_kind) {
            (Some(kind), Some(legacy)) => {
                if kind != legacy {
                    log::warn!(
                        "Overlay {} has both kind '{}' and type '{}', using kind",
                        stored.id,
                        kind,
                        legacy
                    );
                }
                kind
            }
            (Some(kind), None) | (None, Some(kind)) => kind,
            (None, None) => return Err("missing field `kind`".to_string()),
        };
        Ok(Self {
            id: stored.id,
            kind,
            data: stored.data,
        })
    }
}

fn point_value(p: Point) -> Value {
    Value::Array(vec![Value::from(p.x), Value::from(p.y)])
}

fn extra_value(value: &ExtraValue) -> Option<Value> {
    match value {
        ExtraValue::Bool(b) => Some(Value::Bool(*b)),
        ExtraValue::Int(i) => Some(Value::from(*i)),
        ExtraValue::Float(f) => serde_json::Number::from_f64(*f).map(Value::Number),
        ExtraValue::Text(s) => Some(Value::String(s.clone())),
    }
}

fn read_extra(key: &str, value: &Value) -> Option<ExtraValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(ExtraValue::Bool(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(ExtraValue::Int(i)),
            None => n.as_f64().map(ExtraValue::Float),
        },
        Value::String(s) => Some(ExtraValue::Text(s.clone())),
        Value::Array(_) | Value::Object(_) => {
            log::warn!("Dropping non-primitive extra field '{}'", key);
            None
        }
    }
}

fn read_point(data: &Map<String, Value>, field: &str) -> Result<Point, RecordError> {
    let value = match data.get(field) {
        None | Some(Value::Null) => return Err(RecordError::missing_field(field)),
        Some(v) => v,
    };
    let invalid = || RecordError::invalid_field(field, format!("expected [x, y], got {value}"));

    let items = value.as_array().ok_or_else(invalid)?;
    if items.len() != 2 {
        return Err(invalid());
    }
    let coord = |v: &Value| {
        v.as_u64()
            .and_then(|c| u32::try_from(c).ok())
            .ok_or_else(invalid)
    };
    Ok(Point::new(coord(&items[0])?, coord(&items[1])?))
}

fn read_color(data: &Map<String, Value>, kind: OverlayKind) -> Result<HexColor, RecordError> {
    match data.get("color") {
        None | Some(Value::Null) => Ok(kind.default_color()),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|e: ColorParseError| RecordError::invalid_field("color", e.to_string())),
        Some(other) => Err(RecordError::invalid_field(
            "color",
            format!("expected a string, got {other}"),
        )),
    }
}

fn read_text(data: &Map<String, Value>) -> Result<String, RecordError> {
    match data.get("text") {
        None | Some(Value::Null) => Err(RecordError::missing_field("text")),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(RecordError::invalid_field(
            "text",
            format!("expected a string, got {other}"),
        )),
    }
}

impl Overlay {
    /// Serialize to a record. Extras are written first so geometry keys win.
    pub fn to_record(&self) -> OverlayRecord {
        let mut data = Map::new();
        for (key, value) in &self.extra {
            if let Some(v) = extra_value(value) {
                data.insert(key.clone(), v);
            }
        }

        match &self.geometry {
            OverlayGeometry::Note { anchor, text } => {
                data.insert("position".into(), point_value(*anchor));
                data.insert("text".into(), Value::String(text.clone()));
            }
            OverlayGeometry::Ruler { start, end } => {
                data.insert("start_point".into(), point_value(*start));
                data.insert("end_point".into(), point_value(*end));
            }
            OverlayGeometry::Region {
                top_left,
                bottom_right,
            } => {
                data.insert("top_left".into(), point_value(*top_left));
                data.insert("bottom_right".into(), point_value(*bottom_right));
            }
        }
        data.insert("color".into(), Value::String(self.color.to_string()));

        OverlayRecord {
            id: self.id.to_string(),
            kind: self.kind().as_str().to_string(),
            data,
        }
    }

    /// Rebuild an overlay from a record. The id is kept verbatim.
    pub fn from_record(record: &OverlayRecord) -> Result<Overlay, RecordError> {
        let kind = OverlayKind::parse(&record.kind)
            .ok_or_else(|| RecordError::unknown_kind(&record.kind))?;
        if record.id.is_empty() {
            return Err(RecordError::missing_field("id"));
        }

        let data = &record.data;
        let geometry = match kind {
            OverlayKind::Note => OverlayGeometry::Note {
                anchor: read_point(data, "position")?,
                text: read_text(data)?,
            },
            OverlayKind::Ruler => OverlayGeometry::Ruler {
                start: read_point(data, "start_point")?,
                end: read_point(data, "end_point")?,
            },
            OverlayKind::RegionOfInterest => OverlayGeometry::Region {
                top_left: read_point(data, "top_left")?,
                bottom_right: read_point(data, "bottom_right")?,
            },
        };
        let color = read_color(data, kind)?;

        let mut overlay = Overlay::new(OverlayId::new(record.id.clone()), color, geometry);
        for (key, value) in data {
            if RESERVED_KEYS.contains(&key.as_str()) {
                continue;
            }
            if let Some(extra) = read_extra(key, value) {
                overlay.extra.insert(key.clone(), extra);
            }
        }
        Ok(overlay)
    }
}
