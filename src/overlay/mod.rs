//! Spatial overlays anchored in image space.
//!
//! Three kinds exist: notes, rulers and regions of interest. Geometry is always
//! stored in source-image pixels; on-screen positions are derived on every
//! render. Free-form primitives (notes, calibrated values, units) live in the
//! ordered `extra` map.

mod raster;
mod record;
mod render;

pub use raster::{PendingLabel, RasterSurface};
pub use record::{OverlayRecord, RecordError};
pub use render::{DrawCommand, DrawList, LineStyle, OverlaySurface, label_size};

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::zoom::Point;

/// `extra` key holding a free-text note.
pub const EXTRA_NOTE: &str = "note";

/// `extra` key holding a calibrated ruler length.
pub const EXTRA_CALIBRATED_VALUE: &str = "calibrated_value";

/// `extra` key holding the calibration unit.
pub const EXTRA_UNIT: &str = "unit";

/// Record keys used for geometry and color. Extras may not use them.
pub const RESERVED_KEYS: &[&str] = &[
    "position",
    "text",
    "color",
    "start_point",
    "end_point",
    "top_left",
    "bottom_right",
];

// ============================================================================
// Identifiers and colors
// ============================================================================

/// Overlay identifier. Generated from the creation time, preserved verbatim
/// across save and load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OverlayId(String);

impl OverlayId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OverlayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OverlayId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Error parsing a `#RRGGBB` color.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid color '{0}', expected #RRGGBB")]
pub struct ColorParseError(pub String);

/// An RGB color written as `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HexColor(pub [u8; 3]);

impl HexColor {
    pub const RED: HexColor = HexColor([0xFF, 0x00, 0x00]);
    pub const GREEN: HexColor = HexColor([0x00, 0xFF, 0x00]);
    pub const BLUE: HexColor = HexColor([0x00, 0x00, 0xFF]);

    pub fn rgb(&self) -> [u8; 3] {
        self.0
    }

    /// RGBA with the given alpha.
    pub fn with_alpha(&self, alpha: u8) -> [u8; 4] {
        let [r, g, b] = self.0;
        [r, g, b, alpha]
    }
}

impl FromStr for HexColor {
    type Err = ColorParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ColorParseError(s.to_string());
        let hex = s.trim().strip_prefix('#').ok_or_else(err)?;
        if hex.len() != 6 || !hex.is_ascii() {
            return Err(err());
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| err());
        Ok(HexColor([channel(0)?, channel(2)?, channel(4)?]))
    }
}

impl fmt::Display for HexColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [r, g, b] = self.0;
        write!(f, "#{:02X}{:02X}{:02X}", r, g, b)
    }
}

impl Serialize for HexColor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HexColor {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Extra values
// ============================================================================

/// A primitive stored in an overlay's `extra` map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ExtraValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExtraValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value, integers widened.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ExtraValue::Int(i) => Some(*i as f64),
            ExtraValue::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl fmt::Display for ExtraValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtraValue::Bool(b) => write!(f, "{b}"),
            ExtraValue::Int(i) => write!(f, "{i}"),
            ExtraValue::Float(v) => write!(f, "{v}"),
            ExtraValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for ExtraValue {
    fn from(s: &str) -> Self {
        ExtraValue::Text(s.to_string())
    }
}

impl From<String> for ExtraValue {
    fn from(s: String) -> Self {
        ExtraValue::Text(s)
    }
}

impl From<f64> for ExtraValue {
    fn from(v: f64) -> Self {
        ExtraValue::Float(v)
    }
}

impl From<i64> for ExtraValue {
    fn from(v: i64) -> Self {
        ExtraValue::Int(v)
    }
}

impl From<bool> for ExtraValue {
    fn from(v: bool) -> Self {
        ExtraValue::Bool(v)
    }
}

// ============================================================================
// Overlay
// ============================================================================

/// Discriminant of an overlay, also the record `kind` tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverlayKind {
    Note,
    Ruler,
    RegionOfInterest,
}

impl OverlayKind {
    /// Tag written to records.
    pub fn as_str(&self) -> &'static str {
        match self {
            OverlayKind::Note => "Note",
            OverlayKind::Ruler => "Ruler",
            OverlayKind::RegionOfInterest => "RegionOfInterest",
        }
    }

    /// Parse a record tag. `ROI` is accepted for older exports.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "Note" => Some(OverlayKind::Note),
            "Ruler" => Some(OverlayKind::Ruler),
            "RegionOfInterest" | "ROI" => Some(OverlayKind::RegionOfInterest),
            _ => None,
        }
    }

    /// Color used when a new overlay of this kind gets none.
    pub fn default_color(&self) -> HexColor {
        match self {
            OverlayKind::Note => HexColor::GREEN,
            OverlayKind::Ruler => HexColor::RED,
            OverlayKind::RegionOfInterest => HexColor::BLUE,
        }
    }
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind-specific geometry, in image space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayGeometry {
    Note { anchor: Point, text: String },
    Ruler { start: Point, end: Point },
    /// Corners in any order; size is the absolute difference.
    Region { top_left: Point, bottom_right: Point },
}

/// A committed or draft overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub id: OverlayId,
    pub color: HexColor,
    pub geometry: OverlayGeometry,
    extra: BTreeMap<String, ExtraValue>,
}

impl Overlay {
    pub fn new(id: OverlayId, color: HexColor, geometry: OverlayGeometry) -> Self {
        Self {
            id,
            color,
            geometry,
            extra: BTreeMap::new(),
        }
    }

    pub fn note(id: OverlayId, anchor: Point, text: impl Into<String>, color: HexColor) -> Self {
        Self::new(
            id,
            color,
            OverlayGeometry::Note {
                anchor,
                text: text.into(),
            },
        )
    }

    pub fn ruler(id: OverlayId, start: Point, end: Point, color: HexColor) -> Self {
        Self::new(id, color, OverlayGeometry::Ruler { start, end })
    }

    pub fn region(id: OverlayId, top_left: Point, bottom_right: Point, color: HexColor) -> Self {
        Self::new(
            id,
            color,
            OverlayGeometry::Region {
                top_left,
                bottom_right,
            },
        )
    }

    /// Builder form of [`Overlay::set_extra`].
    pub fn with_extra(mut self, key: &str, value: impl Into<ExtraValue>) -> Self {
        self.set_extra(key, value);
        self
    }

    pub fn kind(&self) -> OverlayKind {
        match self.geometry {
            OverlayGeometry::Note { .. } => OverlayKind::Note,
            OverlayGeometry::Ruler { .. } => OverlayKind::Ruler,
            OverlayGeometry::Region { .. } => OverlayKind::RegionOfInterest,
        }
    }

    pub fn extra(&self) -> &BTreeMap<String, ExtraValue> {
        &self.extra
    }

    pub fn get_extra(&self, key: &str) -> Option<&ExtraValue> {
        self.extra.get(key)
    }

    /// Store a primitive under `key`. Keys that collide with record geometry
    /// are refused and `false` is returned.
    pub fn set_extra(&mut self, key: &str, value: impl Into<ExtraValue>) -> bool {
        if RESERVED_KEYS.contains(&key) {
            log::warn!("Ignoring reserved extra key '{}' on overlay {}", key, self.id);
            return false;
        }
        self.extra.insert(key.to_string(), value.into());
        true
    }

    pub fn remove_extra(&mut self, key: &str) -> Option<ExtraValue> {
        self.extra.remove(key)
    }

    /// Free-text note, if any.
    pub fn note_text(&self) -> Option<&str> {
        self.extra.get(EXTRA_NOTE).and_then(ExtraValue::as_str)
    }

    /// Set or clear the note. An empty string clears it.
    pub fn set_note(&mut self, note: &str) {
        if note.is_empty() {
            self.extra.remove(EXTRA_NOTE);
        } else {
            self.extra
                .insert(EXTRA_NOTE.to_string(), ExtraValue::from(note));
        }
    }

    /// Replace a note overlay's text. Returns `false` for other kinds.
    pub fn set_text(&mut self, new_text: &str) -> bool {
        match &mut self.geometry {
            OverlayGeometry::Note { text, .. } => {
                *text = new_text.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn set_color(&mut self, color: HexColor) {
        self.color = color;
    }

    /// Ruler length in image pixels.
    pub fn distance(&self) -> Option<f64> {
        match &self.geometry {
            OverlayGeometry::Ruler { start, end } => Some(start.distance_to(end)),
            _ => None,
        }
    }

    /// Region width and height in image pixels.
    pub fn region_size(&self) -> Option<(u32, u32)> {
        match &self.geometry {
            OverlayGeometry::Region {
                top_left,
                bottom_right,
            } => Some((
                top_left.x.abs_diff(bottom_right.x),
                top_left.y.abs_diff(bottom_right.y),
            )),
            _ => None,
        }
    }

    /// Calibrated ruler length and unit, when both are present.
    pub fn calibration(&self) -> Option<(f64, &str)> {
        let value = self.extra.get(EXTRA_CALIBRATED_VALUE)?.as_f64()?;
        let unit = self.extra.get(EXTRA_UNIT)?.as_str()?;
        Some((value, unit))
    }

    /// Move the free endpoint of a draft: ruler end or region bottom-right.
    /// Notes have no free endpoint and are left untouched.
    pub fn set_free_endpoint(&mut self, point: Point) {
        match &mut self.geometry {
            OverlayGeometry::Ruler { end, .. } => *end = point,
            OverlayGeometry::Region { bottom_right, .. } => *bottom_right = point,
            OverlayGeometry::Note { .. } => {}
        }
    }

    /// Row text for an overlay list: (kind, position, details).
    pub fn summary(&self) -> (String, String, String) {
        let (position, details) = match &self.geometry {
            OverlayGeometry::Note { anchor, text } => {
                (format!("({}, {})", anchor.x, anchor.y), text.clone())
            }
            OverlayGeometry::Ruler { start, end } => {
                let mut details = format!("Distance: {:.1}px", start.distance_to(end));
                if let Some(note) = self.note_text() {
                    details.push_str(&format!(" - {note}"));
                }
                (
                    format!("({}, {}) to ({}, {})", start.x, start.y, end.x, end.y),
                    details,
                )
            }
            OverlayGeometry::Region {
                top_left,
                bottom_right,
            } => {
                let w = top_left.x.abs_diff(bottom_right.x);
                let h = top_left.y.abs_diff(bottom_right.y);
                let mut details = format!("Size: {w} × {h}px");
                if let Some(note) = self.note_text() {
                    details.push_str(&format!(" - {note}"));
                }
                (
                    format!(
                        "({}, {}) to ({}, {})",
                        top_left.x, top_left.y, bottom_right.x, bottom_right.y
                    ),
                    details,
                )
            }
        };
        (self.kind().to_string(), position, details)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> OverlayId {
        OverlayId::new("20240101_120000_000")
    }

    #[test]
    fn test_hex_color_parse_and_display() {
        let c: HexColor = "#ff8000".parse().unwrap();
        assert_eq!(c.rgb(), [255, 128, 0]);
        assert_eq!(c.to_string(), "#FF8000");
        assert_eq!("#FF0000".parse::<HexColor>().unwrap(), HexColor::RED);

        assert!("ff0000".parse::<HexColor>().is_err());
        assert!("#ff00".parse::<HexColor>().is_err());
        assert!("#gg0000".parse::<HexColor>().is_err());
        assert!("#ff00é0".parse::<HexColor>().is_err());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(OverlayKind::parse("ROI"), Some(OverlayKind::RegionOfInterest));
        assert_eq!(
            OverlayKind::parse("RegionOfInterest"),
            Some(OverlayKind::RegionOfInterest)
        );
        assert_eq!(OverlayKind::parse("Unknown"), None);
        assert_eq!(OverlayKind::RegionOfInterest.as_str(), "RegionOfInterest");
    }

    #[test]
    fn test_region_size_is_absolute() {
        let roi = Overlay::region(id(), Point::new(50, 40), Point::new(10, 60), HexColor::BLUE);
        assert_eq!(roi.region_size(), Some((40, 20)));
        assert_eq!(roi.distance(), None);
    }

    #[test]
    fn test_note_editing() {
        let mut ruler = Overlay::ruler(id(), Point::new(0, 0), Point::new(3, 4), HexColor::RED);
        assert_eq!(ruler.distance(), Some(5.0));
        assert!(!ruler.set_text("nope"));

        ruler.set_note("baseline");
        assert_eq!(ruler.note_text(), Some("baseline"));
        ruler.set_note("");
        assert_eq!(ruler.note_text(), None);

        let mut note = Overlay::note(id(), Point::new(1, 1), "hello", HexColor::GREEN);
        assert!(note.set_text("changed"));
        assert!(matches!(
            &note.geometry,
            OverlayGeometry::Note { text, .. } if text == "changed"
        ));
    }

    #[test]
    fn test_reserved_extra_keys_refused() {
        let mut note = Overlay::note(id(), Point::new(1, 1), "x", HexColor::GREEN);
        assert!(!note.set_extra("position", "oops"));
        assert!(note.set_extra("severity", 3_i64));
        assert_eq!(note.extra().len(), 1);
    }

    #[test]
    fn test_calibration_requires_value_and_unit() {
        let ruler = Overlay::ruler(id(), Point::new(0, 0), Point::new(10, 0), HexColor::RED)
            .with_extra(EXTRA_CALIBRATED_VALUE, 20.0);
        assert_eq!(ruler.calibration(), None);
        let ruler = ruler.with_extra(EXTRA_UNIT, "ms");
        assert_eq!(ruler.calibration(), Some((20.0, "ms")));
    }

    #[test]
    fn test_summary_rows() {
        let ruler = Overlay::ruler(id(), Point::new(10, 10), Point::new(100, 10), HexColor::RED)
            .with_extra(EXTRA_NOTE, "baseline");
        let (kind, position, details) = ruler.summary();
        assert_eq!(kind, "Ruler");
        assert_eq!(position, "(10, 10) to (100, 10)");
        assert_eq!(details, "Distance: 90.0px - baseline");

        let roi = Overlay::region(id(), Point::new(10, 10), Point::new(50, 30), HexColor::BLUE);
        assert_eq!(roi.summary().2, "Size: 40 × 20px");
    }
}
