//! Typed annotation log.
//!
//! Older sessions recorded typed events and measurements (seizures,
//! artifacts, amplitudes, ...) separately from the spatial overlays. They are
//! still loaded, listed, summarized and drawn.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::overlay::{HexColor, LineStyle, OverlaySurface};
use crate::store::IdGenerator;
use crate::zoom::{CoordinateMapper, Point, ZoomState};

/// Types drawn as event markers.
pub const EVENT_TYPES: &[&str] = &["Seizure", "Artifact", "Normal", "Abnormal"];

/// Types drawn as measurement markers and counted in statistics.
pub const MEASUREMENT_TYPES: &[&str] = &["Amplitude", "Frequency", "Duration", "Latency"];

/// Marker color when the annotation carries none.
pub const DEFAULT_MARKER_COLOR: HexColor = HexColor::RED;

const EVENT_RADIUS: f32 = 8.0;
const GENERIC_RADIUS: f32 = 6.0;
const MEASUREMENT_HALF_SIZE: i32 = 5;
const LABEL_OFFSET: (i32, i32) = (12, 4);
const MARKER_STROKE: f32 = 2.0;

/// How an annotation type is drawn and counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationClass {
    Event,
    Measurement,
    Generic,
}

impl AnnotationClass {
    pub fn of(annotation_type: &str) -> Self {
        if EVENT_TYPES.contains(&annotation_type) {
            AnnotationClass::Event
        } else if MEASUREMENT_TYPES.contains(&annotation_type) {
            AnnotationClass::Measurement
        } else {
            AnnotationClass::Generic
        }
    }
}

/// Position as stored on disk: `{"x": .., "y": ..}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerPosition {
    pub x: u32,
    pub y: u32,
}

impl From<Point> for MarkerPosition {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<MarkerPosition> for Point {
    fn from(p: MarkerPosition) -> Self {
        Point::new(p.x, p.y)
    }
}

/// One typed annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    #[serde(rename = "type")]
    pub annotation_type: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<MarkerPosition>,
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

impl AnnotationRecord {
    pub fn new(annotation_type: impl Into<String>, position: Option<Point>) -> Self {
        Self {
            annotation_type: annotation_type.into(),
            id: String::new(),
            data: Map::new(),
            position: position.map(MarkerPosition::from),
        }
    }

    pub fn with_data(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn class(&self) -> AnnotationClass {
        AnnotationClass::of(&self.annotation_type)
    }

    /// Marker color from `data.color`, red when absent or unparsable.
    pub fn color(&self) -> HexColor {
        self.data
            .get("color")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_MARKER_COLOR)
    }

    /// Numeric `value` for statistics. Absent counts as zero; text that is
    /// not a number does not count.
    pub fn numeric_value(&self) -> Option<f64> {
        match self.data.get("value") {
            None | Some(Value::Null) => Some(0.0),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            Some(_) => None,
        }
    }

    /// Table row: type, time, position, value, description, channel.
    pub fn row(&self) -> [String; 6] {
        let time = match self.data.get("timestamp") {
            None | Some(Value::Null) => "Unknown".to_string(),
            v => value_text(v),
        };
        let position = self
            .position
            .map_or_else(|| "N/A".to_string(), |p| format!("({}, {})", p.x, p.y));
        let value = value_text(self.data.get("value"));
        let value = if value.is_empty() {
            value
        } else {
            format!("{} {}", value, value_text(self.data.get("unit")))
        };
        [
            self.annotation_type.clone(),
            time,
            position,
            value,
            value_text(self.data.get("description")),
            value_text(self.data.get("channel")),
        ]
    }

    /// Draw the marker at the current zoom. Records without a position draw
    /// nothing.
    pub fn render(&self, surface: &mut dyn OverlaySurface, zoom: &ZoomState) {
        let Some(position) = self.position else {
            return;
        };
        let at = CoordinateMapper::to_device_space(position.into(), zoom);
        let color = self.color();
        let label_at = at.offset(LABEL_OFFSET.0, LABEL_OFFSET.1);
        let size = crate::overlay::label_size(zoom);

        match self.class() {
            AnnotationClass::Event => {
                surface.circle(at, EVENT_RADIUS, color);
                let tag: String = self.annotation_type.chars().take(3).collect();
                surface.text(label_at, &tag, size, color);
            }
            AnnotationClass::Measurement => {
                let h = MEASUREMENT_HALF_SIZE;
                surface.rect(
                    at.offset(-h, -h),
                    at.offset(h, h),
                    LineStyle::solid(color, MARKER_STROKE),
                    None,
                );
                let text = format!(
                    "{}{}",
                    value_text(self.data.get("value")),
                    value_text(self.data.get("unit"))
                );
                surface.text(label_at, &text, size, color);
            }
            AnnotationClass::Generic => surface.circle(at, GENERIC_RADIUS, color),
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Summary figures over a log.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationStats {
    pub total: usize,
    /// Count per type, in order of first appearance
    pub by_type: Vec<(String, usize)>,
    /// Numeric values of measurement annotations
    pub measurements: Vec<f64>,
}

impl AnnotationStats {
    pub fn average(&self) -> Option<f64> {
        if self.measurements.is_empty() {
            return None;
        }
        Some(self.measurements.iter().sum::<f64>() / self.measurements.len() as f64)
    }

    pub fn min(&self) -> Option<f64> {
        self.measurements.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.measurements.iter().copied().reduce(f64::max)
    }

    /// Multi-line text shown in the statistics panel.
    pub fn to_text(&self) -> String {
        let mut text = format!("Total Annotations: {}\n\nBy Type:\n", self.total);
        for (annotation_type, count) in &self.by_type {
            text.push_str(&format!("  {annotation_type}: {count}\n"));
        }
        if let (Some(avg), Some(min), Some(max)) = (self.average(), self.min(), self.max()) {
            text.push_str("\nMeasurement Statistics:\n");
            text.push_str(&format!("  Count: {}\n", self.measurements.len()));
            text.push_str(&format!("  Average: {avg:.2}\n"));
            text.push_str(&format!("  Min: {min:.2}\n"));
            text.push_str(&format!("  Max: {max:.2}\n"));
        }
        text
    }
}

// ============================================================================
// Log
// ============================================================================

/// Ordered list of typed annotations.
#[derive(Debug, Clone, Default)]
pub struct AnnotationLog {
    records: Vec<AnnotationRecord>,
    ids: IdGenerator,
}

impl AnnotationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AnnotationRecord] {
        &self.records
    }

    /// Append, assigning a timestamp id when the record has none.
    pub fn add(&mut self, mut record: AnnotationRecord) -> usize {
        if record.id.is_empty() {
            let (_, id) = self.ids.next_at(chrono::Local::now().naive_local());
            record.id = id.to_string();
        }
        log::debug!("Logged {} annotation {}", record.annotation_type, record.id);
        self.records.push(record);
        self.records.len() - 1
    }

    /// Remove the record at `index`, if present.
    pub fn remove(&mut self, index: usize) -> Option<AnnotationRecord> {
        (index < self.records.len()).then(|| self.records.remove(index))
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn stats(&self) -> AnnotationStats {
        let mut stats = AnnotationStats {
            total: self.records.len(),
            ..Default::default()
        };
        for record in &self.records {
            match stats
                .by_type
                .iter_mut()
                .find(|(t, _)| *t == record.annotation_type)
            {
                Some((_, count)) => *count += 1,
                None => stats.by_type.push((record.annotation_type.clone(), 1)),
            }
            if record.class() == AnnotationClass::Measurement {
                if let Some(v) = record.numeric_value() {
                    stats.measurements.push(v);
                }
            }
        }
        stats
    }

    pub fn render(&self, surface: &mut dyn OverlaySurface, zoom: &ZoomState) {
        for record in &self.records {
            record.render(surface, zoom);
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Array(
            self.records
                .iter()
                .filter_map(|r| serde_json::to_value(r).ok())
                .collect(),
        )
    }

    /// Load from a JSON array, skipping entries that are not annotations.
    pub fn from_value(value: &Value) -> AnnotationLog {
        let mut annotations = AnnotationLog::new();
        let Some(items) = value.as_array() else {
            log::warn!("Saved annotations are not a list, ignoring them");
            return annotations;
        };
        for (i, item) in items.iter().enumerate() {
            match serde_json::from_value::<AnnotationRecord>(item.clone()) {
                Ok(record) => {
                    annotations.add(record);
                }
                Err(e) => log::warn!("Skipping saved annotation #{}: {}", i, e),
            }
        }
        annotations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{DrawCommand, DrawList};
    use crate::zoom::DevicePoint;
    use serde_json::json;

    fn sample_log() -> AnnotationLog {
        let mut log = AnnotationLog::new();
        log.add(AnnotationRecord::new("Seizure", Some(Point::new(10, 20))));
        log.add(
            AnnotationRecord::new("Amplitude", Some(Point::new(40, 40)))
                .with_data("value", 12.5)
                .with_data("unit", "μV")
                .with_data("color", "#00ff00"),
        );
        log.add(AnnotationRecord::new("Amplitude", None).with_data("value", "7.5"));
        log.add(AnnotationRecord::new("Latency", None).with_data("value", "n/a"));
        log.add(AnnotationRecord::new("Comment", Some(Point::new(1, 1))));
        log
    }

    #[test]
    fn test_classes() {
        assert_eq!(AnnotationClass::of("Artifact"), AnnotationClass::Event);
        assert_eq!(AnnotationClass::of("Duration"), AnnotationClass::Measurement);
        assert_eq!(AnnotationClass::of("Other"), AnnotationClass::Generic);
    }

    #[test]
    fn test_stats_text() {
        let stats = sample_log().stats();
        assert_eq!(stats.total, 5);
        assert_eq!(stats.measurements, vec![12.5, 7.5]);
        assert_eq!(
            stats.to_text(),
            "Total Annotations: 5\n\nBy Type:\n  Seizure: 1\n  Amplitude: 2\n  Latency: 1\n  \
             Comment: 1\n\nMeasurement Statistics:\n  Count: 2\n  Average: 10.00\n  \
             Min: 7.50\n  Max: 12.50\n"
        );
    }

    #[test]
    fn test_rows() {
        let log = sample_log();
        let row = log.records()[1].row();
        assert_eq!(row[0], "Amplitude");
        assert_eq!(row[1], "Unknown");
        assert_eq!(row[2], "(40, 40)");
        assert_eq!(row[3], "12.5 μV");
        assert_eq!(log.records()[2].row()[2], "N/A");
    }

    #[test]
    fn test_markers() {
        let log = sample_log();
        let mut list = DrawList::new();
        log.render(&mut list, &ZoomState::new(200));

        assert_eq!(
            list.commands[0],
            DrawCommand::Circle {
                center: DevicePoint::new(20, 40),
                radius: EVENT_RADIUS,
                color: HexColor::RED,
            }
        );
        assert!(matches!(
            &list.commands[2],
            DrawCommand::Rect { a, b, fill: None, .. }
                if *a == DevicePoint::new(75, 75) && *b == DevicePoint::new(85, 85)
        ));
        assert_eq!(list.labels(), vec!["Sei", "12.5μV"]);
        assert!(matches!(
            list.commands.last(),
            Some(DrawCommand::Circle { radius, .. }) if *radius == GENERIC_RADIUS
        ));
    }

    #[test]
    fn test_load_keeps_ids_and_skips_garbage() {
        let value = json!([
            {"type": "Artifact", "id": "20230101_000000_000", "data": {}, "position": {"x": 3, "y": 4}},
            {"type": "Amplitude", "data": {"value": 3}},
            {"id": "missing-type"},
        ]);
        let log = AnnotationLog::from_value(&value);
        assert_eq!(log.len(), 2);
        assert_eq!(log.records()[0].id, "20230101_000000_000");
        assert_eq!(log.records()[0].position, Some(MarkerPosition { x: 3, y: 4 }));
        assert!(!log.records()[1].id.is_empty());

        let back = AnnotationLog::from_value(&log.to_value());
        assert_eq!(back.records(), log.records());
    }
}
