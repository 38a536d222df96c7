//! Measurement calibration.
//!
//! [`Calibration`] converts ruler lengths into physical units. [`GridCalibration`]
//! describes the tick spacing of the measurement grid overlay.

use serde::{Deserialize, Serialize};

use crate::zoom::Point;

/// Smallest accepted calibration factor.
pub const MIN_FACTOR: f64 = 0.1;

/// Largest accepted calibration factor.
pub const MAX_FACTOR: f64 = 1000.0;

/// Unit used when none is configured.
pub const DEFAULT_UNIT: &str = "μV";

fn default_factor() -> f64 {
    1.0
}

fn default_unit() -> String {
    DEFAULT_UNIT.to_string()
}

/// Pixel-to-unit factor applied to ruler lengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default = "default_factor")]
    factor: f64,
    #[serde(default = "default_unit")]
    unit: String,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            factor: default_factor(),
            unit: default_unit(),
        }
    }
}

impl Calibration {
    /// New calibration, with the factor clamped to the accepted range.
    pub fn new(factor: f64, unit: impl Into<String>) -> Self {
        let mut cal = Self {
            factor: default_factor(),
            unit: unit.into(),
        };
        cal.set_factor(factor);
        cal
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Set the factor. Non-finite values are ignored; others are clamped.
    pub fn set_factor(&mut self, factor: f64) {
        if !factor.is_finite() {
            log::warn!("Ignoring non-finite calibration factor");
            return;
        }
        let clamped = factor.clamp(MIN_FACTOR, MAX_FACTOR);
        if clamped != factor {
            log::debug!("Calibration factor {} clamped to {}", factor, clamped);
        }
        self.factor = clamped;
    }

    pub fn set_unit(&mut self, unit: impl Into<String>) {
        self.unit = unit.into();
    }

    /// Euclidean distance in image pixels.
    pub fn distance(start: Point, end: Point) -> f64 {
        start.distance_to(&end)
    }

    /// Distance converted to the calibrated unit.
    pub fn calibrated_value(&self, start: Point, end: Point) -> f64 {
        Self::distance(start, end) * self.factor
    }

    /// Display text: plain pixels for distances, calibrated value otherwise.
    pub fn measurement_text(&self, start: Point, end: Point, calibrated: bool) -> String {
        if calibrated {
            format!("{:.2} {}", self.calibrated_value(start, end), self.unit)
        } else {
            format!("{:.1} px", Self::distance(start, end))
        }
    }
}

// ============================================================================
// Grid calibration
// ============================================================================

/// One axis of the measurement grid: `pixels` per tick worth `value` `unit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxis {
    pub pixels: u32,
    pub value: f64,
    pub unit: String,
}

impl GridAxis {
    pub fn new(pixels: u32, value: f64, unit: impl Into<String>) -> Self {
        Self {
            pixels: pixels.max(1),
            value,
            unit: unit.into(),
        }
    }

    /// Value spanned by `length` pixels.
    pub fn value_of(&self, length: u32) -> f64 {
        f64::from(length) / f64::from(self.pixels.max(1)) * self.value
    }

    /// Interior grid line offsets for a span of `length` pixels.
    pub fn line_offsets(&self, length: u32) -> Vec<u32> {
        let step = self.pixels.max(1);
        (1..length / step).map(|i| i * step).collect()
    }
}

/// Tick spacing of the measurement grid on both axes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCalibration {
    pub x: GridAxis,
    pub y: GridAxis,
}

impl Default for GridCalibration {
    fn default() -> Self {
        Self {
            x: GridAxis::new(50, 100.0, "ms"),
            y: GridAxis::new(50, 50.0, "µV"),
        }
    }
}

impl GridCalibration {
    /// Smallest grid size: two ticks on each axis.
    pub fn min_size(&self) -> (u32, u32) {
        (self.x.pixels * 2, self.y.pixels * 2)
    }

    /// Clamp a requested grid size to [`GridCalibration::min_size`].
    pub fn constrain_size(&self, width: u32, height: u32) -> (u32, u32) {
        let (min_w, min_h) = self.min_size();
        (width.max(min_w), height.max(min_h))
    }

    /// Width and height readouts, e.g. `"W: 200.0 ms"`.
    pub fn readout(&self, width: u32, height: u32) -> (String, String) {
        (
            format!("W: {:.1} {}", self.x.value_of(width), self.x.unit),
            format!("H: {:.1} {}", self.y.value_of(height), self.y.unit),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_calibration() {
        let cal = Calibration::default();
        assert_eq!(cal.factor(), 1.0);
        assert_eq!(cal.unit(), "μV");
    }

    #[test]
    fn test_factor_clamped() {
        let mut cal = Calibration::new(5000.0, "ms");
        assert_eq!(cal.factor(), MAX_FACTOR);
        cal.set_factor(0.0);
        assert_eq!(cal.factor(), MIN_FACTOR);
        cal.set_factor(f64::NAN);
        assert_eq!(cal.factor(), MIN_FACTOR);
    }

    #[test]
    fn test_measurement_text() {
        let cal = Calibration::new(2.0, "ms");
        let (a, b) = (Point::new(0, 0), Point::new(30, 40));
        assert_eq!(cal.calibrated_value(a, b), 100.0);
        assert_eq!(cal.measurement_text(a, b, false), "50.0 px");
        assert_eq!(cal.measurement_text(a, b, true), "100.00 ms");
    }

    #[test]
    fn test_grid_readout() {
        let grid = GridCalibration::default();
        let (w, h) = grid.readout(100, 125);
        assert_eq!(w, "W: 200.0 ms");
        assert_eq!(h, "H: 125.0 µV");
    }

    #[test]
    fn test_grid_lines_and_min_size() {
        let grid = GridCalibration::default();
        assert_eq!(grid.x.line_offsets(170), vec![50, 100]);
        assert_eq!(grid.x.line_offsets(200), vec![50, 100, 150]);
        assert_eq!(grid.x.line_offsets(100), vec![50]);
        assert_eq!(grid.constrain_size(20, 300), (100, 300));
    }

    #[test]
    fn test_calibration_serde_defaults() {
        let cal: Calibration = serde_json::from_str("{}").unwrap();
        assert_eq!(cal, Calibration::default());
    }
}
