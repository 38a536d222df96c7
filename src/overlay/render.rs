//! Drawing overlays onto a target surface.
//!
//! Positions are recomputed from image space on every call, so a zoom change
//! only needs a re-render. Label text shrinks as zoom grows to keep labels
//! proportionate to the image.

use super::{HexColor, Overlay, OverlayGeometry};
use crate::zoom::{CoordinateMapper, DevicePoint, ZoomState};

/// Label size at 100% zoom.
pub const BASE_LABEL_SIZE: f32 = 10.0;

/// Radius of endpoint and corner markers.
pub const MARKER_RADIUS: f32 = 4.0;

/// Outline width for rulers and regions.
pub const STROKE_WIDTH: f32 = 2.0;

/// Alpha of the region fill.
pub const REGION_FILL_ALPHA: u8 = 0x20;

/// Offset of a note's text from its anchor.
pub const NOTE_TEXT_OFFSET: (i32, i32) = (8, 8);

/// Stroke parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStyle {
    pub color: HexColor,
    pub width: f32,
    pub dashed: bool,
}

impl LineStyle {
    pub fn solid(color: HexColor, width: f32) -> Self {
        Self {
            color,
            width,
            dashed: false,
        }
    }

    pub fn dashed(color: HexColor, width: f32) -> Self {
        Self {
            color,
            width,
            dashed: true,
        }
    }
}

/// A drawing target in device (bitmap) coordinates.
pub trait OverlaySurface {
    fn line(&mut self, from: DevicePoint, to: DevicePoint, style: LineStyle);

    /// Filled circle with an outline in the same color.
    fn circle(&mut self, center: DevicePoint, radius: f32, color: HexColor);

    /// Rectangle between two corners, with an optional RGBA fill.
    fn rect(&mut self, a: DevicePoint, b: DevicePoint, stroke: LineStyle, fill: Option<[u8; 4]>);

    fn text(&mut self, at: DevicePoint, text: &str, size: f32, color: HexColor);
}

/// A recorded drawing primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Line {
        from: DevicePoint,
        to: DevicePoint,
        style: LineStyle,
    },
    Circle {
        center: DevicePoint,
        radius: f32,
        color: HexColor,
    },
    Rect {
        a: DevicePoint,
        b: DevicePoint,
        stroke: LineStyle,
        fill: Option<[u8; 4]>,
    },
    Text {
        at: DevicePoint,
        text: String,
        size: f32,
        color: HexColor,
    },
}

/// Surface that records every primitive, for hosts that paint themselves.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrawList {
    pub commands: Vec<DrawCommand>,
}

impl DrawList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text of every label, in drawing order.
    pub fn labels(&self) -> Vec<&str> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl OverlaySurface for DrawList {
    fn line(&mut self, from: DevicePoint, to: DevicePoint, style: LineStyle) {
        self.commands.push(DrawCommand::Line { from, to, style });
    }

    fn circle(&mut self, center: DevicePoint, radius: f32, color: HexColor) {
        self.commands.push(DrawCommand::Circle {
            center,
            radius,
            color,
        });
    }

    fn rect(&mut self, a: DevicePoint, b: DevicePoint, stroke: LineStyle, fill: Option<[u8; 4]>) {
        self.commands.push(DrawCommand::Rect { a, b, stroke, fill });
    }

    fn text(&mut self, at: DevicePoint, text: &str, size: f32, color: HexColor) {
        self.commands.push(DrawCommand::Text {
            at,
            text: text.to_string(),
            size,
            color,
        });
    }
}

/// Label size for the current zoom, never below 1.
pub fn label_size(zoom: &ZoomState) -> f32 {
    (BASE_LABEL_SIZE / zoom.factor() as f32).max(1.0)
}

fn midpoint(a: DevicePoint, b: DevicePoint) -> DevicePoint {
    let mid = |p: i32, q: i32| ((f64::from(p) + f64::from(q)) / 2.0).round() as i32;
    DevicePoint::new(mid(a.x, b.x), mid(a.y, b.y))
}

impl Overlay {
    /// Label drawn next to the overlay.
    pub fn label(&self) -> String {
        match &self.geometry {
            OverlayGeometry::Note { text, .. } => text.clone(),
            OverlayGeometry::Ruler { start, end } => {
                let mut label = format!("{:.1}px", start.distance_to(end));
                if let Some((value, unit)) = self.calibration() {
                    label.push_str(&format!(" / {value:.2} {unit}"));
                }
                if let Some(note) = self.note_text() {
                    label.push_str(&format!(" ({note})"));
                }
                label
            }
            OverlayGeometry::Region { .. } => {
                let (w, h) = self.region_size().unwrap_or_default();
                let mut label = format!("{w} × {h}px");
                if let Some(note) = self.note_text() {
                    label.push_str(&format!(" - {note}"));
                }
                label
            }
        }
    }

    /// Draw onto `surface` at the given zoom.
    pub fn render(&self, surface: &mut dyn OverlaySurface, zoom: &ZoomState) {
        let to_device = |p| CoordinateMapper::to_device_space(p, zoom);
        let size = label_size(zoom);
        let color = self.color;

        match &self.geometry {
            OverlayGeometry::Note { anchor, text } => {
                let at = to_device(*anchor);
                surface.circle(at, MARKER_RADIUS, color);
                surface.text(
                    at.offset(NOTE_TEXT_OFFSET.0, NOTE_TEXT_OFFSET.1),
                    text,
                    size,
                    color,
                );
            }
            OverlayGeometry::Ruler { start, end } => {
                let (s, e) = (to_device(*start), to_device(*end));
                surface.line(s, e, LineStyle::dashed(color, STROKE_WIDTH));
                surface.circle(s, MARKER_RADIUS, color);
                surface.circle(e, MARKER_RADIUS, color);
                surface.text(midpoint(s, e), &self.label(), size, color);
            }
            OverlayGeometry::Region {
                top_left,
                bottom_right,
            } => {
                let (tl, br) = (to_device(*top_left), to_device(*bottom_right));
                surface.rect(
                    tl,
                    br,
                    LineStyle::solid(color, STROKE_WIDTH),
                    Some(color.with_alpha(REGION_FILL_ALPHA)),
                );
                for corner in [
                    tl,
                    br,
                    DevicePoint::new(br.x, tl.y),
                    DevicePoint::new(tl.x, br.y),
                ] {
                    surface.circle(corner, MARKER_RADIUS, color);
                }
                surface.text(midpoint(tl, br), &self.label(), size, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{EXTRA_CALIBRATED_VALUE, EXTRA_NOTE, EXTRA_UNIT, OverlayId};
    use crate::zoom::Point;

    fn id() -> OverlayId {
        OverlayId::new("t")
    }

    #[test]
    fn test_ruler_label_variants() {
        let ruler = Overlay::ruler(id(), Point::new(0, 0), Point::new(30, 40), HexColor::RED);
        assert_eq!(ruler.label(), "50.0px");

        let ruler = ruler
            .with_extra(EXTRA_CALIBRATED_VALUE, 12.5)
            .with_extra(EXTRA_UNIT, "μV");
        assert_eq!(ruler.label(), "50.0px / 12.50 μV");

        let ruler = ruler.with_extra(EXTRA_NOTE, "peak");
        assert_eq!(ruler.label(), "50.0px / 12.50 μV (peak)");
    }

    #[test]
    fn test_ruler_render_scales_with_zoom() {
        let ruler = Overlay::ruler(id(), Point::new(10, 10), Point::new(100, 10), HexColor::RED);
        let mut list = DrawList::new();
        ruler.render(&mut list, &ZoomState::new(250));

        assert_eq!(
            list.commands[0],
            DrawCommand::Line {
                from: DevicePoint::new(25, 25),
                to: DevicePoint::new(250, 25),
                style: LineStyle::dashed(HexColor::RED, STROKE_WIDTH),
            }
        );
        assert_eq!(
            list.commands.last(),
            Some(&DrawCommand::Text {
                at: DevicePoint::new(138, 25),
                text: "90.0px".to_string(),
                size: 4.0,
                color: HexColor::RED,
            })
        );
    }

    #[test]
    fn test_region_render_has_fill_and_corners() {
        let roi = Overlay::region(id(), Point::new(10, 10), Point::new(50, 30), HexColor::BLUE)
            .with_extra(EXTRA_NOTE, "artifact");
        let mut list = DrawList::new();
        roi.render(&mut list, &ZoomState::default());

        let circles = list
            .commands
            .iter()
            .filter(|c| matches!(c, DrawCommand::Circle { .. }))
            .count();
        assert_eq!(circles, 4);
        assert!(matches!(
            list.commands[0],
            DrawCommand::Rect {
                fill: Some([0, 0, 255, 0x20]),
                ..
            }
        ));
        assert_eq!(list.labels(), vec!["40 × 20px - artifact"]);
    }

    #[test]
    fn test_note_text_offset() {
        let note = Overlay::note(id(), Point::new(20, 20), "spike", HexColor::GREEN);
        let mut list = DrawList::new();
        note.render(&mut list, &ZoomState::new(50));
        assert_eq!(
            list.commands[1],
            DrawCommand::Text {
                at: DevicePoint::new(18, 18),
                text: "spike".to_string(),
                size: 20.0,
                color: HexColor::GREEN,
            }
        );
    }
}
