//! Rasterizing overlays onto a frame with tiny-skia.
//!
//! tiny-skia has no font engine, so text primitives are collected and handed
//! back to the host, which paints them with whatever text stack it has.

use image::{Rgb, RgbImage};
use tiny_skia::{
    FillRule, IntSize, LineCap, LineJoin, Paint, Path, PathBuilder, Pixmap, Stroke, StrokeDash,
    Transform,
};

use super::render::{LineStyle, OverlaySurface};
use super::HexColor;
use crate::zoom::DevicePoint;

/// Dash pattern for dashed strokes, in device pixels.
const DASH_PATTERN: [f32; 2] = [6.0, 4.0];

/// A text label waiting for the host to paint it.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLabel {
    pub at: DevicePoint,
    pub text: String,
    pub size: f32,
    pub color: HexColor,
}

/// Pixmap-backed surface over an opaque RGB frame.
pub struct RasterSurface {
    pixmap: Pixmap,
    labels: Vec<PendingLabel>,
}

impl RasterSurface {
    /// Wrap a frame. Returns `None` for a zero-sized frame.
    pub fn from_rgb(frame: &RgbImage) -> Option<Self> {
        let size = IntSize::from_wh(frame.width(), frame.height())?;
        let mut data = Vec::with_capacity(frame.as_raw().len() / 3 * 4);
        for px in frame.pixels() {
            let [r, g, b] = px.0;
            data.extend_from_slice(&[r, g, b, 255]);
        }
        let pixmap = Pixmap::from_vec(data, size)?;
        Some(Self {
            pixmap,
            labels: Vec::new(),
        })
    }

    /// Labels collected so far.
    pub fn labels(&self) -> &[PendingLabel] {
        &self.labels
    }

    /// Back to an RGB frame plus the labels the host still has to paint.
    pub fn finish(self) -> (RgbImage, Vec<PendingLabel>) {
        let (w, h) = (self.pixmap.width(), self.pixmap.height());
        let data = self.pixmap.data();
        // The frame stays opaque, so premultiplied values equal straight ones.
        let frame = RgbImage::from_fn(w, h, |x, y| {
            let i = (y as usize * w as usize + x as usize) * 4;
            Rgb([data[i], data[i + 1], data[i + 2]])
        });
        (frame, self.labels)
    }

    fn paint(rgba: [u8; 4]) -> Paint<'static> {
        let mut paint = Paint::default();
        let [r, g, b, a] = rgba;
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;
        paint
    }

    fn stroke(style: &LineStyle) -> Stroke {
        Stroke {
            width: style.width,
            line_cap: LineCap::Butt,
            line_join: LineJoin::Miter,
            dash: if style.dashed {
                StrokeDash::new(DASH_PATTERN.to_vec(), 0.0)
            } else {
                None
            },
            ..Default::default()
        }
    }

    fn stroke_path(&mut self, path: &Path, style: &LineStyle) {
        let paint = Self::paint(style.color.with_alpha(255));
        self.pixmap
            .stroke_path(path, &paint, &Self::stroke(style), Transform::identity(), None);
    }
}

fn pt(p: DevicePoint) -> (f32, f32) {
    (p.x as f32, p.y as f32)
}

impl OverlaySurface for RasterSurface {
    fn line(&mut self, from: DevicePoint, to: DevicePoint, style: LineStyle) {
        let mut pb = PathBuilder::new();
        let (x0, y0) = pt(from);
        let (x1, y1) = pt(to);
        pb.move_to(x0, y0);
        pb.line_to(x1, y1);
        let Some(path) = pb.finish() else {
            return;
        };
        self.stroke_path(&path, &style);
    }

    fn circle(&mut self, center: DevicePoint, radius: f32, color: HexColor) {
        let (cx, cy) = pt(center);
        let Some(path) = PathBuilder::from_circle(cx, cy, radius) else {
            return;
        };
        let paint = Self::paint(color.with_alpha(255));
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    fn rect(&mut self, a: DevicePoint, b: DevicePoint, stroke: LineStyle, fill: Option<[u8; 4]>) {
        let (x0, y0) = pt(a);
        let (x1, y1) = pt(b);
        let mut pb = PathBuilder::new();
        pb.move_to(x0, y0);
        pb.line_to(x1, y0);
        pb.line_to(x1, y1);
        pb.line_to(x0, y1);
        pb.close();
        let Some(path) = pb.finish() else {
            return;
        };

        if let Some(rgba) = fill {
            let paint = Self::paint(rgba);
            self.pixmap
                .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
        self.stroke_path(&path, &stroke);
    }

    fn text(&mut self, at: DevicePoint, text: &str, size: f32, color: HexColor) {
        self.labels.push(PendingLabel {
            at,
            text: text.to_string(),
            size,
            color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{Overlay, OverlayId};
    use crate::zoom::{Point, ZoomState};

    #[test]
    fn test_plain_frame_round_trips() {
        let frame = RgbImage::from_fn(6, 4, |x, y| Rgb([x as u8 * 10, y as u8 * 20, 99]));
        let surface = RasterSurface::from_rgb(&frame).unwrap();
        let (back, labels) = surface.finish();
        assert_eq!(back, frame);
        assert!(labels.is_empty());
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert!(RasterSurface::from_rgb(&RgbImage::new(0, 3)).is_none());
    }

    #[test]
    fn test_note_marker_is_painted_and_label_collected() {
        let frame = RgbImage::from_pixel(40, 40, Rgb([0, 0, 0]));
        let mut surface = RasterSurface::from_rgb(&frame).unwrap();
        let note = Overlay::note(OverlayId::new("n"), Point::new(20, 20), "mark", HexColor::GREEN);
        note.render(&mut surface, &ZoomState::default());

        let (out, labels) = surface.finish();
        assert_eq!(out.get_pixel(20, 20).0, [0, 255, 0]);
        assert_eq!(out.get_pixel(2, 2).0, [0, 0, 0]);
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].text, "mark");
        assert_eq!(labels[0].at, DevicePoint::new(28, 28));
    }

    #[test]
    fn test_region_fill_is_translucent() {
        let frame = RgbImage::from_pixel(60, 60, Rgb([0, 0, 0]));
        let mut surface = RasterSurface::from_rgb(&frame).unwrap();
        let roi = Overlay::region(
            OverlayId::new("r"),
            Point::new(10, 10),
            Point::new(50, 50),
            HexColor::BLUE,
        );
        roi.render(&mut surface, &ZoomState::default());

        let (out, _) = surface.finish();
        let inside = out.get_pixel(30, 30).0;
        assert_eq!(inside[0], 0);
        assert!(inside[2] > 0 && inside[2] < 64, "fill was {inside:?}");
    }
}
