//! Zoom state and viewport coordinate mapping.
//!
//! Image space is the pixel grid of the unscaled source buffer. Device space is
//! the pointer's view of the zoomed, scrolled bitmap. Both directions use
//! integer truncation, so a point that goes image → device → image → device
//! never moves by more than one device pixel, and at 100% or more the image
//! point itself survives unchanged.

use serde::{Deserialize, Serialize};

/// Smallest allowed zoom, in percent.
pub const MIN_ZOOM_PERCENT: u32 = 10;

/// Largest allowed zoom, in percent.
pub const MAX_ZOOM_PERCENT: u32 = 400;

/// Step applied by zoom in/out actions.
pub const ZOOM_STEP_PERCENT: u32 = 10;

/// Zoom restored by [`ZoomState::reset`].
pub const DEFAULT_ZOOM_PERCENT: u32 = 100;

// ============================================================================
// Points and sizes
// ============================================================================

/// A pixel position in the unscaled source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

impl Point {
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point, in image pixels.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = f64::from(self.x) - f64::from(other.x);
        let dy = f64::from(self.y) - f64::from(other.y);
        dx.hypot(dy)
    }
}

impl From<(u32, u32)> for Point {
    fn from((x, y): (u32, u32)) -> Self {
        Self::new(x, y)
    }
}

/// A position in device pixels. May be negative when the pointer is left of
/// or above the rendered bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DevicePoint {
    pub x: i32,
    pub y: i32,
}

impl DevicePoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Offset this point by another one.
    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.y.saturating_add(dy))
    }
}

/// Dimensions of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Size of an `image` buffer.
    pub fn of<P: image::Pixel, C>(image: &image::ImageBuffer<P, C>) -> Self
    where
        C: std::ops::Deref<Target = [P::Subpixel]>,
    {
        Self::new(image.width(), image.height())
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Check whether `point` lies inside `[0, width) x [0, height)`.
    pub fn contains(&self, point: Point) -> bool {
        point.x < self.width && point.y < self.height
    }
}

// ============================================================================
// Zoom state
// ============================================================================

/// Zoom level plus the viewport's scroll offset.
///
/// The scale is clamped to [`MIN_ZOOM_PERCENT`]..=[`MAX_ZOOM_PERCENT`] on every
/// mutation; scroll offsets never go below zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "StoredZoom")]
pub struct ZoomState {
    scale_percent: u32,
    scroll_x: u32,
    scroll_y: u32,
}

/// Unchecked wire form of [`ZoomState`].
#[derive(Deserialize)]
struct StoredZoom {
    scale_percent: u32,
    #[serde(default)]
    scroll_x: u32,
    #[serde(default)]
    scroll_y: u32,
}

impl From<StoredZoom> for ZoomState {
    fn from(stored: StoredZoom) -> Self {
        if clamp_scale(stored.scale_percent) != stored.scale_percent {
            log::warn!("Stored zoom {}% out of range, clamping", stored.scale_percent);
        }
        ZoomState::new(stored.scale_percent).with_scroll(stored.scroll_x, stored.scroll_y)
    }
}

impl ZoomState {
    /// Create a zoom state at `scale_percent` with no scroll.
    pub fn new(scale_percent: u32) -> Self {
        Self {
            scale_percent: clamp_scale(scale_percent),
            scroll_x: 0,
            scroll_y: 0,
        }
    }

    /// Set the scroll offset.
    pub fn with_scroll(mut self, x: u32, y: u32) -> Self {
        self.scroll_x = x;
        self.scroll_y = y;
        self
    }

    pub fn scale_percent(&self) -> u32 {
        self.scale_percent
    }

    /// Scale as a multiplier (1.0 at 100%).
    pub fn factor(&self) -> f64 {
        f64::from(self.scale_percent) / 100.0
    }

    pub fn scroll(&self) -> (u32, u32) {
        (self.scroll_x, self.scroll_y)
    }

    pub fn set_scale(&mut self, scale_percent: u32) {
        let clamped = clamp_scale(scale_percent);
        if clamped != scale_percent {
            log::debug!("Zoom {}% clamped to {}%", scale_percent, clamped);
        }
        self.scale_percent = clamped;
    }

    pub fn zoom_in(&mut self) {
        self.set_scale(self.scale_percent.saturating_add(ZOOM_STEP_PERCENT));
    }

    pub fn zoom_out(&mut self) {
        self.set_scale(self.scale_percent.saturating_sub(ZOOM_STEP_PERCENT));
    }

    /// Apply a mouse-wheel step: positive zooms in, negative zooms out.
    pub fn zoom_by_wheel(&mut self, delta: i32) {
        match delta.signum() {
            1 => self.zoom_in(),
            -1 => self.zoom_out(),
            _ => {}
        }
    }

    /// Back to 100%. The scroll offset is kept.
    pub fn reset(&mut self) {
        self.scale_percent = DEFAULT_ZOOM_PERCENT;
    }

    pub fn set_scroll(&mut self, x: u32, y: u32) {
        self.scroll_x = x;
        self.scroll_y = y;
    }

    /// Move the scroll offset, saturating at zero.
    pub fn scroll_by(&mut self, dx: i32, dy: i32) {
        self.scroll_x = self.scroll_x.saturating_add_signed(dx);
        self.scroll_y = self.scroll_y.saturating_add_signed(dy);
    }
}

impl Default for ZoomState {
    fn default() -> Self {
        Self::new(DEFAULT_ZOOM_PERCENT)
    }
}

fn clamp_scale(scale_percent: u32) -> u32 {
    scale_percent.clamp(MIN_ZOOM_PERCENT, MAX_ZOOM_PERCENT)
}

// ============================================================================
// Coordinate mapper
// ============================================================================

/// Converts between device positions and image-space points.
///
/// `viewport_origin` is the top-left of the displayed bitmap widget in device
/// coordinates. Only pointer motion inside the rendered bitmap maps to image
/// space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CoordinateMapper {
    viewport_origin: DevicePoint,
}

impl CoordinateMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_origin(origin: DevicePoint) -> Self {
        Self {
            viewport_origin: origin,
        }
    }

    pub fn origin(&self) -> DevicePoint {
        self.viewport_origin
    }

    pub fn set_origin(&mut self, origin: DevicePoint) {
        self.viewport_origin = origin;
    }

    /// Map a device position to an image-space point.
    ///
    /// Returns `None` when the position lies outside the image, including
    /// positions left of or above the bitmap. Callers ignore such events.
    pub fn to_image_space(
        &self,
        device: DevicePoint,
        zoom: &ZoomState,
        size: ImageSize,
    ) -> Option<Point> {
        let (scroll_x, scroll_y) = zoom.scroll();
        let bitmap_x =
            i64::from(device.x) - i64::from(self.viewport_origin.x) + i64::from(scroll_x);
        let bitmap_y =
            i64::from(device.y) - i64::from(self.viewport_origin.y) + i64::from(scroll_y);
        if bitmap_x < 0 || bitmap_y < 0 {
            return None;
        }

        let scale = i64::from(zoom.scale_percent());
        let x = u32::try_from(bitmap_x * 100 / scale).ok()?;
        let y = u32::try_from(bitmap_y * 100 / scale).ok()?;
        let point = Point::new(x, y);
        size.contains(point).then_some(point)
    }

    /// Map an image-space point to its position in the zoomed bitmap.
    ///
    /// The result is relative to the bitmap's top-left, without scroll or
    /// viewport origin. Used for rendering only.
    pub fn to_device_space(point: Point, zoom: &ZoomState) -> DevicePoint {
        DevicePoint::new(
            scale_coordinate(point.x, zoom.scale_percent()),
            scale_coordinate(point.y, zoom.scale_percent()),
        )
    }

    /// Convert a bitmap-relative position to a device position under this
    /// viewport.
    pub fn bitmap_to_device(&self, bitmap: DevicePoint, zoom: &ZoomState) -> DevicePoint {
        let (scroll_x, scroll_y) = zoom.scroll();
        bitmap
            .offset(self.viewport_origin.x, self.viewport_origin.y)
            .offset(-clamp_i32(scroll_x), -clamp_i32(scroll_y))
    }

    /// Size of the rendered bitmap at the given zoom. Never smaller than 1x1.
    pub fn scaled_size(size: ImageSize, zoom: &ZoomState) -> ImageSize {
        let scale = u64::from(zoom.scale_percent());
        let scale_dim = |v: u32| {
            let scaled = u64::from(v) * scale / 100;
            u32::try_from(scaled).unwrap_or(u32::MAX).max(1)
        };
        ImageSize::new(scale_dim(size.width), scale_dim(size.height))
    }
}

fn scale_coordinate(v: u32, scale_percent: u32) -> i32 {
    let scaled = u64::from(v) * u64::from(scale_percent) / 100;
    i32::try_from(scaled).unwrap_or(i32::MAX)
}

fn clamp_i32(v: u32) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}
