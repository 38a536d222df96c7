//! Contrast filters and the preview/export render pipeline.
//!
//! A [`FilterPipeline`] turns a raw RGB buffer into the bitmap shown on screen:
//! the selected [`FilterMode`] first, then optional trace enhancement, then a
//! bilinear scale to the current zoom. Export goes through the same
//! [`FilterPipeline::render`] call, so a saved view matches the preview pixel
//! for pixel.

mod clahe;
mod color;
mod morph;

pub use clahe::Clahe;
pub use color::{gray_to_rgb, rgb_to_gray};

use image::RgbImage;
use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::zoom::{CoordinateMapper, ImageSize, ZoomState};

/// Errors from filter application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    /// Input has a zero dimension
    #[error("Cannot filter an empty image ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
}

// ============================================================================
// Filter modes
// ============================================================================

/// Contrast transform applied before display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "u8", from = "u8")]
pub enum FilterMode {
    #[default]
    None,
    /// Local contrast on Lab lightness, then a saturation boost
    EnhancedColor,
    /// Stronger local contrast on lightness plus chroma boost
    HighContrastColor,
    /// Invert brightness while keeping hue
    SmartInvert,
    InvertedGray,
    /// Local contrast on gray
    HCGray,
    InvertedHCGray,
    /// Gray thresholded at 120
    Binary,
}

impl FilterMode {
    /// All modes in index order.
    pub fn all() -> &'static [FilterMode] {
        &[
            FilterMode::None,
            FilterMode::EnhancedColor,
            FilterMode::HighContrastColor,
            FilterMode::SmartInvert,
            FilterMode::InvertedGray,
            FilterMode::HCGray,
            FilterMode::InvertedHCGray,
            FilterMode::Binary,
        ]
    }

    /// Persisted index (0-7).
    pub fn index(self) -> u8 {
        match self {
            FilterMode::None => 0,
            FilterMode::EnhancedColor => 1,
            FilterMode::HighContrastColor => 2,
            FilterMode::SmartInvert => 3,
            FilterMode::InvertedGray => 4,
            FilterMode::HCGray => 5,
            FilterMode::InvertedHCGray => 6,
            FilterMode::Binary => 7,
        }
    }

    /// Mode for a persisted index. Out-of-range values load as `None`.
    pub fn from_index(index: u8) -> Self {
        Self::all()
            .get(usize::from(index))
            .copied()
            .unwrap_or_default()
    }

    /// Next mode in cycling order, wrapping back to `None`.
    pub fn next(self) -> Self {
        Self::from_index((self.index() + 1) % Self::all().len() as u8)
    }

    /// Display label.
    pub fn label(self) -> &'static str {
        match self {
            FilterMode::None => "Normal",
            FilterMode::EnhancedColor => "Enhanced Color",
            FilterMode::HighContrastColor => "High-Con Color",
            FilterMode::SmartInvert => "Smart Invert",
            FilterMode::InvertedGray => "Inverted Gray",
            FilterMode::HCGray => "HC Gray",
            FilterMode::InvertedHCGray => "Inv HC Gray",
            FilterMode::Binary => "Binary",
        }
    }
}

impl From<FilterMode> for u8 {
    fn from(mode: FilterMode) -> Self {
        mode.index()
    }
}

impl From<u8> for FilterMode {
    fn from(index: u8) -> Self {
        FilterMode::from_index(index)
    }
}

impl std::fmt::Display for FilterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Mode parameters
// ============================================================================

const ENHANCED_CLAHE: Clahe = Clahe::new(3.0, (8, 8));
const HIGH_CONTRAST_CLAHE: Clahe = Clahe::new(5.0, (8, 8));
const GRAY_CLAHE: Clahe = Clahe::new(4.0, (8, 8));
const SATURATION_BOOST: f64 = 1.3;
const CHROMA_BOOST: f64 = 1.2;
const BINARY_THRESHOLD: u8 = 120;

/// Apply `mode` to `image`, returning a new buffer. `FilterMode::None` is the
/// identity.
pub fn apply(image: &RgbImage, mode: FilterMode) -> Result<RgbImage, FilterError> {
    ensure_not_empty(image)?;

    let out = match mode {
        FilterMode::None => image.clone(),
        FilterMode::EnhancedColor => {
            let mut lab = color::rgb_to_lab(image);
            ENHANCED_CLAHE.apply(&mut lab.c0, lab.width, lab.height);
            let rgb = color::lab_to_rgb(&lab);
            let mut hsv = color::rgb_to_hsv(&rgb);
            color::scale_channel(&mut hsv.c1, SATURATION_BOOST);
            color::hsv_to_rgb(&hsv)
        }
        FilterMode::HighContrastColor => {
            let mut lab = color::rgb_to_lab(image);
            HIGH_CONTRAST_CLAHE.apply(&mut lab.c0, lab.width, lab.height);
            color::scale_channel(&mut lab.c1, CHROMA_BOOST);
            color::scale_channel(&mut lab.c2, CHROMA_BOOST);
            color::lab_to_rgb(&lab)
        }
        FilterMode::SmartInvert => {
            let mut hsv = color::rgb_to_hsv(image);
            for v in hsv.c2.iter_mut() {
                *v = 255 - *v;
            }
            color::hsv_to_rgb(&hsv)
        }
        FilterMode::InvertedGray => {
            let mut gray = rgb_to_gray(image);
            morph::invert(&mut gray);
            gray_to_rgb(&gray)
        }
        FilterMode::HCGray => {
            let mut gray = rgb_to_gray(image);
            let (w, h) = gray.dimensions();
            GRAY_CLAHE.apply(&mut gray, w, h);
            gray_to_rgb(&gray)
        }
        FilterMode::InvertedHCGray => {
            let mut gray = rgb_to_gray(image);
            let (w, h) = gray.dimensions();
            GRAY_CLAHE.apply(&mut gray, w, h);
            morph::invert(&mut gray);
            gray_to_rgb(&gray)
        }
        FilterMode::Binary => {
            let mut gray = rgb_to_gray(image);
            morph::threshold(&mut gray, BINARY_THRESHOLD, 255);
            gray_to_rgb(&gray)
        }
    };

    Ok(out)
}

/// Thicken thin dark-on-light or light-on-dark lines: gray, 2x2 dilation,
/// back to three channels.
pub fn enhance_traces(image: &RgbImage) -> Result<RgbImage, FilterError> {
    ensure_not_empty(image)?;
    let gray = rgb_to_gray(image);
    Ok(gray_to_rgb(&morph::dilate_2x2(&gray)))
}

fn ensure_not_empty(image: &RgbImage) -> Result<(), FilterError> {
    if ImageSize::of(image).is_empty() {
        return Err(FilterError::EmptyImage {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(())
}

// ============================================================================
// Pipeline
// ============================================================================

/// Filter configuration for a viewer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterPipeline {
    /// Selected contrast mode
    pub mode: FilterMode,
    /// Master switch; when off the mode is not applied
    pub enabled: bool,
    /// Dilate thin lines after the mode
    pub trace_enhancement: bool,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_trace_enhancement(mut self, trace: bool) -> Self {
        self.trace_enhancement = trace;
        self
    }

    /// The mode that actually applies, given the enable flag.
    pub fn effective_mode(&self) -> FilterMode {
        if self.enabled {
            self.mode
        } else {
            FilterMode::None
        }
    }

    /// Mode first, then trace enhancement. Never reversed.
    pub fn apply(&self, image: &RgbImage) -> Result<RgbImage, FilterError> {
        let filtered = apply(image, self.effective_mode())?;
        if self.trace_enhancement {
            enhance_traces(&filtered)
        } else {
            Ok(filtered)
        }
    }

    /// Filter, then scale to the zoomed bitmap size.
    pub fn render(&self, image: &RgbImage, zoom: &ZoomState) -> Result<RgbImage, FilterError> {
        let filtered = self.apply(image)?;
        let target = CoordinateMapper::scaled_size(ImageSize::of(&filtered), zoom);
        log::trace!(
            "Rendering {}x{} -> {}x{} ({})",
            filtered.width(),
            filtered.height(),
            target.width,
            target.height,
            self.effective_mode()
        );
        if target == ImageSize::of(&filtered) {
            return Ok(filtered);
        }
        Ok(imageops::resize(
            &filtered,
            target.width,
            target.height,
            FilterType::Triangle,
        ))
    }
}
