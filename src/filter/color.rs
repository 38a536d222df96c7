//! 8-bit color space conversions.
//!
//! Conventions match the widely used OpenCV 8-bit forms: gray is a 14-bit
//! fixed point weighted sum, hue spans `0..180`, and Lab stores `L * 255 / 100`
//! with `a` and `b` offset by 128.

use image::{GrayImage, Luma, Rgb, RgbImage};

/// Three 8-bit planes of equal size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planes {
    pub width: u32,
    pub height: u32,
    pub c0: Vec<u8>,
    pub c1: Vec<u8>,
    pub c2: Vec<u8>,
}

impl Planes {
    fn with_capacity(width: u32, height: u32) -> Self {
        let n = width as usize * height as usize;
        Self {
            width,
            height,
            c0: Vec::with_capacity(n),
            c1: Vec::with_capacity(n),
            c2: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, [a, b, c]: [u8; 3]) {
        self.c0.push(a);
        self.c1.push(b);
        self.c2.push(c);
    }

    fn map_to_rgb(&self, f: impl Fn(u8, u8, u8) -> [u8; 3]) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        for (i, px) in out.pixels_mut().enumerate() {
            *px = Rgb(f(self.c0[i], self.c1[i], self.c2[i]));
        }
        out
    }
}

// ============================================================================
// Gray
// ============================================================================

const GRAY_SHIFT: u32 = 14;
const R2Y: u32 = 4899;
const G2Y: u32 = 9617;
const B2Y: u32 = 1868;

/// Luma of one pixel.
pub fn gray_value([r, g, b]: [u8; 3]) -> u8 {
    let sum = u32::from(r) * R2Y + u32::from(g) * G2Y + u32::from(b) * B2Y;
    ((sum + (1 << (GRAY_SHIFT - 1))) >> GRAY_SHIFT) as u8
}

pub fn rgb_to_gray(image: &RgbImage) -> GrayImage {
    let mut out = GrayImage::new(image.width(), image.height());
    for (dst, src) in out.pixels_mut().zip(image.pixels()) {
        *dst = Luma([gray_value(src.0)]);
    }
    out
}

/// Replicate a single channel into three.
pub fn gray_to_rgb(gray: &GrayImage) -> RgbImage {
    let mut out = RgbImage::new(gray.width(), gray.height());
    for (dst, src) in out.pixels_mut().zip(gray.pixels()) {
        let v = src.0[0];
        *dst = Rgb([v, v, v]);
    }
    out
}

// ============================================================================
// HSV
// ============================================================================

const HSV_SHIFT: u32 = 12;
const HUE_RANGE: i32 = 180;

struct HsvTables {
    sdiv: [i32; 256],
    hdiv: [i32; 256],
}

impl HsvTables {
    fn new() -> Self {
        let mut sdiv = [0; 256];
        let mut hdiv = [0; 256];
        for i in 1..256 {
            let d = i as f64;
            sdiv[i] = (f64::from(255 << HSV_SHIFT) / d).round_ties_even() as i32;
            hdiv[i] = (f64::from(HUE_RANGE << HSV_SHIFT) / (6.0 * d)).round_ties_even() as i32;
        }
        Self { sdiv, hdiv }
    }
}

/// Convert to H, S, V planes with hue in `0..180`.
pub fn rgb_to_hsv(image: &RgbImage) -> Planes {
    let tables = HsvTables::new();
    let mut planes = Planes::with_capacity(image.width(), image.height());
    let round = 1 << (HSV_SHIFT - 1);

    for px in image.pixels() {
        let [r, g, b] = px.0.map(i32::from);
        let v = r.max(g).max(b);
        let vmin = r.min(g).min(b);
        let diff = v - vmin;

        let s = (diff * tables.sdiv[v as usize] + round) >> HSV_SHIFT;
        let h_raw = if v == r {
            g - b
        } else if v == g {
            b - r + 2 * diff
        } else {
            r - g + 4 * diff
        };
        let mut h = (h_raw * tables.hdiv[diff as usize] + round) >> HSV_SHIFT;
        if h < 0 {
            h += HUE_RANGE;
        }
        planes.push([h as u8, s as u8, v as u8]);
    }
    planes
}

// Indices into [v, p, q, t] for (b, g, r) per hue sector.
const SECTOR_DATA: [[usize; 3]; 6] = [
    [1, 3, 0],
    [1, 0, 2],
    [3, 0, 1],
    [0, 2, 1],
    [0, 1, 3],
    [2, 1, 0],
];

fn hsv_pixel_to_rgb(h: u8, s: u8, v: u8) -> [u8; 3] {
    let hscale = 6.0_f32 / HUE_RANGE as f32;
    let s = f32::from(s) * (1.0 / 255.0);
    let v = f32::from(v) * (1.0 / 255.0);

    let (b, g, r) = if s == 0.0 {
        (v, v, v)
    } else {
        let mut h = f32::from(h) * hscale;
        while h >= 6.0 {
            h -= 6.0;
        }
        let mut sector = h.floor() as usize;
        h -= sector as f32;
        if sector >= 6 {
            sector = 0;
            h = 0.0;
        }
        let tab = [v, v * (1.0 - s), v * (1.0 - s * h), v * (1.0 - s * (1.0 - h))];
        let [bi, gi, ri] = SECTOR_DATA[sector];
        (tab[bi], tab[gi], tab[ri])
    };

    [r, g, b].map(|c| saturate_f32(c * 255.0))
}

/// Convert H, S, V planes back to RGB.
pub fn hsv_to_rgb(planes: &Planes) -> RgbImage {
    planes.map_to_rgb(hsv_pixel_to_rgb)
}

// ============================================================================
// Lab
// ============================================================================

const XN: f64 = 0.950456;
const ZN: f64 = 1.088754;
const LAB_THRESHOLD: f64 = 0.008856;
const LAB_KAPPA: f64 = 903.3;
const LAB_OFFSET: f64 = 16.0 / 116.0;

fn srgb_to_linear(c: f64) -> f64 {
    if c <= 0.04045 {
        c / 12.92
    } else {
        ((c + 0.055) / 1.055).powf(2.4)
    }
}

fn linear_to_srgb(c: f64) -> f64 {
    if c <= 0.003_130_8 {
        12.92 * c
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

fn lab_f(t: f64) -> f64 {
    if t > LAB_THRESHOLD {
        t.cbrt()
    } else {
        7.787 * t + LAB_OFFSET
    }
}

fn rgb_pixel_to_lab([r, g, b]: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = [r, g, b].map(|c| srgb_to_linear(f64::from(c) / 255.0));

    let x = (0.412453 * r + 0.357580 * g + 0.180423 * b) / XN;
    let y = 0.212671 * r + 0.715160 * g + 0.072169 * b;
    let z = (0.019334 * r + 0.119193 * g + 0.950227 * b) / ZN;

    let fy = lab_f(y);
    let l = if y > LAB_THRESHOLD {
        116.0 * fy - 16.0
    } else {
        LAB_KAPPA * y
    };
    let a = 500.0 * (lab_f(x) - fy) + 128.0;
    let b = 200.0 * (fy - lab_f(z)) + 128.0;

    [saturate_f64(l * 255.0 / 100.0), saturate_f64(a), saturate_f64(b)]
}

fn lab_pixel_to_rgb(l: u8, a: u8, b: u8) -> [u8; 3] {
    let l = f64::from(l) * 100.0 / 255.0;
    let a = f64::from(a) - 128.0;
    let b = f64::from(b) - 128.0;

    let (y, fy) = if l <= LAB_THRESHOLD * LAB_KAPPA {
        let y = l / LAB_KAPPA;
        (y, 7.787 * y + LAB_OFFSET)
    } else {
        let fy = (l + 16.0) / 116.0;
        (fy * fy * fy, fy)
    };
    let inv_f = |f: f64| {
        if f > 0.206893 {
            f * f * f
        } else {
            (f - LAB_OFFSET) / 7.787
        }
    };
    let x = inv_f(fy + a / 500.0) * XN;
    let z = inv_f(fy - b / 200.0) * ZN;

    let r = 3.240479 * x - 1.53715 * y - 0.498535 * z;
    let g = -0.969256 * x + 1.875991 * y + 0.041556 * z;
    let bl = 0.055648 * x - 0.204043 * y + 1.057311 * z;

    [r, g, bl].map(|c| saturate_f64(linear_to_srgb(c.clamp(0.0, 1.0)) * 255.0))
}

/// Convert to L, a, b planes (8-bit encoding).
pub fn rgb_to_lab(image: &RgbImage) -> Planes {
    let mut planes = Planes::with_capacity(image.width(), image.height());
    for px in image.pixels() {
        planes.push(rgb_pixel_to_lab(px.0));
    }
    planes
}

/// Convert L, a, b planes back to RGB.
pub fn lab_to_rgb(planes: &Planes) -> RgbImage {
    planes.map_to_rgb(lab_pixel_to_rgb)
}

// ============================================================================
// Saturating arithmetic
// ============================================================================

fn saturate_f32(v: f32) -> u8 {
    v.round_ties_even().clamp(0.0, 255.0) as u8
}

fn saturate_f64(v: f64) -> u8 {
    v.round_ties_even().clamp(0.0, 255.0) as u8
}

/// Multiply every value by `factor`, rounding and clamping to `0..=255`.
pub fn scale_channel(values: &mut [u8], factor: f64) {
    for v in values {
        *v = saturate_f64(f64::from(*v) * factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image_of(pixels: &[[u8; 3]]) -> RgbImage {
        let mut img = RgbImage::new(pixels.len() as u32, 1);
        for (i, p) in pixels.iter().enumerate() {
            img.put_pixel(i as u32, 0, Rgb(*p));
        }
        img
    }

    #[test]
    fn test_gray_weights() {
        assert_eq!(gray_value([0, 0, 0]), 0);
        assert_eq!(gray_value([255, 255, 255]), 255);
        // 255 * 4899 / 16384 = 76.24
        assert_eq!(gray_value([255, 0, 0]), 76);
        assert_eq!(gray_value([0, 255, 0]), 150);
        assert_eq!(gray_value([0, 0, 255]), 29);
    }

    #[test]
    fn test_hsv_primary_colors() {
        let img = image_of(&[[255, 0, 0], [0, 255, 0], [0, 0, 255], [128, 128, 128]]);
        let hsv = rgb_to_hsv(&img);
        assert_eq!(hsv.c0, vec![0, 60, 120, 0]);
        assert_eq!(hsv.c1, vec![255, 255, 255, 0]);
        assert_eq!(hsv.c2, vec![255, 255, 255, 128]);
    }

    #[test]
    fn test_hsv_round_trip_primaries() {
        let pixels = [
            [255, 0, 0],
            [0, 255, 0],
            [0, 0, 255],
            [255, 255, 0],
            [0, 0, 0],
            [255, 255, 255],
            [77, 77, 77],
        ];
        let img = image_of(&pixels);
        assert_eq!(hsv_to_rgb(&rgb_to_hsv(&img)), img);
    }

    #[test]
    fn test_lab_extremes() {
        let img = image_of(&[[0, 0, 0], [255, 255, 255]]);
        let lab = rgb_to_lab(&img);
        assert_eq!(lab.c0, vec![0, 255]);
        assert_eq!(lab.c1, vec![128, 128]);
        assert_eq!(lab.c2, vec![128, 128]);
    }

    #[test]
    fn test_lab_round_trip_is_close() {
        let pixels = [[200, 30, 40], [10, 120, 230], [90, 90, 90], [250, 240, 10]];
        let img = image_of(&pixels);
        let back = lab_to_rgb(&rgb_to_lab(&img));
        for (a, b) in img.pixels().zip(back.pixels()) {
            for c in 0..3 {
                let d = (i16::from(a.0[c]) - i16::from(b.0[c])).abs();
                assert!(d <= 3, "{:?} vs {:?}", a, b);
            }
        }
    }

    #[test]
    fn test_scale_channel_saturates() {
        let mut v = vec![0, 10, 100, 200, 255];
        scale_channel(&mut v, 1.3);
        assert_eq!(v, vec![0, 13, 130, 255, 255]);
    }
}
