//! Point and neighbourhood operations on gray planes.

use image::GrayImage;

/// Binary threshold: values strictly above `threshold` become `max`, the rest 0.
pub fn threshold(gray: &mut GrayImage, threshold: u8, max: u8) {
    for px in gray.pixels_mut() {
        px.0[0] = if px.0[0] > threshold { max } else { 0 };
    }
}

/// Bitwise inversion.
pub fn invert(gray: &mut GrayImage) {
    for px in gray.pixels_mut() {
        px.0[0] = 255 - px.0[0];
    }
}

/// Dilate with a 2x2 structuring element anchored at its bottom-right cell.
///
/// Each output pixel is the maximum of itself and its left, upper and
/// upper-left neighbours. Neighbours outside the image are ignored.
pub fn dilate_2x2(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    GrayImage::from_fn(w, h, |x, y| {
        let mut v = gray.get_pixel(x, y).0[0];
        if x > 0 {
            v = v.max(gray.get_pixel(x - 1, y).0[0]);
        }
        if y > 0 {
            v = v.max(gray.get_pixel(x, y - 1).0[0]);
            if x > 0 {
                v = v.max(gray.get_pixel(x - 1, y - 1).0[0]);
            }
        }
        image::Luma([v])
    })
}
