//! Contrast limited adaptive histogram equalization on a single 8-bit plane.
//!
//! The plane is split into a grid of tiles. Each tile gets a clipped,
//! redistributed histogram and a cumulative lookup table; output pixels blend
//! the four nearest tile tables bilinearly. When a dimension is not a multiple
//! of the grid, the plane is padded by reflection (without repeating the edge
//! pixel) before the tables are built.

const HIST_SIZE: usize = 256;

/// CLAHE parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clahe {
    /// Relative clip limit; the absolute limit scales with tile area.
    pub clip_limit: f64,
    /// Tiles across and down.
    pub grid: (u32, u32),
}

impl Clahe {
    pub const fn new(clip_limit: f64, grid: (u32, u32)) -> Self {
        Self { clip_limit, grid }
    }

    /// Equalize `plane` (row-major, `width * height` values) in place.
    pub fn apply(&self, plane: &mut [u8], width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let (tiles_x, tiles_y) = (self.grid.0.max(1) as usize, self.grid.1.max(1) as usize);
        let (w, h) = (width as usize, height as usize);

        let padded;
        let (lut_src, lut_w, lut_h): (&[u8], usize, usize) =
            if w % tiles_x == 0 && h % tiles_y == 0 {
                (&*plane, w, h)
            } else {
                let pad_w = w + tiles_x - w % tiles_x;
                let pad_h = h + tiles_y - h % tiles_y;
                padded = pad_reflect_101(plane, w, h, pad_w, pad_h);
                (&padded, pad_w, pad_h)
            };

        let tile_w = lut_w / tiles_x;
        let tile_h = lut_h / tiles_y;
        let tile_area = tile_w * tile_h;

        let clip = if self.clip_limit > 0.0 {
            ((self.clip_limit * tile_area as f64 / HIST_SIZE as f64) as usize).max(1)
        } else {
            0
        };

        let mut luts = vec![0u8; tiles_x * tiles_y * HIST_SIZE];
        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let lut = &mut luts[(ty * tiles_x + tx) * HIST_SIZE..][..HIST_SIZE];
                build_tile_lut(
                    lut_src,
                    lut_w,
                    (tx * tile_w, ty * tile_h),
                    (tile_w, tile_h),
                    clip,
                    lut,
                );
            }
        }

        interpolate(plane, w, h, &luts, (tiles_x, tiles_y), (tile_w, tile_h));
    }
}

fn build_tile_lut(
    src: &[u8],
    stride: usize,
    (x0, y0): (usize, usize),
    (tile_w, tile_h): (usize, usize),
    clip: usize,
    lut: &mut [u8],
) {
    let mut hist = [0usize; HIST_SIZE];
    for y in y0..y0 + tile_h {
        for &v in &src[y * stride + x0..y * stride + x0 + tile_w] {
            hist[usize::from(v)] += 1;
        }
    }

    if clip > 0 {
        let mut clipped = 0;
        for bin in hist.iter_mut() {
            if *bin > clip {
                clipped += *bin - clip;
                *bin = clip;
            }
        }

        let batch = clipped / HIST_SIZE;
        let mut residual = clipped - batch * HIST_SIZE;
        for bin in hist.iter_mut() {
            *bin += batch;
        }
        if residual != 0 {
            let step = (HIST_SIZE / residual).max(1);
            let mut i = 0;
            while i < HIST_SIZE && residual > 0 {
                hist[i] += 1;
                i += step;
                residual -= 1;
            }
        }
    }

    let scale = (HIST_SIZE - 1) as f32 / (tile_w * tile_h) as f32;
    let mut sum = 0usize;
    for (bin, out) in hist.iter().zip(lut.iter_mut()) {
        sum += bin;
        *out = (sum as f32 * scale).round_ties_even().clamp(0.0, 255.0) as u8;
    }
}

fn interpolate(
    plane: &mut [u8],
    w: usize,
    h: usize,
    luts: &[u8],
    (tiles_x, tiles_y): (usize, usize),
    (tile_w, tile_h): (usize, usize),
) {
    let inv_tw = 1.0_f32 / tile_w as f32;
    let inv_th = 1.0_f32 / tile_h as f32;

    // Per-column tile indices and weights
    let columns: Vec<(usize, usize, f32)> = (0..w)
        .map(|x| {
            let txf = x as f32 * inv_tw - 0.5;
            let tx1 = txf.floor();
            let xa = txf - tx1;
            let tx1 = tx1 as i64;
            let left = tx1.max(0) as usize;
            let right = ((tx1 + 1) as usize).min(tiles_x - 1);
            (left, right, xa)
        })
        .collect();

    for y in 0..h {
        let tyf = y as f32 * inv_th - 0.5;
        let ty1 = tyf.floor();
        let ya = tyf - ty1;
        let ty1 = ty1 as i64;
        let top = ty1.max(0) as usize;
        let bottom = ((ty1 + 1) as usize).min(tiles_y - 1);

        let row = &mut plane[y * w..(y + 1) * w];
        for (x, v) in row.iter_mut().enumerate() {
            let (left, right, xa) = columns[x];
            let idx = usize::from(*v);
            let at =
                |ty: usize, tx: usize| f32::from(luts[(ty * tiles_x + tx) * HIST_SIZE + idx]);

            let res = (at(top, left) * (1.0 - xa) + at(top, right) * xa) * (1.0 - ya)
                + (at(bottom, left) * (1.0 - xa) + at(bottom, right) * xa) * ya;
            *v = res.round_ties_even().clamp(0.0, 255.0) as u8;
        }
    }
}

/// Reflect index `p` into `0..n` without repeating the edge sample.
fn reflect_101(mut p: i64, n: i64) -> usize {
    if n == 1 {
        return 0;
    }
    while p < 0 || p >= n {
        if p < 0 {
            p = -p;
        } else {
            p = 2 * n - 2 - p;
        }
    }
    p as usize
}

/// Pad on the right and bottom by reflection.
fn pad_reflect_101(src: &[u8], w: usize, h: usize, pad_w: usize, pad_h: usize) -> Vec<u8> {
    let mut out = vec![0u8; pad_w * pad_h];
    for y in 0..pad_h {
        let sy = reflect_101(y as i64, h as i64);
        for x in 0..pad_w {
            let sx = reflect_101(x as i64, w as i64);
            out[y * pad_w + x] = src[sy * w + sx];
        }
    }
    out
}
