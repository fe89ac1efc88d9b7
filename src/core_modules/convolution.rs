// THEORY:
// The convolution engine slides a fixed 3x3 kernel over every interior pixel.
// Blur variants differ only in their weights, so they share one inner loop.
//
// Edge policy: only pixels with a full 3x3 neighborhood are computed, i.e.
// `x in [1, width - 2]` and `y in [1, height - 2]`. The one-pixel border keeps the
// destination default, transparent black `(0, 0, 0, 0)`. Buffers narrower or
// shorter than three pixels have no interior and come back fully transparent.
//
// Convolved pixels are written opaque (alpha 255) regardless of the source alpha.

use crate::core_modules::pixel_buffer::{Pixel, PixelBuffer, clamp_channel};

pub type Weight = f64;

/// A 3x3 weight matrix indexed as `[row][column]`, centered on the target pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Kernel([[Weight; 3]; 3]);

impl Kernel {
    pub const BOX_BLUR: Kernel = Kernel::new([
        [1.0 / 9.0, 1.0 / 9.0, 1.0 / 9.0],
        [1.0 / 9.0, 1.0 / 9.0, 1.0 / 9.0],
        [1.0 / 9.0, 1.0 / 9.0, 1.0 / 9.0],
    ]);
    pub const GAUSSIAN_BLUR: Kernel = Kernel::new([
        [0.0625, 0.125, 0.0625],
        [0.125, 0.25, 0.125],
        [0.0625, 0.125, 0.0625],
    ]);

    pub const fn new(weights: [[Weight; 3]; 3]) -> Self {
        Kernel(weights)
    }

    pub fn weights(&self) -> &[[Weight; 3]; 3] {
        &self.0
    }

    pub fn sum(&self) -> Weight {
        self.0.iter().flatten().sum()
    }
}

/// Coordinates of every pixel with a full 3x3 neighborhood, in row-major order.
pub fn interior(width: u32, height: u32) -> impl Iterator<Item = (u32, u32)> {
    let columns = 1..width.saturating_sub(1);
    (1..height.saturating_sub(1)).flat_map(move |y| columns.clone().map(move |x| (x, y)))
}

/// Kernel-weighted RGB sums over the neighborhood of an interior pixel, unclamped.
#[inline]
pub(crate) fn weighted_sum(source: &PixelBuffer, kernel: &Kernel, x: u32, y: u32) -> [f64; 3] {
    let mut sum = [0.0f64; 3];
    for (ky, row) in kernel.0.iter().enumerate() {
        for (kx, weight) in row.iter().enumerate() {
            let rgb = source.at(x + kx as u32 - 1, y + ky as u32 - 1).rgb();
            sum[0] += rgb[0] * weight;
            sum[1] += rgb[1] * weight;
            sum[2] += rgb[2] * weight;
        }
    }
    sum
}

/// Convolves the interior of `buffer` with `kernel`.
pub fn apply(buffer: &PixelBuffer, kernel: &Kernel) -> PixelBuffer {
    let (width, height) = buffer.dimensions();
    let mut out = PixelBuffer::new(width, height);
    for (x, y) in interior(width, height) {
        let [r, g, b] = weighted_sum(buffer, kernel, x, y);
        out.set(
            x,
            y,
            Pixel::new(clamp_channel(r), clamp_channel(g), clamp_channel(b), 255),
        );
    }
    out
}
