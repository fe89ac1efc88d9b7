// THEORY:
// Sobel edge detection. The buffer is first reduced to luma (alpha kept), then two
// fixed gradient kernels are evaluated on every interior pixel and folded into a
// single magnitude, `sqrt(gx^2 + gy^2)`, written as an opaque gray pixel.
//
// The Sobel kernels never leave this module; they are not standalone operations.
// Border pixels follow the convolution edge policy (transparent black).

use crate::core_modules::color_matrix::grayscale;
use crate::core_modules::convolution::{Kernel, interior, weighted_sum};
use crate::core_modules::pixel_buffer::{Pixel, PixelBuffer, clamp_channel};

/// Horizontal gradient (responds to vertical edges).
const SOBEL_X: Kernel = Kernel::new([[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]]);
/// Vertical gradient (responds to horizontal edges).
const SOBEL_Y: Kernel = Kernel::new([[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]]);

#[inline]
pub fn gradient_magnitude(gx: f64, gy: f64) -> f64 {
    (gx * gx + gy * gy).sqrt()
}

pub fn apply(buffer: &PixelBuffer) -> PixelBuffer {
    let gray = grayscale(buffer);
    let (width, height) = gray.dimensions();
    let mut out = PixelBuffer::new(width, height);

    for (x, y) in interior(width, height) {
        // Every channel of `gray` carries the same luma; red is enough.
        let gx = weighted_sum(&gray, &SOBEL_X, x, y)[0];
        let gy = weighted_sum(&gray, &SOBEL_Y, x, y)[0];
        let magnitude = clamp_channel(gradient_magnitude(gx, gy));
        out.set(x, y, Pixel::gray(magnitude, 255));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertical_step(level: u8) -> PixelBuffer {
        let mut buffer = PixelBuffer::filled(5, 5, Pixel::new(0, 0, 0, 255));
        for y in 0..5 {
            for x in 2..5 {
                buffer.put(x, y, Pixel::gray(level, 255));
            }
        }
        buffer
    }

    #[test]
    fn flat_image_has_no_edges() {
        let buffer = PixelBuffer::filled(4, 4, Pixel::new(30, 60, 90, 255));
        let out = apply(&buffer);
        for (x, y) in interior(4, 4) {
            assert_eq!(out.get(x as i64, y as i64), Some(Pixel::gray(0, 255)));
        }
    }

    #[test]
    fn vertical_step_lights_up_both_sides_of_the_edge() {
        let out = apply(&vertical_step(20));
        for y in 1..4 {
            // gx = 20 * (1 + 2 + 1), gy = 0
            assert_eq!(out.get(1, y), Some(Pixel::gray(80, 255)));
            assert_eq!(out.get(2, y), Some(Pixel::gray(80, 255)));
            assert_eq!(out.get(3, y), Some(Pixel::gray(0, 255)));
        }
    }

    #[test]
    fn strong_edges_saturate() {
        let out = apply(&vertical_step(200));
        assert_eq!(out.get(2, 2), Some(Pixel::gray(255, 255)));
    }

    #[test]
    fn diagonal_neighbor_combines_both_gradients() {
        let mut buffer = PixelBuffer::filled(5, 5, Pixel::new(0, 0, 0, 255));
        buffer.put(2, 2, Pixel::gray(10, 255));
        let out = apply(&buffer);
        // At (1, 1) the bright pixel sits at the bottom-right tap: gx = gy = 10.
        assert_eq!(out.get(1, 1), Some(Pixel::gray(14, 255)));
    }

    #[test]
    fn border_is_never_written() {
        let out = apply(&vertical_step(120));
        for x in 0..5 {
            assert_eq!(out.get(x, 0), Some(Pixel::TRANSPARENT));
            assert_eq!(out.get(x, 4), Some(Pixel::TRANSPARENT));
        }
        for y in 0..5 {
            assert_eq!(out.get(0, y), Some(Pixel::TRANSPARENT));
            assert_eq!(out.get(4, y), Some(Pixel::TRANSPARENT));
        }
    }

    #[test]
    fn edges_work_on_luma_not_raw_channels() {
        // Pure red and a gray of equal luma produce no edge between them.
        let mut buffer = PixelBuffer::filled(4, 4, Pixel::new(100, 0, 0, 255));
        for y in 0..4 {
            buffer.put(3, y, Pixel::gray(30, 255));
            buffer.put(2, y, Pixel::gray(30, 255));
        }
        // round(0.299 * 100) = 30
        let out = apply(&buffer);
        assert_eq!(out.get(1, 1), Some(Pixel::gray(0, 255)));
        assert_eq!(out.get(2, 2), Some(Pixel::gray(0, 255)));
    }
}
