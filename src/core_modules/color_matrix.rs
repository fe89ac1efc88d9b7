// THEORY:
// The color matrix engine remaps every pixel's RGB through a fixed 3x3 linear
// transform. It is how the crate simulates color-vision deficiencies: each matrix
// approximates what a viewer with that deficiency perceives.
//
// The matrices are NOT normalized color-space transforms. Rows need not sum to 1,
// and each output channel is clamped on its own, so a matrix may amplify or
// attenuate a channel. Malformed matrices produce well-defined (if odd-looking)
// output; nothing here can fail.
//
// Daltonization builds on the same product: simulate, take the per-channel error
// the deficiency would hide, and push a fixed fraction of it back into the
// original. Grayscale lives here too since it is the same per-pixel weighted sum,
// written to all three channels.

use crate::core_modules::pixel_buffer::{Pixel, PixelBuffer, clamp_channel};

pub type Coefficient = f64;

/// Gain applied to the simulation error during daltonization.
pub const DALTONIZE_GAIN: f64 = 0.6;

/// A 3x3 matrix mapping true RGB to perceived RGB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorMatrix([[Coefficient; 3]; 3]);

impl ColorMatrix {
    pub const PROTANOPIA: ColorMatrix = ColorMatrix::new([
        [0.56667, 0.43333, 0.0],
        [0.55833, 0.44167, 0.0],
        [0.0, 0.24167, 0.75833],
    ]);
    pub const DEUTERANOPIA: ColorMatrix =
        ColorMatrix::new([[0.625, 0.375, 0.0], [0.7, 0.3, 0.0], [0.0, 0.3, 0.7]]);
    pub const TRITANOPIA: ColorMatrix = ColorMatrix::new([
        [0.95, 0.05, 0.0],
        [0.0, 0.43333, 0.56667],
        [0.0, 0.475, 0.525],
    ]);
    pub const PROTANOMALY: ColorMatrix = ColorMatrix::new([
        [0.816, 0.184, 0.0],
        [0.333, 0.667, 0.0],
        [0.0, 0.125, 0.875],
    ]);
    pub const DEUTERANOMALY: ColorMatrix = ColorMatrix::new([
        [0.8, 0.2, 0.0],
        [0.258, 0.742, 0.0],
        [0.0, 0.142, 0.858],
    ]);
    pub const TRITANOMALY: ColorMatrix = ColorMatrix::new([
        [0.967, 0.033, 0.0],
        [0.0, 0.733, 0.267],
        [0.0, 0.183, 0.817],
    ]);
    /// Every output channel is the Rec. 601 luma.
    pub const ACHROMATOPSIA: ColorMatrix = ColorMatrix::new([
        [0.299, 0.587, 0.114],
        [0.299, 0.587, 0.114],
        [0.299, 0.587, 0.114],
    ]);
    /// Every output channel is (almost) the plain channel mean.
    pub const MONOCHROMACY: ColorMatrix = ColorMatrix::new([
        [0.33, 0.33, 0.33],
        [0.33, 0.33, 0.33],
        [0.33, 0.33, 0.33],
    ]);

    pub const fn new(rows: [[Coefficient; 3]; 3]) -> Self {
        ColorMatrix(rows)
    }

    pub fn rows(&self) -> &[[Coefficient; 3]; 3] {
        &self.0
    }

    /// The raw matrix product `M * rgb`, unclamped.
    #[inline]
    pub fn product(&self, rgb: [f64; 3]) -> [f64; 3] {
        let [r, g, b] = rgb;
        let m = &self.0;
        [
            r * m[0][0] + g * m[0][1] + b * m[0][2],
            r * m[1][0] + g * m[1][1] + b * m[1][2],
            r * m[2][0] + g * m[2][1] + b * m[2][2],
        ]
    }

    /// Applies the matrix to one pixel, clamping each channel and keeping alpha.
    #[inline]
    pub fn transform(&self, pixel: Pixel) -> Pixel {
        let [r, g, b] = self.product(pixel.rgb());
        Pixel::new(clamp_channel(r), clamp_channel(g), clamp_channel(b), pixel.alpha)
    }
}

/// Simulates a color-vision deficiency over the whole buffer.
pub fn apply(buffer: &PixelBuffer, matrix: &ColorMatrix) -> PixelBuffer {
    buffer.map_pixels(|pixel| matrix.transform(pixel))
}

/// Daltonizes one pixel: `clamp(rgb + 0.6 * (rgb - clamp(M * rgb)))`.
pub fn daltonize_pixel(pixel: Pixel, matrix: &ColorMatrix) -> Pixel {
    let original = pixel.rgb();
    let simulated = matrix.product(original).map(|v| v.clamp(0.0, 255.0));
    let mut corrected = [0u8; 3];
    for channel in 0..3 {
        let error = original[channel] - simulated[channel];
        corrected[channel] = clamp_channel(original[channel] + error * DALTONIZE_GAIN);
    }
    Pixel::new(corrected[0], corrected[1], corrected[2], pixel.alpha)
}

/// Error-compensation pass that exaggerates the differences `matrix` would suppress.
pub fn daltonize(buffer: &PixelBuffer, matrix: &ColorMatrix) -> PixelBuffer {
    buffer.map_pixels(|pixel| daltonize_pixel(pixel, matrix))
}

/// Luma reduction: writes `round(0.299 R + 0.587 G + 0.114 B)` into R, G and B and
/// keeps the source alpha.
pub fn grayscale(buffer: &PixelBuffer) -> PixelBuffer {
    buffer.map_pixels(|pixel| Pixel::gray(clamp_channel(pixel.luminance()), pixel.alpha))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ColorMatrix; 8] = [
        ColorMatrix::PROTANOPIA,
        ColorMatrix::DEUTERANOPIA,
        ColorMatrix::TRITANOPIA,
        ColorMatrix::PROTANOMALY,
        ColorMatrix::DEUTERANOMALY,
        ColorMatrix::TRITANOMALY,
        ColorMatrix::ACHROMATOPSIA,
        ColorMatrix::MONOCHROMACY,
    ];

    fn sample_buffer() -> PixelBuffer {
        let mut buffer = PixelBuffer::new(4, 4);
        let mut value: u32 = 7;
        for y in 0..4 {
            for x in 0..4 {
                value = value.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let bytes = value.to_be_bytes();
                buffer.put(x, y, Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3]));
            }
        }
        buffer.put(0, 0, Pixel::new(255, 255, 255, 255));
        buffer.put(1, 0, Pixel::new(0, 0, 0, 0));
        buffer
    }

    #[test]
    fn achromatopsia_maps_to_rounded_luma() {
        let buffer = PixelBuffer::filled(1, 1, Pixel::new(200, 50, 10, 255));
        let out = apply(&buffer, &ColorMatrix::ACHROMATOPSIA);
        // 0.299 * 200 + 0.587 * 50 + 0.114 * 10 = 90.29
        assert_eq!(out.get(0, 0), Some(Pixel::new(90, 90, 90, 255)));
    }

    #[test]
    fn alpha_passes_through_unchanged() {
        let buffer = sample_buffer();
        for matrix in ALL {
            let out = apply(&buffer, &matrix);
            for (before, after) in buffer.pixels().zip(out.pixels()) {
                assert_eq!(before.alpha, after.alpha);
            }
        }
    }

    #[test]
    fn amplifying_matrix_clamps_each_channel() {
        let boost = ColorMatrix::new([[2.0, 0.0, 0.0], [0.0, -1.0, 0.0], [0.5, 0.5, 0.5]]);
        let buffer = PixelBuffer::filled(1, 1, Pixel::new(200, 100, 60, 9));
        let out = apply(&buffer, &boost);
        assert_eq!(out.get(0, 0), Some(Pixel::new(255, 0, 180, 9)));
    }

    #[test]
    fn matrix_application_is_deterministic_and_pure() {
        let buffer = sample_buffer();
        let snapshot = buffer.clone();
        let first = apply(&buffer, &ColorMatrix::DEUTERANOMALY);
        let second = apply(&buffer, &ColorMatrix::DEUTERANOMALY);
        assert_eq!(first, second);
        assert_eq!(buffer, snapshot);
        assert_eq!(first.dimensions(), buffer.dimensions());
    }

    #[test]
    fn protanopia_known_value() {
        let buffer = PixelBuffer::filled(1, 1, Pixel::new(255, 0, 0, 255));
        let out = apply(&buffer, &ColorMatrix::PROTANOPIA);
        // 255 * 0.56667 = 144.50085, 255 * 0.55833 = 142.37415, 0
        assert_eq!(out.get(0, 0), Some(Pixel::new(145, 142, 0, 255)));
    }

    #[test]
    fn daltonize_pushes_error_back_into_original() {
        let pixel = Pixel::new(255, 0, 0, 200);
        let corrected = daltonize_pixel(pixel, &ColorMatrix::PROTANOPIA);
        // sim = (144.5, 142.37, 0); err = (110.5, -142.37, 0)
        // out = (255 + 66.3 -> 255, 0 - 85.4 -> 0, 0)
        assert_eq!(corrected, Pixel::new(255, 0, 0, 200));

        let pixel = Pixel::new(100, 150, 50, 255);
        let corrected = daltonize_pixel(pixel, &ColorMatrix::PROTANOPIA);
        // sim = (121.6665, 122.0835, 74.167); err = (-21.6665, 27.9165, -24.167)
        // out = (87.0001, 166.7499, 35.4998)
        assert_eq!(corrected, Pixel::new(87, 167, 35, 255));
    }

    #[test]
    fn daltonize_leaves_gray_fixed_points_alone() {
        // Achromatopsia maps pure gray onto itself, so the error is zero.
        let buffer = PixelBuffer::filled(2, 2, Pixel::gray(128, 255));
        assert_eq!(daltonize(&buffer, &ColorMatrix::ACHROMATOPSIA), buffer);
    }

    #[test]
    fn grayscale_equalizes_channels_and_keeps_alpha() {
        let buffer = sample_buffer();
        let out = grayscale(&buffer);
        for (before, after) in buffer.pixels().zip(out.pixels()) {
            assert!(after.is_gray());
            assert_eq!(after.alpha, before.alpha);
        }
        assert_eq!(out.get(0, 0), Some(Pixel::gray(255, 255)));
    }

    #[test]
    fn simulation_and_daltonize_preserve_dimensions() {
        let mut buffer = PixelBuffer::new(2, 2);
        buffer.put(0, 0, Pixel::new(255, 255, 255, 255));
        buffer.put(1, 0, Pixel::new(255, 0, 255, 255));
        buffer.put(0, 1, Pixel::new(0, 255, 0, 255));
        for matrix in ALL {
            let simulated = apply(&buffer, &matrix);
            let corrected = daltonize(&buffer, &matrix);
            assert_eq!(simulated.dimensions(), buffer.dimensions());
            assert_eq!(corrected.dimensions(), buffer.dimensions());
        }
    }
}
