// THEORY:
// Geometric transforms over a fixed-size canvas. None of them change the buffer
// dimensions; pixels that would land outside the canvas are dropped and pixels
// that receive no source are left transparent black.
//
// Key architectural principles:
// 1.  **Flip** is a pure permutation of rows (vertical mirror), no interpolation.
// 2.  **Shear rotation** decomposes a rotation into three one-axis shears
//     (horizontal by `-tan(θ/2)`, vertical by `sin θ`, horizontal by `-tan(θ/2)`).
//     Each shear is an integer remap of whole pixels, so the result shows
//     staircase aliasing compared with a resampled rotation. Offsets are truncated
//     toward zero.
// 3.  **Plain rotation** is the resampling counterpart: every output pixel is
//     inverse-mapped into the source and bilinearly sampled, with transparent
//     fill outside the source.

use crate::core_modules::pixel_buffer::{Pixel, PixelBuffer, clamp_channel};

/// Angle used by rotation operations when the caller supplies none.
pub const DEFAULT_ROTATION_DEGREES: f64 = 45.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShearAxis {
    /// `(x, y) -> (x + trunc(y * factor), y)`
    Horizontal,
    /// `(x, y) -> (x, y + trunc(x * factor))`
    Vertical,
}

/// The three shear factors that compose a rotation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShearFactors {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl ShearFactors {
    pub fn for_angle(degrees: f64) -> Self {
        let theta = degrees.to_radians();
        let half_tan = -(theta / 2.0).tan();
        Self {
            alpha: half_tan,
            beta: theta.sin(),
            gamma: half_tan,
        }
    }
}

/// Mirrors the buffer top-to-bottom.
pub fn flip(buffer: &PixelBuffer) -> PixelBuffer {
    let (width, height) = buffer.dimensions();
    let mut out = PixelBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            out.set(x, height - 1 - y, buffer.at(x, y));
        }
    }
    out
}

/// Shears the buffer along one axis, dropping pixels that leave the canvas.
pub fn shear(buffer: &PixelBuffer, factor: f64, axis: ShearAxis) -> PixelBuffer {
    let (width, height) = buffer.dimensions();
    let mut out = PixelBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let (tx, ty) = match axis {
                ShearAxis::Horizontal => {
                    let offset = (y as f64 * factor) as i64;
                    ((x as i64).saturating_add(offset), y as i64)
                }
                ShearAxis::Vertical => {
                    let offset = (x as f64 * factor) as i64;
                    (x as i64, (y as i64).saturating_add(offset))
                }
            };
            out.put(tx, ty, buffer.at(x, y));
        }
    }
    out
}

/// Rotates by `degrees` using three cascaded shears.
pub fn rotate_shear(buffer: &PixelBuffer, degrees: f64) -> PixelBuffer {
    let factors = ShearFactors::for_angle(degrees);
    let first = shear(buffer, factors.alpha, ShearAxis::Horizontal);
    let second = shear(&first, factors.beta, ShearAxis::Vertical);
    shear(&second, factors.gamma, ShearAxis::Horizontal)
}

/// Rotates counter-clockwise by `degrees` about the canvas center, resampling
/// bilinearly. Areas uncovered by the source are transparent.
pub fn rotate(buffer: &PixelBuffer, degrees: f64) -> PixelBuffer {
    let (width, height) = buffer.dimensions();
    let mut out = PixelBuffer::new(width, height);
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = width as f64 / 2.0;
    let cy = height as f64 / 2.0;

    for y in 0..height {
        for x in 0..width {
            // Pixel centers, relative to the canvas center.
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            // Inverse of a counter-clockwise turn in y-down coordinates.
            let sx = dx * cos - dy * sin + cx - 0.5;
            let sy = dx * sin + dy * cos + cy - 0.5;
            if let Some(pixel) = sample_bilinear(buffer, sx, sy) {
                out.set(x, y, pixel);
            }
        }
    }
    out
}

// Taps outside the source count as transparent black. Returns `None` when all
// four taps are outside.
fn sample_bilinear(buffer: &PixelBuffer, sx: f64, sy: f64) -> Option<Pixel> {
    let x0 = sx.floor();
    let y0 = sy.floor();
    let fx = sx - x0;
    let fy = sy - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let taps = [
        (buffer.get(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (buffer.get(x0 + 1, y0), fx * (1.0 - fy)),
        (buffer.get(x0, y0 + 1), (1.0 - fx) * fy),
        (buffer.get(x0 + 1, y0 + 1), fx * fy),
    ];
    if taps.iter().all(|(pixel, _)| pixel.is_none()) {
        return None;
    }

    let mut acc = [0.0f64; 4];
    for (pixel, weight) in taps {
        let pixel = pixel.unwrap_or(Pixel::TRANSPARENT);
        acc[0] += pixel.red as f64 * weight;
        acc[1] += pixel.green as f64 * weight;
        acc[2] += pixel.blue as f64 * weight;
        acc[3] += pixel.alpha as f64 * weight;
    }
    Some(Pixel::new(
        clamp_channel(acc[0]),
        clamp_channel(acc[1]),
        clamp_channel(acc[2]),
        clamp_channel(acc[3]),
    ))
}
