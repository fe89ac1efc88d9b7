// THEORY:
// The `PixelBuffer` is the unit every transform reads and writes: a fixed-size,
// row-major grid of RGBA samples with the origin at the top-left corner.
//
// Key architectural principles:
// 1.  **Fixed Shape**: Width and height are set at creation and never change. The
//     backing vector always holds exactly `width * height * 4` bytes.
// 2.  **Zero Default**: A fresh buffer is transparent black `(0, 0, 0, 0)`. Engines
//     that skip pixels (the convolution border, shear drop-outs) rely on this.
// 3.  **Checked Access at the Edges**: Public accessors take signed coordinates and
//     return `Option`/`bool`, so coordinate-space math that lands outside the grid
//     is rejected rather than wrapped.
//
// `Pixel` is a "dumb" data container for one RGBA sample, plus the single-pixel
// Rec. 601 luma used by the grayscale reduction.

use image::RgbaImage;

pub type Channel = u8;
pub type Luminance = f64;

const CHANNELS: usize = 4;

/// Clamps a computed channel value to `[0, 255]` and rounds it to the nearest byte.
///
/// Clamping happens before the integer conversion, so large or negative
/// intermediate sums saturate instead of wrapping.
#[inline]
pub fn clamp_channel(value: f64) -> Channel {
    value.clamp(0.0, 255.0).round() as Channel
}

/// A single RGBA sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Pixel {
    /// The red channel value (0-255).
    pub red: Channel,
    /// The green channel value (0-255).
    pub green: Channel,
    /// The blue channel value (0-255).
    pub blue: Channel,
    /// The alpha (opacity) channel value (0-255).
    pub alpha: Channel,
}

impl Pixel {
    pub const TRANSPARENT: Pixel = Pixel::new(0, 0, 0, 0);

    pub const fn new(red: Channel, green: Channel, blue: Channel, alpha: Channel) -> Self {
        Pixel {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// An opaque gray sample with all three color channels set to `level`.
    pub const fn gray(level: Channel, alpha: Channel) -> Self {
        Pixel::new(level, level, level, alpha)
    }

    /// The color channels as floating point values in 0..255.
    #[inline]
    pub fn rgb(&self) -> [f64; 3] {
        [self.red as f64, self.green as f64, self.blue as f64]
    }

    /// Luminance estimate (Rec. 601 luma): `0.299 R + 0.587 G + 0.114 B`.
    #[inline]
    pub fn luminance(&self) -> Luminance {
        0.299_f64 * self.red as f64 + 0.587_f64 * self.green as f64 + 0.114_f64 * self.blue as f64
    }

    pub fn is_gray(&self) -> bool {
        self.red == self.green && self.green == self.blue
    }
}

impl From<[Channel; CHANNELS]> for Pixel {
    fn from(bytes: [Channel; CHANNELS]) -> Self {
        Pixel::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl From<Pixel> for [Channel; CHANNELS] {
    fn from(pixel: Pixel) -> Self {
        [pixel.red, pixel.green, pixel.blue, pixel.alpha]
    }
}

/// An owned RGBA8 raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    data: Vec<Channel>,
}

impl PixelBuffer {
    /// Creates a transparent black buffer of the given size.
    pub fn new(width: u32, height: u32) -> Self {
        Self::filled(width, height, Pixel::TRANSPARENT)
    }

    /// Creates a buffer with every pixel set to `pixel`.
    pub fn filled(width: u32, height: u32, pixel: Pixel) -> Self {
        let count = width as usize * height as usize;
        let sample: [Channel; CHANNELS] = pixel.into();
        let mut data = Vec::with_capacity(count * CHANNELS);
        for _ in 0..count {
            data.extend_from_slice(&sample);
        }
        Self {
            width,
            height,
            data,
        }
    }

    /// Wraps raw RGBA bytes. Returns `None` when the length does not match the dimensions.
    pub fn from_raw(width: u32, height: u32, data: Vec<Channel>) -> Option<Self> {
        if data.len() != width as usize * height as usize * CHANNELS {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn as_raw(&self) -> &[Channel] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<Channel> {
        self.data
    }

    /// Whether the signed coordinate lies inside the grid.
    #[inline]
    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && x < self.width as i64 && y < self.height as i64
    }

    /// Reads the pixel at `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: i64, y: i64) -> Option<Pixel> {
        if !self.contains(x, y) {
            return None;
        }
        Some(self.at(x as u32, y as u32))
    }

    /// Writes the pixel at `(x, y)`. Returns `false` and leaves the buffer untouched
    /// when the coordinate is outside the grid.
    pub fn put(&mut self, x: i64, y: i64, pixel: Pixel) -> bool {
        if !self.contains(x, y) {
            return false;
        }
        self.set(x as u32, y as u32, pixel);
        true
    }

    /// Iterates over the pixels in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.data
            .chunks_exact(CHANNELS)
            .map(|sample| Pixel::new(sample[0], sample[1], sample[2], sample[3]))
    }

    /// Builds a new buffer of the same size by mapping every pixel independently.
    pub fn map_pixels<F>(&self, mut transform: F) -> PixelBuffer
    where
        F: FnMut(Pixel) -> Pixel,
    {
        let mut data = Vec::with_capacity(self.data.len());
        for pixel in self.pixels() {
            let mapped: [Channel; CHANNELS] = transform(pixel).into();
            data.extend_from_slice(&mapped);
        }
        PixelBuffer {
            width: self.width,
            height: self.height,
            data,
        }
    }

    // In-range access for engine loops. Callers guarantee `x < width && y < height`.
    #[inline]
    pub(crate) fn at(&self, x: u32, y: u32) -> Pixel {
        let i = self.index(x, y);
        Pixel::new(self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3])
    }

    #[inline]
    pub(crate) fn set(&mut self, x: u32, y: u32, pixel: Pixel) {
        let i = self.index(x, y);
        self.data[i..i + CHANNELS].copy_from_slice(&<[Channel; CHANNELS]>::from(pixel));
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y as usize * self.width as usize + x as usize) * CHANNELS
    }
}

impl From<RgbaImage> for PixelBuffer {
    fn from(image: RgbaImage) -> Self {
        let (width, height) = image.dimensions();
        PixelBuffer {
            width,
            height,
            data: image.into_raw(),
        }
    }
}

impl From<PixelBuffer> for RgbaImage {
    fn from(buffer: PixelBuffer) -> Self {
        let PixelBuffer {
            width,
            height,
            data,
        } = buffer;
        match RgbaImage::from_raw(width, height, data) {
            Some(image) => image,
            None => unreachable!("pixel buffer length always matches its dimensions"),
        }
    }
}
