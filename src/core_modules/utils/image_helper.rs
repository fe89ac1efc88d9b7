// Image codec: the bridge between encoded bytes (JPEG, PNG, ...) and `PixelBuffer`.
//
// Decoding accepts anything the `image` crate can sniff. Encoding supports the two
// formats results are persisted in. JPEG carries no alpha, so RGBA frames are
// flattened to RGB before encoding.

use std::fmt;
use std::str::FromStr;

use image::ImageEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;

use crate::core_modules::pixel_buffer::PixelBuffer;
use crate::error::CodecError;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Jpeg,
    Png,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            other => Err(format!("unsupported output format {other:?} (expected jpg or png)")),
        }
    }
}

/// Decodes an encoded image into an RGBA buffer.
pub fn decode(bytes: &[u8]) -> Result<PixelBuffer, CodecError> {
    if bytes.is_empty() {
        return Err(CodecError::Empty);
    }
    let format = image::guess_format(bytes).map_err(|_| CodecError::UnknownFormat)?;
    let image = image::load_from_memory_with_format(bytes, format).map_err(CodecError::Decode)?;
    Ok(PixelBuffer::from(image.to_rgba8()))
}

/// Encodes a buffer in the requested format.
pub fn encode(buffer: &PixelBuffer, format: OutputFormat) -> Result<Vec<u8>, CodecError> {
    let (width, height) = buffer.dimensions();
    let mut output = Vec::new();
    let result = match format {
        OutputFormat::Png => PngEncoder::new(&mut output).write_image(
            buffer.as_raw(),
            width,
            height,
            image::ExtendedColorType::Rgba8,
        ),
        OutputFormat::Jpeg => {
            let rgb: Vec<u8> = buffer
                .as_raw()
                .chunks_exact(4)
                .flat_map(|sample| [sample[0], sample[1], sample[2]])
                .collect();
            JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY).write_image(
                &rgb,
                width,
                height,
                image::ExtendedColorType::Rgb8,
            )
        }
    };
    result.map_err(|source| CodecError::Encode { format, source })?;
    Ok(output)
}
