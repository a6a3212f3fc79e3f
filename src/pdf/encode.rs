//! Output encoding of extracted crops

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use serde::Serialize;

use super::error::ExtractionError;
use super::types::Raster;

const METERS_PER_INCH: f32 = 0.0254;

/// Rough compression ratios used for size estimates before rendering
const PNG_SIZE_RATIO: f64 = 0.5;
const JPEG_SIZE_RATIO: f64 = 0.1;

/// File format chosen for a crop
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum OutputEncoding {
    /// Lossless, the default
    Png,
    /// Chosen only when the lossless output would exceed the size threshold
    Jpeg { quality: u8 },
}

impl OutputEncoding {
    /// Lossless unless the projected uncompressed size exceeds `threshold`
    #[must_use]
    pub fn choose(width: u32, height: u32, threshold: u64, jpeg_quality: u8) -> Self {
        if projected_bytes(width, height) > threshold {
            OutputEncoding::Jpeg {
                quality: jpeg_quality.clamp(1, 100),
            }
        } else {
            OutputEncoding::Png
        }
    }

    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            OutputEncoding::Png => "png",
            OutputEncoding::Jpeg { .. } => "jpg",
        }
    }

    #[must_use]
    pub fn is_lossy(self) -> bool {
        matches!(self, OutputEncoding::Jpeg { .. })
    }

    /// Expected file size for a `width` x `height` crop
    #[must_use]
    pub fn estimate_size(self, width: u32, height: u32) -> u64 {
        let ratio = match self {
            OutputEncoding::Png => PNG_SIZE_RATIO,
            OutputEncoding::Jpeg { .. } => JPEG_SIZE_RATIO,
        };
        (projected_bytes(width, height) as f64 * ratio).ceil() as u64
    }
}

/// Uncompressed RGB size
#[must_use]
pub fn projected_bytes(width: u32, height: u32) -> u64 {
    u64::from(width) * u64::from(height) * 3
}

/// `path` with the extension matching `encoding`
#[must_use]
pub fn with_encoding_extension(path: &Path, encoding: OutputEncoding) -> PathBuf {
    path.with_extension(encoding.extension())
}

/// Write `raster` to `path` with DPI metadata
pub fn write_raster(
    raster: &Raster,
    dpi: f32,
    encoding: OutputEncoding,
    path: &Path,
) -> Result<(), ExtractionError> {
    if !raster.is_valid() {
        return Err(ExtractionError::encode("raster is empty"));
    }
    let pixels = &raster.pixels[..raster.width as usize * raster.height as usize * 3];
    let writer = BufWriter::new(File::create(path)?);

    match encoding {
        OutputEncoding::Png => {
            let mut encoder = png::Encoder::new(writer, raster.width, raster.height);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let ppm = (dpi / METERS_PER_INCH).round() as u32;
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: png::Unit::Meter,
            }));
            let mut png_writer = encoder.write_header()?;
            png_writer.write_image_data(pixels)?;
            png_writer.finish()?;
        }
        OutputEncoding::Jpeg { quality } => {
            let mut encoder = JpegEncoder::new_with_quality(writer, quality);
            encoder.set_pixel_density(PixelDensity::dpi(dpi.round().clamp(1.0, f32::from(u16::MAX)) as u16));
            encoder.encode(pixels, raster.width, raster.height, image::ExtendedColorType::Rgb8)?;
        }
    }
    Ok(())
}
