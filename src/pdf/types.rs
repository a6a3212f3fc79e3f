//! Core types for crop extraction

use serde::Serialize;

/// PDF points per inch
pub const POINTS_PER_INCH: f32 = 72.0;

/// Axis-aligned rectangle, `left`/`top` inclusive, origin top-left.
///
/// Used for page-space (points), display-space and render-space (pixels);
/// the unit depends on where the value came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Build a rectangle from two drag corners in any order
    #[must_use]
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Multiply every coordinate by `factor`
    #[must_use]
    pub fn scaled(&self, factor: f32) -> Self {
        Self::new(
            self.left * factor,
            self.top * factor,
            self.right * factor,
            self.bottom * factor,
        )
    }

    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.left.is_finite()
            && self.top.is_finite()
            && self.right.is_finite()
            && self.bottom.is_finite()
    }
}

impl std::fmt::Display for Rect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({:.2}, {:.2}, {:.2}, {:.2})",
            self.left, self.top, self.right, self.bottom
        )
    }
}

/// Page dimensions in points
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PageSize {
    pub width: f32,
    pub height: f32,
}

impl PageSize {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }
}

/// Page geometry report (original tool's page info panel)
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PageInfo {
    pub index: usize,
    pub width_pt: f32,
    pub height_pt: f32,
    pub width_in: f32,
    pub height_in: f32,
}

impl PageInfo {
    #[must_use]
    pub fn new(index: usize, size: PageSize) -> Self {
        Self {
            index,
            width_pt: size.width,
            height_pt: size.height,
            width_in: size.width / POINTS_PER_INCH,
            height_in: size.height / POINTS_PER_INCH,
        }
    }
}

/// Raster image placed on a page
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EmbeddedImage {
    /// Intrinsic width in pixels
    pub pixel_width: u32,
    /// Intrinsic height in pixels
    pub pixel_height: u32,
    /// Placement on the page in points
    pub placement: Rect,
}

impl EmbeddedImage {
    /// Scale at which the image's pixels map 1:1 onto output pixels.
    ///
    /// `None` for degenerate placements.
    #[must_use]
    pub fn native_scale(&self) -> Option<f32> {
        let placed_w = self.placement.width().abs();
        let placed_h = self.placement.height().abs();
        if placed_w < f32::EPSILON || placed_h < f32::EPSILON {
            return None;
        }
        let scale_x = self.pixel_width as f32 / placed_w;
        let scale_y = self.pixel_height as f32 / placed_h;
        let scale = scale_x.max(scale_y);
        scale.is_finite().then_some(scale)
    }
}

/// Kind of a page content block
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentKind {
    /// Text block
    Text,
    /// Image block reported by the text layer
    Image,
    /// Self-contained drawable object (form XObject)
    Drawable,
}

/// Content block used by the density heuristics
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContentBlock {
    pub kind: ContentKind,
    pub bbox: Rect,
}

impl ContentBlock {
    #[must_use]
    pub const fn new(kind: ContentKind, bbox: Rect) -> Self {
        Self { kind, bbox }
    }
}

/// Rendered RGB raster (3 bytes per pixel, rows tightly packed)
#[derive(Clone, Default)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Raster {
    #[must_use]
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Non-zero dimensions and a buffer that covers them
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.width > 0
            && self.height > 0
            && !self.pixels.is_empty()
            && self.pixels.len() >= self.width as usize * self.height as usize * 3
    }

    /// RGB pixel at `(x, y)`
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.pixels
            .get(idx..idx + 3)
            .map(|px| [px[0], px[1], px[2]])
    }
}

impl std::fmt::Debug for Raster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Raster")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// File format of a raw embedded image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawImageFormat {
    Jpeg,
    Jpeg2000,
    Png,
}

impl RawImageFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            RawImageFormat::Jpeg => "jpg",
            RawImageFormat::Jpeg2000 => "jp2",
            RawImageFormat::Png => "png",
        }
    }
}

/// Embedded image bytes ready to be written verbatim
#[derive(Clone)]
pub struct RawImage {
    pub data: Vec<u8>,
    pub format: RawImageFormat,
}

impl std::fmt::Debug for RawImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawImage")
            .field("format", &self.format)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// Document metadata
#[derive(Clone, Debug, Default, Serialize)]
pub struct DocumentMetadata {
    pub title: Option<String>,
    pub author: Option<String>,
    pub subject: Option<String>,
    pub creator: Option<String>,
    pub producer: Option<String>,
    pub encrypted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_corners_normalizes_reversed_drag() {
        let rect = Rect::from_corners(50.0, 80.0, 10.0, 20.0);
        assert_eq!(rect, Rect::new(10.0, 20.0, 50.0, 80.0));
    }

    #[test]
    fn native_scale_takes_larger_axis() {
        let image = EmbeddedImage {
            pixel_width: 600,
            pixel_height: 300,
            placement: Rect::new(0.0, 0.0, 100.0, 100.0),
        };
        assert_eq!(image.native_scale(), Some(6.0));
    }

    #[test]
    fn native_scale_rejects_degenerate_placement() {
        let image = EmbeddedImage {
            pixel_width: 600,
            pixel_height: 600,
            placement: Rect::new(10.0, 10.0, 10.0, 50.0),
        };
        assert_eq!(image.native_scale(), None);
    }

    #[test]
    fn raster_validity() {
        assert!(!Raster::default().is_valid());
        assert!(!Raster::new(2, 2, vec![0; 5]).is_valid());
        assert!(Raster::new(2, 2, vec![0; 12]).is_valid());
    }
}
