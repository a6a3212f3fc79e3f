//! Document collaborator interface
//!
//! The core never touches a PDF library directly. Everything it needs from
//! the open document goes through these two traits so the rasterizer can be
//! swapped (or faked in tests).

use super::error::BackendError;
use super::types::{ContentBlock, DocumentMetadata, EmbeddedImage, PageSize, Raster, RawImage, Rect};

/// Rasterizes pages
pub trait PageRenderer {
    /// Render `clip` (page-space points) of `page` with a `(scale, scale)`
    /// transform. The result is `clip.width() * scale` by
    /// `clip.height() * scale` pixels, rounded.
    fn render(&self, page: usize, scale: f32, clip: &Rect) -> Result<Raster, BackendError>;
}

/// Read-only access to page structure
pub trait PageInspector {
    fn page_count(&self) -> usize;

    fn page_size(&self, page: usize) -> Result<PageSize, BackendError>;

    /// Raster images placed on the page, with intrinsic pixel size
    fn embedded_images(&self, page: usize) -> Result<Vec<EmbeddedImage>, BackendError>;

    /// Text, image and drawable blocks for density heuristics
    fn content_blocks(&self, page: usize) -> Result<Vec<ContentBlock>, BackendError>;

    /// Embedded image objects of the page, encoded for writing to disk
    fn raw_images(&self, page: usize) -> Result<Vec<RawImage>, BackendError>;

    fn metadata(&self) -> DocumentMetadata {
        DocumentMetadata::default()
    }

    /// Fail with `PageOutOfRange` unless `page` exists
    fn check_page(&self, page: usize) -> Result<(), BackendError> {
        let count = self.page_count();
        if page < count {
            Ok(())
        } else {
            Err(BackendError::PageOutOfRange { page, count })
        }
    }
}

/// Everything the extraction pipeline needs from a document
pub trait PdfBackend: PageRenderer + PageInspector {}

impl<T: PageRenderer + PageInspector> PdfBackend for T {}
