//! Error types for the backend and the extraction pipeline

use super::coords::InvalidRegion;
use super::types::Rect;

/// Errors raised by the PDF backend
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[cfg(feature = "pdf")]
    #[error("PDF engine: {0}")]
    Pdf(#[from] mupdf::error::Error),

    #[cfg(feature = "pdf")]
    #[error("PDF structure: {0}")]
    Structure(#[from] lopdf::Error),

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    #[error("{detail}")]
    Generic { detail: String },
}

impl BackendError {
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic { detail: msg.into() }
    }
}

/// Errors from extracting a single crop
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// Crop collapsed to zero area after clamping
    #[error("invalid region {rect} on page {page}")]
    InvalidRegion { page: usize, rect: Rect },

    /// Backend returned an empty or zero-sized raster
    #[error("render failed on page {page} at scale {scale:.2}: {detail}")]
    RenderFailure {
        page: usize,
        scale: f32,
        detail: String,
    },

    /// Every fallback scale failed
    #[error("extraction failed on page {page} after {attempts} render attempts")]
    ExtractionFailed { page: usize, attempts: usize },

    #[error("page {page} out of range (document has {count} pages)")]
    PageOutOfRange { page: usize, count: usize },

    /// Page could not be read (size lookup, corrupt page object)
    #[error("backend: {0}")]
    Backend(BackendError),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("encoding: {detail}")]
    Encode { detail: String },
}

impl ExtractionError {
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode { detail: msg.into() }
    }

    /// Whether this failure skips the item instead of signalling a broken
    /// environment (I/O, encoding)
    #[must_use]
    pub fn is_item_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidRegion { .. }
                | Self::RenderFailure { .. }
                | Self::ExtractionFailed { .. }
                | Self::PageOutOfRange { .. }
                | Self::Backend(_)
        )
    }

    pub(crate) fn invalid_region(page: usize, err: InvalidRegion) -> Self {
        Self::InvalidRegion { page, rect: err.0 }
    }
}

impl From<BackendError> for ExtractionError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PageOutOfRange { page, count } => Self::PageOutOfRange { page, count },
            other => Self::Backend(other),
        }
    }
}

impl From<image::ImageError> for ExtractionError {
    fn from(err: image::ImageError) -> Self {
        Self::encode(err.to_string())
    }
}

impl From<png::EncodingError> for ExtractionError {
    fn from(err: png::EncodingError) -> Self {
        Self::encode(err.to_string())
    }
}
