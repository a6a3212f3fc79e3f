//! PDF crop extraction

pub mod backend;
pub mod batch;
pub mod cache;
pub mod coords;
pub mod dump;
pub mod encode;
pub mod error;
pub mod estimator;
pub mod extractor;
#[cfg(feature = "pdf")]
pub mod mupdf_backend;
pub mod naming;
pub mod request;
pub mod selection;
pub mod service;
#[cfg(feature = "pdf")]
pub mod structure;
pub mod summary;
pub mod types;
pub mod worker;
pub mod zoom;

pub use backend::{PageInspector, PageRenderer, PdfBackend};
pub use batch::{BatchItem, BatchOptions, BatchOutcome, BatchReport, export_batch};
pub use coords::{ContinuousLayout, InvalidRegion};
pub use dump::extract_all_embedded_images;
pub use encode::OutputEncoding;
pub use error::{BackendError, ExtractionError};
pub use estimator::{
    EstimatorConfig, NativeResolutionEstimator, ScaleEstimate, ScalePolicy, ScaleSignals,
};
pub use extractor::{
    CropExtractor, ExtractionResult, ExtractorConfig, PreviewInfo, QualityRating, RenderTier,
};
#[cfg(feature = "pdf")]
pub use mupdf_backend::MupdfBackend;
pub use naming::NamingPattern;
pub use request::{ExportRequest, ExportResponse, RequestId, WorkerFault};
pub use selection::{CropSelection, CropSelectionStore, SelectionId};
pub use service::ExportService;
pub use summary::{DocumentSummary, document_summary};
pub use types::*;
pub use zoom::ViewState;
