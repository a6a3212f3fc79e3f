//! Export request and response types

use std::path::PathBuf;

use super::batch::{BatchItem, BatchOptions, BatchReport};
use super::error::{BackendError, ExtractionError};
use super::estimator::ScaleEstimate;
use super::extractor::{ExtractionResult, PreviewInfo};
use super::selection::CropSelection;
use super::types::DocumentMetadata;

/// Unique identifier for export requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// Request sent to the export worker
#[derive(Debug)]
pub enum ExportRequest {
    /// Estimate the extraction scale of a page
    EstimateScale { id: RequestId, page: usize },

    /// Predict the output of a selection without rendering
    Preview {
        id: RequestId,
        selection: CropSelection,
    },

    /// Extract one selection to a caller-chosen path
    ExtractCrop {
        id: RequestId,
        selection: CropSelection,
        output: PathBuf,
    },

    /// Export selections in order into a directory
    ExportBatch {
        id: RequestId,
        selections: Vec<CropSelection>,
        options: BatchOptions,
    },

    /// Dump every embedded image object
    DumpImages { id: RequestId, out_dir: PathBuf },

    /// Shutdown the worker
    Shutdown,
}

/// Errors from the export worker
#[derive(Debug, thiserror::Error)]
pub enum WorkerFault {
    #[error("could not open document: {0}")]
    Open(#[from] BackendError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),
}

/// Response from the export worker
#[derive(Debug)]
pub enum ExportResponse {
    /// Document opened (sent once, before any other response)
    DocumentReady {
        page_count: usize,
        metadata: DocumentMetadata,
    },

    Estimate {
        id: RequestId,
        estimate: ScaleEstimate,
    },

    Preview {
        id: RequestId,
        info: PreviewInfo,
    },

    Extracted {
        id: RequestId,
        result: ExtractionResult,
    },

    /// One crop of a batch finished (exported or failed)
    BatchProgress {
        id: RequestId,
        done: usize,
        total: usize,
        item: BatchItem,
    },

    BatchDone { id: RequestId, report: BatchReport },

    ImagesDumped { id: RequestId, paths: Vec<PathBuf> },

    /// Request failed. Document open failures use request id 0.
    Error { id: RequestId, error: WorkerFault },
}

impl ExportResponse {
    /// Request this response answers, if any
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            ExportResponse::DocumentReady { .. } => None,
            ExportResponse::Estimate { id, .. }
            | ExportResponse::Preview { id, .. }
            | ExportResponse::Extracted { id, .. }
            | ExportResponse::BatchProgress { id, .. }
            | ExportResponse::BatchDone { id, .. }
            | ExportResponse::ImagesDumped { id, .. }
            | ExportResponse::Error { id, .. } => Some(*id),
        }
    }

    /// Last response for its request
    #[must_use]
    pub fn is_final(&self) -> bool {
        !matches!(
            self,
            ExportResponse::DocumentReady { .. } | ExportResponse::BatchProgress { .. }
        )
    }
}
