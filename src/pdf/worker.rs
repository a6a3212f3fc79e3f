//! Export worker - owns the document and runs in a dedicated thread
//!
//! Document handles are not safe to share across threads, so the worker
//! opens its own and serializes every render behind the request queue.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use flume::{Receiver, Sender};
use log::{debug, error};

use super::backend::PdfBackend;
use super::batch::export_batch;
use super::dump::extract_all_embedded_images;
use super::error::BackendError;
use super::estimator::EstimatorConfig;
use super::extractor::{CropExtractor, ExtractorConfig};
use super::request::{ExportRequest, ExportResponse, RequestId, WorkerFault};

/// Main worker function - runs in a dedicated thread
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn export_worker<B, F>(
    open: F,
    estimator: EstimatorConfig,
    extractor: ExtractorConfig,
    requests: Receiver<ExportRequest>,
    responses: Sender<ExportResponse>,
    cancel: Arc<AtomicBool>,
) where
    B: PdfBackend,
    F: FnOnce() -> Result<B, BackendError>,
{
    let doc = match open() {
        Ok(doc) => doc,
        Err(e) => {
            error!("Failed to open document: {e}");
            let _ = responses.send(ExportResponse::Error {
                id: RequestId::new(0),
                error: WorkerFault::Open(e),
            });
            return;
        }
    };

    let _ = responses.send(ExportResponse::DocumentReady {
        page_count: doc.page_count(),
        metadata: doc.metadata(),
    });

    let mut extractor = CropExtractor::new(estimator, extractor);

    for request in requests {
        match request {
            ExportRequest::EstimateScale { id, page } => {
                let response = match doc.check_page(page) {
                    Ok(()) => ExportResponse::Estimate {
                        id,
                        estimate: extractor.estimate_scale(&doc, page),
                    },
                    Err(e) => ExportResponse::Error {
                        id,
                        error: WorkerFault::Extraction(e.into()),
                    },
                };
                let _ = responses.send(response);
            }

            ExportRequest::Preview { id, selection } => {
                let response = match extractor.preview_info(&doc, &selection) {
                    Ok(info) => ExportResponse::Preview { id, info },
                    Err(e) => ExportResponse::Error { id, error: e.into() },
                };
                let _ = responses.send(response);
            }

            ExportRequest::ExtractCrop {
                id,
                selection,
                output,
            } => {
                let response = match extractor.extract(&doc, &selection, &output) {
                    Ok(result) => ExportResponse::Extracted { id, result },
                    Err(e) => ExportResponse::Error { id, error: e.into() },
                };
                let _ = responses.send(response);
            }

            ExportRequest::ExportBatch {
                id,
                selections,
                options,
            } => {
                let total = selections.len();
                debug!("batch {id:?}: {total} crops into {}", options.out_dir.display());
                let result = export_batch(
                    &mut extractor,
                    &doc,
                    &selections,
                    &options,
                    &cancel,
                    |item, done| {
                        let _ = responses.send(ExportResponse::BatchProgress {
                            id,
                            done,
                            total,
                            item: item.clone(),
                        });
                    },
                );
                let response = match result {
                    Ok(report) => ExportResponse::BatchDone { id, report },
                    Err(e) => ExportResponse::Error { id, error: e.into() },
                };
                let _ = responses.send(response);
            }

            ExportRequest::DumpImages { id, out_dir } => {
                let response = match extract_all_embedded_images(&doc, &out_dir) {
                    Ok(paths) => ExportResponse::ImagesDumped { id, paths },
                    Err(e) => ExportResponse::Error { id, error: e.into() },
                };
                let _ = responses.send(response);
            }

            ExportRequest::Shutdown => break,
        }
    }
}
