//! Export service - owns the worker thread and the cancellation flag

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use flume::{Receiver, Sender};

use super::backend::PdfBackend;
use super::batch::BatchOptions;
use super::error::BackendError;
use super::estimator::EstimatorConfig;
use super::extractor::ExtractorConfig;
use super::request::{ExportRequest, ExportResponse, RequestId};
use super::selection::CropSelection;
use super::worker::export_worker;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PendingRequest {
    Estimate,
    Preview,
    Extract,
    Batch,
    Dump,
}

/// Runs extraction off the calling thread. Every call returns immediately;
/// results come back as `ExportResponse`s.
pub struct ExportService {
    request_tx: Sender<ExportRequest>,
    response_rx: Receiver<ExportResponse>,
    next_request_id: u64,
    pending_requests: HashMap<RequestId, PendingRequest>,
    cancel: Arc<AtomicBool>,
}

impl ExportService {
    /// Spawn the worker. `open` runs on the worker thread and produces the
    /// document handle there.
    #[must_use]
    pub fn spawn<B, F>(open: F, estimator: EstimatorConfig, extractor: ExtractorConfig) -> Self
    where
        B: PdfBackend + 'static,
        F: FnOnce() -> Result<B, BackendError> + Send + 'static,
    {
        let (request_tx, request_rx) = flume::unbounded();
        let (response_tx, response_rx) = flume::unbounded();
        let cancel = Arc::new(AtomicBool::new(false));

        let worker_cancel = Arc::clone(&cancel);
        std::thread::spawn(move || {
            export_worker(
                open,
                estimator,
                extractor,
                request_rx,
                response_tx,
                worker_cancel,
            );
        });

        Self {
            request_tx,
            response_rx,
            next_request_id: 1,
            pending_requests: HashMap::new(),
            cancel,
        }
    }

    /// Spawn a worker on the PDF file at `path`
    #[cfg(feature = "pdf")]
    #[must_use]
    pub fn open_pdf(path: PathBuf, estimator: EstimatorConfig, extractor: ExtractorConfig) -> Self {
        Self::spawn(
            move || super::mupdf_backend::MupdfBackend::open(&path),
            estimator,
            extractor,
        )
    }

    pub fn estimate_scale(&mut self, page: usize) -> RequestId {
        let id = self.next_id();
        self.send(ExportRequest::EstimateScale { id, page }, id, PendingRequest::Estimate)
    }

    pub fn preview(&mut self, selection: CropSelection) -> RequestId {
        let id = self.next_id();
        self.send(ExportRequest::Preview { id, selection }, id, PendingRequest::Preview)
    }

    pub fn extract_crop(&mut self, selection: CropSelection, output: PathBuf) -> RequestId {
        let id = self.next_id();
        self.send(
            ExportRequest::ExtractCrop {
                id,
                selection,
                output,
            },
            id,
            PendingRequest::Extract,
        )
    }

    /// Queue a batch export. Clears any earlier cancellation.
    pub fn export_batch(&mut self, selections: Vec<CropSelection>, options: BatchOptions) -> RequestId {
        self.cancel.store(false, Ordering::Relaxed);
        let id = self.next_id();
        self.send(
            ExportRequest::ExportBatch {
                id,
                selections,
                options,
            },
            id,
            PendingRequest::Batch,
        )
    }

    pub fn dump_images(&mut self, out_dir: PathBuf) -> RequestId {
        let id = self.next_id();
        self.send(ExportRequest::DumpImages { id, out_dir }, id, PendingRequest::Dump)
    }

    /// Stop the running batch before its next crop
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Poll for worker responses without blocking
    pub fn poll_responses(&mut self) -> Vec<ExportResponse> {
        let mut responses = vec![];

        while let Ok(response) = self.response_rx.try_recv() {
            self.track(&response);
            responses.push(response);
        }

        responses
    }

    /// Block until the final response for `id` arrives, collecting every
    /// response received on the way (progress and other requests included).
    pub fn wait_for(&mut self, id: RequestId) -> Vec<ExportResponse> {
        let mut responses = vec![];

        while let Ok(response) = self.response_rx.recv() {
            self.track(&response);
            let done = response.request_id() == Some(id) && response.is_final();
            let worker_failed = matches!(
                response,
                ExportResponse::Error { id: RequestId(0), .. }
            );
            responses.push(response);
            if done || worker_failed {
                break;
            }
        }

        responses
    }

    /// Get the response receiver for async usage
    #[must_use]
    pub fn response_receiver(&self) -> &Receiver<ExportResponse> {
        &self.response_rx
    }

    /// Requests sent and not yet answered
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending_requests.len()
    }

    /// A batch export is queued or running
    #[must_use]
    pub fn is_batch_running(&self) -> bool {
        self.pending_requests
            .values()
            .any(|kind| *kind == PendingRequest::Batch)
    }

    pub fn shutdown(&self) {
        let _ = self.request_tx.send(ExportRequest::Shutdown);
    }

    fn send(&mut self, request: ExportRequest, id: RequestId, kind: PendingRequest) -> RequestId {
        let _ = self.request_tx.send(request);
        self.pending_requests.insert(id, kind);
        id
    }

    fn track(&mut self, response: &ExportResponse) {
        if !response.is_final() {
            return;
        }
        if let Some(id) = response.request_id() {
            self.pending_requests.remove(&id);
        }
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }
}

impl Drop for ExportService {
    fn drop(&mut self) {
        self.shutdown();
    }
}
