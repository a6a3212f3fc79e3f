//! Sequential batch export of crop selections

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use log::{error, info, warn};
use serde::Serialize;

use super::backend::PdfBackend;
use super::error::ExtractionError;
use super::extractor::{CropExtractor, ExtractionResult};
use super::naming::{NamingPattern, sanitize_filename, unique_path};
use super::selection::CropSelection;

/// Where and how a batch is written
#[derive(Clone, Debug)]
pub struct BatchOptions {
    pub out_dir: PathBuf,
    pub pattern: NamingPattern,
    /// Document stem for `{doc}`
    pub document: String,
}

/// Outcome of one selection in a batch
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Exported { result: ExtractionResult },
    Failed { error: String },
}

#[derive(Clone, Debug, Serialize)]
pub struct BatchItem {
    /// Position in the selection list
    pub index: usize,
    pub label: String,
    pub outcome: BatchOutcome,
}

impl BatchItem {
    #[must_use]
    pub fn is_exported(&self) -> bool {
        matches!(self.outcome, BatchOutcome::Exported { .. })
    }
}

/// Partial-success summary of a batch
#[derive(Clone, Debug, Default, Serialize)]
pub struct BatchReport {
    pub exported: usize,
    pub total: usize,
    pub items: Vec<BatchItem>,
    /// Stopped early by the cancellation flag
    pub cancelled: bool,
}

impl BatchReport {
    #[must_use]
    pub fn failed(&self) -> usize {
        self.items.len() - self.exported
    }

    /// Paths written, in selection order
    pub fn written_paths(&self) -> impl Iterator<Item = &Path> {
        self.items.iter().filter_map(|item| match &item.outcome {
            BatchOutcome::Exported { result } => Some(result.path.as_path()),
            BatchOutcome::Failed { .. } => None,
        })
    }
}

/// File stem for the selection at `index`: the user's label when renamed,
/// otherwise the naming pattern for its ordinal
#[must_use]
pub fn file_stem_for(selection: &CropSelection, index: usize, options: &BatchOptions) -> String {
    if selection.auto_named {
        options.pattern.render(index + 1, &options.document)
    } else {
        sanitize_filename(&selection.label)
    }
}

/// Export every selection in order. Failures are recorded per item and never
/// stop the batch; `cancel` is checked before each crop. `on_item` runs after
/// each crop with the item and the number processed so far.
pub fn export_batch<B, F>(
    extractor: &mut CropExtractor,
    backend: &B,
    selections: &[CropSelection],
    options: &BatchOptions,
    cancel: &AtomicBool,
    mut on_item: F,
) -> Result<BatchReport, ExtractionError>
where
    B: PdfBackend + ?Sized,
    F: FnMut(&BatchItem, usize),
{
    std::fs::create_dir_all(&options.out_dir)?;

    let mut report = BatchReport {
        total: selections.len(),
        ..BatchReport::default()
    };

    for (index, selection) in selections.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            warn!("Batch export cancelled after {index} of {} crops", selections.len());
            report.cancelled = true;
            break;
        }

        let stem = file_stem_for(selection, index, options);
        let path = unique_path(&options.out_dir.join(format!("{stem}.png")));

        let outcome = match extractor.extract(backend, selection, &path) {
            Ok(result) => {
                report.exported += 1;
                BatchOutcome::Exported { result }
            }
            Err(e) => {
                if e.is_item_local() {
                    warn!("Skipping crop {} ({}): {e}", index + 1, selection.label);
                } else {
                    error!("Failed to write crop {} ({}): {e}", index + 1, selection.label);
                }
                BatchOutcome::Failed {
                    error: e.to_string(),
                }
            }
        };

        let item = BatchItem {
            index,
            label: selection.label.clone(),
            outcome,
        };
        on_item(&item, index + 1);
        report.items.push(item);
    }

    info!(
        "Exported {}/{} crops to {}",
        report.exported,
        report.total,
        options.out_dir.display()
    );
    Ok(report)
}
