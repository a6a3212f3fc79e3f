//! Document-level summary for the info report

use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;

use super::backend::PageInspector;
use super::error::BackendError;
use super::naming::format_file_size;
use super::types::{DocumentMetadata, PageInfo};

#[derive(Clone, Debug, Serialize)]
pub struct DocumentSummary {
    pub file_name: String,
    pub file_size: String,
    pub modified: Option<DateTime<Local>>,
    pub page_count: usize,
    pub encrypted: bool,
    pub first_page: Option<PageInfo>,
    pub metadata: DocumentMetadata,
}

impl DocumentSummary {
    /// `label: value` lines, metadata fields only when present
    #[must_use]
    pub fn lines(&self) -> Vec<(&'static str, String)> {
        let mut lines = vec![
            ("File", self.file_name.clone()),
            ("Size", self.file_size.clone()),
        ];
        if let Some(modified) = self.modified {
            lines.push(("Modified", modified.format("%Y-%m-%d %H:%M").to_string()));
        }
        lines.push(("Pages", self.page_count.to_string()));
        lines.push(("Encrypted", if self.encrypted { "yes" } else { "no" }.to_string()));
        if let Some(page) = self.first_page {
            lines.push((
                "Page size",
                format!(
                    "{:.1} x {:.1} pt ({:.2} x {:.2} in)",
                    page.width_pt, page.height_pt, page.width_in, page.height_in
                ),
            ));
        }

        let meta = &self.metadata;
        for (label, value) in [
            ("Title", &meta.title),
            ("Author", &meta.author),
            ("Subject", &meta.subject),
            ("Creator", &meta.creator),
            ("Producer", &meta.producer),
        ] {
            if let Some(value) = value {
                lines.push((label, value.clone()));
            }
        }
        lines
    }
}

/// Summarize the document at `path`. File system facts that cannot be read
/// are left out rather than failing the summary.
pub fn document_summary<B: PageInspector + ?Sized>(
    backend: &B,
    path: &Path,
) -> Result<DocumentSummary, BackendError> {
    let fs_meta = std::fs::metadata(path).ok();
    let file_size = fs_meta.as_ref().map_or(0, std::fs::Metadata::len);
    let modified = fs_meta
        .and_then(|m| m.modified().ok())
        .map(DateTime::<Local>::from);

    let page_count = backend.page_count();
    let first_page = if page_count > 0 {
        Some(PageInfo::new(0, backend.page_size(0)?))
    } else {
        None
    };
    let metadata = backend.metadata();

    Ok(DocumentSummary {
        file_name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        file_size: format_file_size(file_size),
        modified,
        page_count,
        encrypted: metadata.encrypted,
        first_page,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::FakeDocument;
    use tempfile::TempDir;

    #[test]
    fn summary_of_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("paper.pdf");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let doc = FakeDocument::blank(3).with_metadata(DocumentMetadata {
            title: Some("Results".to_string()),
            ..DocumentMetadata::default()
        });
        let summary = document_summary(&doc, &path).unwrap();

        assert_eq!(summary.file_name, "paper.pdf");
        assert_eq!(summary.file_size, "2.0 KB");
        assert!(summary.modified.is_some());
        assert_eq!(summary.page_count, 3);
        let first = summary.first_page.unwrap();
        assert!((first.width_in - 8.5).abs() < 1e-4);

        let lines = summary.lines();
        assert!(lines.contains(&("Title", "Results".to_string())));
        assert!(!lines.iter().any(|(label, _)| *label == "Author"));
    }

    #[test]
    fn missing_file_still_summarizes() {
        let doc = FakeDocument::blank(0);
        let summary = document_summary(&doc, Path::new("/nonexistent/x.pdf")).unwrap();
        assert_eq!(summary.file_size, "0 B");
        assert!(summary.modified.is_none());
        assert!(summary.first_page.is_none());
    }
}
