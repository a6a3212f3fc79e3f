//! Verbatim dump of embedded image objects

use std::path::{Path, PathBuf};

use log::{info, warn};

use super::backend::PageInspector;
use super::error::ExtractionError;

/// Write every embedded image of every page to `out_dir` as
/// `page_<p>_image_<i>.<ext>` (both 1-based). Pages whose images cannot be
/// read are skipped with a warning.
pub fn extract_all_embedded_images<B: PageInspector + ?Sized>(
    backend: &B,
    out_dir: &Path,
) -> Result<Vec<PathBuf>, ExtractionError> {
    std::fs::create_dir_all(out_dir)?;
    let mut written = Vec::new();

    for page in 0..backend.page_count() {
        let images = match backend.raw_images(page) {
            Ok(images) => images,
            Err(e) => {
                warn!("Skipping images of page {}: {e}", page + 1);
                continue;
            }
        };

        for (index, image) in images.iter().enumerate() {
            let name = format!(
                "page_{}_image_{}.{}",
                page + 1,
                index + 1,
                image.format.extension()
            );
            let path = out_dir.join(name);
            std::fs::write(&path, &image.data)?;
            written.push(path);
        }
    }

    info!("Wrote {} embedded images to {}", written.len(), out_dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::types::{RawImage, RawImageFormat};
    use crate::test_utils::test_helpers::{FakeDocument, FakePage};

    #[test]
    fn names_follow_page_and_index() {
        let dir = tempfile::tempdir().expect("temp dir");
        let jpeg = RawImage {
            data: vec![0xFF, 0xD8, 0xFF],
            format: RawImageFormat::Jpeg,
        };
        let png = RawImage {
            data: vec![0x89, b'P', b'N', b'G'],
            format: RawImageFormat::Png,
        };
        let doc = FakeDocument::new(vec![
            FakePage::letter().with_raw_image(jpeg.clone()),
            FakePage::letter().failing_inspection(),
            FakePage::letter().with_raw_image(png).with_raw_image(jpeg),
        ]);

        let written = extract_all_embedded_images(&doc, dir.path()).expect("dump");
        let names: Vec<_> = written
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            ["page_1_image_1.jpg", "page_3_image_1.png", "page_3_image_2.jpg"]
        );
        assert_eq!(
            std::fs::read(dir.path().join("page_1_image_1.jpg")).expect("read"),
            vec![0xFF, 0xD8, 0xFF]
        );
    }
}
