//! MuPDF rasterizer with lopdf structure inspection

use std::path::Path;

use log::{debug, warn};
use mupdf::{Colorspace, Device, Document, Matrix, Pixmap, TextBlockType, TextPageFlags};

use super::backend::{PageInspector, PageRenderer};
use super::coords;
use super::error::BackendError;
use super::structure::{self, PageStructure};
use super::types::{
    ContentBlock, ContentKind, DocumentMetadata, EmbeddedImage, PageSize, Raster, RawImage, Rect,
};

/// An open PDF. Not `Send`: create it on the thread that uses it.
pub struct MupdfBackend {
    doc: Document,
    page_count: usize,
    /// Page object ids in page order, absent when lopdf cannot parse the file
    structure: Option<(lopdf::Document, Vec<lopdf::ObjectId>)>,
}

impl MupdfBackend {
    pub fn open(path: &Path) -> Result<Self, BackendError> {
        let doc = Document::open(path.to_string_lossy().as_ref())?;
        let page_count = usize::try_from(doc.page_count()?)
            .map_err(|_| BackendError::generic("negative page count"))?;

        let structure = match lopdf::Document::load(path) {
            Ok(parsed) => {
                let pages = parsed.get_pages().into_values().collect();
                Some((parsed, pages))
            }
            Err(e) => {
                warn!(
                    "Structure parse failed for {}: {e}; image inspection disabled",
                    path.display()
                );
                None
            }
        };

        debug!("Opened {} ({page_count} pages)", path.display());
        Ok(Self {
            doc,
            page_count,
            structure,
        })
    }

    fn load_page(&self, page: usize) -> Result<mupdf::Page, BackendError> {
        self.check_page(page)?;
        let index = i32::try_from(page).map_err(|_| BackendError::generic("page index overflow"))?;
        Ok(self.doc.load_page(index)?)
    }

    fn page_object(&self, page: usize) -> Result<(&lopdf::Document, lopdf::ObjectId), BackendError> {
        self.check_page(page)?;
        let (parsed, pages) = self
            .structure
            .as_ref()
            .ok_or_else(|| BackendError::generic("document structure unavailable"))?;
        let page_id = pages
            .get(page)
            .copied()
            .ok_or_else(|| BackendError::generic(format!("page {page} missing from page tree")))?;
        Ok((parsed, page_id))
    }

    fn inspect(&self, page: usize) -> Result<PageStructure, BackendError> {
        let (parsed, page_id) = self.page_object(page)?;
        structure::inspect_page(parsed, page_id)
    }
}

impl PageRenderer for MupdfBackend {
    fn render(&self, page: usize, scale: f32, clip: &Rect) -> Result<Raster, BackendError> {
        let loaded = self.load_page(page)?;
        let bounds = loaded.bounds()?;
        let (width, height) = coords::output_dimensions(clip, scale);
        if width == 0 || height == 0 {
            return Ok(Raster::default());
        }
        let w = i32::try_from(width).map_err(|_| BackendError::generic("raster too wide"))?;
        let h = i32::try_from(height).map_err(|_| BackendError::generic("raster too tall"))?;

        // Page origin shifted so the clip's top-left lands on pixel (0, 0)
        let transform = Matrix::new(
            scale,
            0.0,
            0.0,
            scale,
            -(bounds.x0 + clip.left) * scale,
            -(bounds.y0 + clip.top) * scale,
        );

        let mut pixmap = Pixmap::new_with_w_h(&Colorspace::device_rgb(), w, h, false)?;
        pixmap.clear_with(0xff)?;
        {
            let device = Device::from_pixmap(&pixmap)?;
            loaded.run(&device, &transform)?;
        }

        let pixels = pixmap_to_rgb(&pixmap)?;
        Ok(Raster::new(width, height, pixels))
    }
}

impl PageInspector for MupdfBackend {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, page: usize) -> Result<PageSize, BackendError> {
        let bounds = self.load_page(page)?.bounds()?;
        Ok(PageSize::new(bounds.x1 - bounds.x0, bounds.y1 - bounds.y0))
    }

    fn embedded_images(&self, page: usize) -> Result<Vec<EmbeddedImage>, BackendError> {
        Ok(self.inspect(page)?.images)
    }

    fn content_blocks(&self, page: usize) -> Result<Vec<ContentBlock>, BackendError> {
        let loaded = self.load_page(page)?;
        let bounds = loaded.bounds()?;
        let text_page = loaded.to_text_page(TextPageFlags::PRESERVE_IMAGES)?;

        let mut blocks: Vec<ContentBlock> = text_page
            .blocks()
            .filter_map(|block| {
                let kind = match block.r#type() {
                    TextBlockType::Text => ContentKind::Text,
                    TextBlockType::Image => ContentKind::Image,
                    _ => return None,
                };
                let bbox = block.bounds();
                Some(ContentBlock::new(
                    kind,
                    Rect::new(
                        bbox.x0 - bounds.x0,
                        bbox.y0 - bounds.y0,
                        bbox.x1 - bounds.x0,
                        bbox.y1 - bounds.y0,
                    ),
                ))
            })
            .collect();

        match self.inspect(page) {
            Ok(structure) => blocks.extend(
                structure
                    .drawables
                    .into_iter()
                    .map(|bbox| ContentBlock::new(ContentKind::Drawable, bbox)),
            ),
            Err(e) => debug!("page {page}: no drawable scan ({e})"),
        }
        Ok(blocks)
    }

    fn raw_images(&self, page: usize) -> Result<Vec<RawImage>, BackendError> {
        let (parsed, page_id) = self.page_object(page)?;
        structure::raw_images(parsed, page_id)
    }

    fn metadata(&self) -> DocumentMetadata {
        let field = |name| {
            self.doc
                .metadata(name)
                .ok()
                .filter(|value: &String| !value.is_empty())
        };
        DocumentMetadata {
            title: field(mupdf::MetadataName::Title),
            author: field(mupdf::MetadataName::Author),
            subject: field(mupdf::MetadataName::Subject),
            creator: field(mupdf::MetadataName::Creator),
            producer: field(mupdf::MetadataName::Producer),
            encrypted: self.doc.needs_password().unwrap_or(false),
        }
    }
}

fn pixmap_to_rgb(pixmap: &Pixmap) -> Result<Vec<u8>, BackendError> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(BackendError::generic(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(BackendError::generic("Pixmap buffer size mismatch"));
    }

    let mut out = Vec::with_capacity(width * height * 3);
    for row in samples.chunks(stride).take(height) {
        let row = &row[..row_bytes];
        if n == 3 {
            out.extend_from_slice(row);
        } else {
            for px in row.chunks_exact(n) {
                out.extend_from_slice(&px[..3]);
            }
        }
    }

    Ok(out)
}
