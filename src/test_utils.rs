pub mod test_helpers {
    use std::cell::RefCell;

    use crate::pdf::backend::{PageInspector, PageRenderer};
    use crate::pdf::coords;
    use crate::pdf::error::BackendError;
    use crate::pdf::types::{
        ContentBlock, ContentKind, DocumentMetadata, EmbeddedImage, PageSize, Raster, RawImage,
        Rect,
    };

    const SCALE_EPSILON: f32 = 1e-4;

    /// Scripted page for the fake backend
    #[derive(Clone, Debug)]
    pub struct FakePage {
        size: PageSize,
        images: Vec<EmbeddedImage>,
        blocks: Vec<ContentBlock>,
        raw_images: Vec<RawImage>,
        inspection_fails: bool,
        render_fails: bool,
        fail_at: Option<f32>,
        max_render_scale: Option<f32>,
        min_render_scale: Option<f32>,
        hidden_detail_above: Option<f32>,
    }

    impl FakePage {
        pub fn new(width: f32, height: f32) -> Self {
            Self {
                size: PageSize::new(width, height),
                images: Vec::new(),
                blocks: Vec::new(),
                raw_images: Vec::new(),
                inspection_fails: false,
                render_fails: false,
                fail_at: None,
                max_render_scale: None,
                min_render_scale: None,
                hidden_detail_above: None,
            }
        }

        /// US letter, 612x792 points
        pub fn letter() -> Self {
            Self::new(612.0, 792.0)
        }

        pub fn with_image(mut self, image: EmbeddedImage) -> Self {
            self.blocks
                .push(ContentBlock::new(ContentKind::Image, image.placement));
            self.images.push(image);
            self
        }

        /// Add `count` small text blocks down the left margin
        pub fn with_text_blocks(mut self, count: usize) -> Self {
            for i in 0..count {
                let top = 10.0 + i as f32 * 12.0;
                self.blocks.push(ContentBlock::new(
                    ContentKind::Text,
                    Rect::new(10.0, top, 200.0, top + 10.0),
                ));
            }
            self
        }

        pub fn with_drawable(mut self, bbox: Rect) -> Self {
            self.blocks.push(ContentBlock::new(ContentKind::Drawable, bbox));
            self
        }

        pub fn with_raw_image(mut self, image: RawImage) -> Self {
            self.raw_images.push(image);
            self
        }

        /// Image and block enumeration fail (page size still works)
        pub fn failing_inspection(mut self) -> Self {
            self.inspection_fails = true;
            self
        }

        /// Every render returns an error
        pub fn failing_render(mut self) -> Self {
            self.render_fails = true;
            self
        }

        /// Renders at exactly `scale` return an error
        pub fn failing_at(mut self, scale: f32) -> Self {
            self.fail_at = Some(scale);
            self
        }

        /// Renders above `scale` come back empty
        pub fn rendering_up_to(mut self, scale: f32) -> Self {
            self.max_render_scale = Some(scale);
            self
        }

        /// Renders below `scale` come back empty
        pub fn rendering_from(mut self, scale: f32) -> Self {
            self.min_render_scale = Some(scale);
            self
        }

        /// Vertical stripes one point apart that only show up when rendered
        /// above `scale`; below it the page is blank
        pub fn with_hidden_detail_above(mut self, scale: f32) -> Self {
            self.hidden_detail_above = Some(scale);
            self
        }

        pub fn size(&self) -> PageSize {
            self.size
        }
    }

    /// In-memory document implementing both backend traits
    pub struct FakeDocument {
        pages: Vec<FakePage>,
        metadata: DocumentMetadata,
        render_calls: RefCell<Vec<(usize, f32)>>,
    }

    impl FakeDocument {
        pub fn new(pages: Vec<FakePage>) -> Self {
            Self {
                pages,
                metadata: DocumentMetadata::default(),
                render_calls: RefCell::new(Vec::new()),
            }
        }

        /// `count` blank letter pages
        pub fn blank(count: usize) -> Self {
            Self::new(vec![FakePage::letter(); count])
        }

        pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
            self.metadata = metadata;
            self
        }

        /// `(page, scale)` of every render call so far
        pub fn render_calls(&self) -> Vec<(usize, f32)> {
            self.render_calls.borrow().clone()
        }

        fn page(&self, page: usize) -> Result<&FakePage, BackendError> {
            self.pages.get(page).ok_or(BackendError::PageOutOfRange {
                page,
                count: self.pages.len(),
            })
        }

        fn inspected(&self, page: usize) -> Result<&FakePage, BackendError> {
            let fake = self.page(page)?;
            if fake.inspection_fails {
                return Err(BackendError::generic(format!(
                    "corrupt content stream on page {page}"
                )));
            }
            Ok(fake)
        }
    }

    impl PageRenderer for FakeDocument {
        fn render(&self, page: usize, scale: f32, clip: &Rect) -> Result<Raster, BackendError> {
            self.render_calls.borrow_mut().push((page, scale));
            let fake = self.page(page)?;

            if fake.render_fails {
                return Err(BackendError::generic("renderer crashed"));
            }
            if fake
                .fail_at
                .is_some_and(|s| (s - scale).abs() < SCALE_EPSILON)
            {
                return Err(BackendError::generic(format!("renderer crashed at {scale}")));
            }
            if fake.max_render_scale.is_some_and(|m| scale > m + SCALE_EPSILON)
                || fake.min_render_scale.is_some_and(|m| scale < m - SCALE_EPSILON)
            {
                return Ok(Raster::default());
            }

            let (width, height) = coords::output_dimensions(clip, scale);
            let striped = fake.hidden_detail_above.is_some_and(|t| scale > t);
            let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
            for _ in 0..height {
                for x in 0..width {
                    let page_x = clip.left + (x as f32 + 0.5) / scale;
                    let value = if striped && page_x.fract() < 0.5 { 0 } else { 255 };
                    pixels.extend_from_slice(&[value, value, value]);
                }
            }
            Ok(Raster::new(width, height, pixels))
        }
    }

    impl PageInspector for FakeDocument {
        fn page_count(&self) -> usize {
            self.pages.len()
        }

        fn page_size(&self, page: usize) -> Result<PageSize, BackendError> {
            Ok(self.page(page)?.size)
        }

        fn embedded_images(&self, page: usize) -> Result<Vec<EmbeddedImage>, BackendError> {
            Ok(self.inspected(page)?.images.clone())
        }

        fn content_blocks(&self, page: usize) -> Result<Vec<ContentBlock>, BackendError> {
            Ok(self.inspected(page)?.blocks.clone())
        }

        fn raw_images(&self, page: usize) -> Result<Vec<RawImage>, BackendError> {
            Ok(self.inspected(page)?.raw_images.clone())
        }

        fn metadata(&self) -> DocumentMetadata {
            self.metadata.clone()
        }
    }
}
