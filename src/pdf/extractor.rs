//! Crop extraction
//!
//! Resolves a selection to a clamped page-space rectangle, asks the
//! estimator for a scale, renders, and writes the result. Rendering falls
//! back in three tiers: the estimated scale, one retry at a moderate fixed
//! scale, then the emergency ladder from the highest rung down.

use std::fmt;
use std::path::{Path, PathBuf};

use image::RgbImage;
use image::imageops::{self, FilterType};
use log::{debug, info, warn};
use serde::{Serialize, Serializer};

use super::backend::PdfBackend;
use super::coords;
use super::encode::{self, OutputEncoding};
use super::error::ExtractionError;
use super::estimator::{EstimatorConfig, NativeResolutionEstimator, ScaleEstimate};
use super::naming::unique_path;
use super::selection::CropSelection;
use super::types::{POINTS_PER_INCH, PageInfo, Raster, Rect};

pub const DEFAULT_FALLBACK_SCALE: f32 = 3.0;
pub const DEFAULT_EMERGENCY_LADDER: [f32; 5] = [12.0, 8.0, 6.0, 4.0, 2.0];
/// 100 MiB of uncompressed RGB
pub const DEFAULT_LOSSY_THRESHOLD: u64 = 100 * 1024 * 1024;
pub const DEFAULT_JPEG_QUALITY: u8 = 95;
/// Scale of the on-screen crop preview
pub const PREVIEW_SCALE: f32 = 1.5;

#[derive(Clone, Debug, PartialEq)]
pub struct ExtractorConfig {
    /// Single retry scale after the estimated render fails
    pub fallback_scale: f32,
    /// Strictly descending scales tried after the fallback
    pub emergency_ladder: Vec<f32>,
    /// Projected uncompressed size above which output turns lossy
    pub lossy_threshold_bytes: u64,
    pub jpeg_quality: u8,
    pub preview_scale: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            fallback_scale: DEFAULT_FALLBACK_SCALE,
            emergency_ladder: DEFAULT_EMERGENCY_LADDER.to_vec(),
            lossy_threshold_bytes: DEFAULT_LOSSY_THRESHOLD,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            preview_scale: PREVIEW_SCALE,
        }
    }
}

/// Drop non-positive rungs, sort descending, remove duplicates
#[must_use]
pub fn normalize_ladder(ladder: &[f32]) -> Vec<f32> {
    let mut rungs: Vec<f32> = ladder
        .iter()
        .copied()
        .filter(|s| s.is_finite() && *s > 0.0)
        .collect();
    rungs.sort_by(|a, b| b.total_cmp(a));
    rungs.dedup();
    rungs
}

/// Quality classification by achieved DPI
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum QualityRating {
    Poor,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

impl QualityRating {
    #[must_use]
    pub fn from_dpi(dpi: f32) -> Self {
        if dpi >= 600.0 {
            QualityRating::Excellent
        } else if dpi >= 300.0 {
            QualityRating::VeryGood
        } else if dpi >= 200.0 {
            QualityRating::Good
        } else if dpi >= 150.0 {
            QualityRating::Fair
        } else {
            QualityRating::Poor
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            QualityRating::Excellent => "excellent",
            QualityRating::VeryGood => "very good",
            QualityRating::Good => "good",
            QualityRating::Fair => "fair",
            QualityRating::Poor => "poor",
        }
    }
}

impl fmt::Display for QualityRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for QualityRating {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

/// Printed size in inches
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PhysicalSize {
    pub width_in: f32,
    pub height_in: f32,
}

impl PhysicalSize {
    #[must_use]
    pub fn from_pixels(width: u32, height: u32, dpi: f32) -> Self {
        Self {
            width_in: width as f32 / dpi,
            height_in: height as f32 / dpi,
        }
    }
}

/// Which rendering tier produced the raster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderTier {
    Estimated,
    Fallback,
    Emergency,
}

/// Successful render of a crop
#[derive(Debug)]
pub struct RenderedCrop {
    pub raster: Raster,
    pub scale: f32,
    pub tier: RenderTier,
    /// Every scale tried, in order
    pub attempts: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ExtractionResult {
    pub page: usize,
    pub page_rect: Rect,
    pub scale: f32,
    pub dpi: f32,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub physical: PhysicalSize,
    pub quality: QualityRating,
    pub encoding: OutputEncoding,
    pub tier: RenderTier,
    pub path: PathBuf,
}

/// What an extraction would produce, computed without rendering
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PreviewInfo {
    pub page: usize,
    pub page_rect: Rect,
    pub scale: f32,
    pub dpi: f32,
    pub pixel_width: u32,
    pub pixel_height: u32,
    pub physical: PhysicalSize,
    pub quality: QualityRating,
    pub encoding: OutputEncoding,
    pub file_size_estimate: u64,
}

/// Orchestrates estimation, clamping, rendering and encoding
pub struct CropExtractor {
    estimator: NativeResolutionEstimator,
    config: ExtractorConfig,
}

impl CropExtractor {
    #[must_use]
    pub fn new(estimator: EstimatorConfig, mut config: ExtractorConfig) -> Self {
        config.emergency_ladder = normalize_ladder(&config.emergency_ladder);
        Self {
            estimator: NativeResolutionEstimator::new(estimator),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn estimator_mut(&mut self) -> &mut NativeResolutionEstimator {
        &mut self.estimator
    }

    /// Full scale estimate for a page (probe included, cached)
    pub fn estimate_scale<B: PdfBackend + ?Sized>(&mut self, backend: &B, page: usize) -> ScaleEstimate {
        self.estimator.estimate(backend, page)
    }

    pub fn page_info<B: PdfBackend + ?Sized>(
        &self,
        backend: &B,
        page: usize,
    ) -> Result<PageInfo, ExtractionError> {
        backend.check_page(page)?;
        Ok(PageInfo::new(page, backend.page_size(page)?))
    }

    /// Selection's page rectangle clamped to its page
    pub fn clamped_rect<B: PdfBackend + ?Sized>(
        &self,
        backend: &B,
        selection: &CropSelection,
    ) -> Result<Rect, ExtractionError> {
        let page = selection.page_index;
        backend.check_page(page)?;
        let size = backend.page_size(page)?;
        coords::clamp_to_page(&selection.resolve_page_rect(), size)
            .map_err(|e| ExtractionError::invalid_region(page, e))
    }

    /// Output prediction for the selection. Never renders: uses a cached
    /// estimate when one exists, the static signals otherwise.
    pub fn preview_info<B: PdfBackend + ?Sized>(
        &mut self,
        backend: &B,
        selection: &CropSelection,
    ) -> Result<PreviewInfo, ExtractionError> {
        let rect = self.clamped_rect(backend, selection)?;
        let scale = self.estimator.estimate_static(backend, selection.page_index).scale;
        let (pixel_width, pixel_height) = coords::output_dimensions(&rect, scale);
        let dpi = POINTS_PER_INCH * scale;
        let encoding = self.choose_encoding(pixel_width, pixel_height);

        Ok(PreviewInfo {
            page: selection.page_index,
            page_rect: rect,
            scale,
            dpi,
            pixel_width,
            pixel_height,
            physical: PhysicalSize::from_pixels(pixel_width, pixel_height, dpi),
            quality: QualityRating::from_dpi(dpi),
            encoding,
            file_size_estimate: encoding.estimate_size(pixel_width, pixel_height),
        })
    }

    /// Render `rect` of `page` at `scale`, falling back through the retry
    /// scale and the emergency ladder. The retry is skipped when it equals
    /// `scale`. The ladder ignores any scale cap.
    pub fn render_crop<B: PdfBackend + ?Sized>(
        &self,
        backend: &B,
        page: usize,
        rect: &Rect,
        scale: f32,
    ) -> Result<RenderedCrop, ExtractionError> {
        let mut attempts = Vec::new();

        let retry = self.config.fallback_scale;
        let retry =
            ((retry - scale).abs() > f32::EPSILON).then_some((retry, RenderTier::Fallback));
        let tiers = std::iter::once((scale, RenderTier::Estimated))
            .chain(retry)
            .chain(
                self.config
                    .emergency_ladder
                    .iter()
                    .map(|s| (*s, RenderTier::Emergency)),
            );

        for (candidate, tier) in tiers {
            attempts.push(candidate);
            match render_once(backend, page, rect, candidate) {
                Ok(raster) => {
                    if tier != RenderTier::Estimated {
                        warn!(
                            "page {page}: recovered with {tier:?} render at scale {candidate:.2} after {} attempts",
                            attempts.len()
                        );
                    }
                    return Ok(RenderedCrop {
                        raster,
                        scale: candidate,
                        tier,
                        attempts,
                    });
                }
                Err(e) => warn!("page {page}: {tier:?} render failed: {e}"),
            }
        }

        Err(ExtractionError::ExtractionFailed {
            page,
            attempts: attempts.len(),
        })
    }

    /// Extract one selection to `output_path`.
    ///
    /// When the output turns lossy the extension is switched to `.jpg`; if
    /// that name is taken a unique variant is used. The written path is in
    /// the result.
    pub fn extract<B: PdfBackend + ?Sized>(
        &mut self,
        backend: &B,
        selection: &CropSelection,
        output_path: &Path,
    ) -> Result<ExtractionResult, ExtractionError> {
        let page = selection.page_index;
        let rect = self.clamped_rect(backend, selection)?;
        let estimate = self.estimator.estimate(backend, page);
        debug!("page {page}: extracting {rect} at estimated scale {:.3}", estimate.scale);

        let rendered = self.render_crop(backend, page, &rect, estimate.scale)?;
        let (width, height) = (rendered.raster.width, rendered.raster.height);
        let dpi = POINTS_PER_INCH * rendered.scale;
        let encoding = self.choose_encoding(width, height);

        let path = if encoding.is_lossy() {
            let swapped = encode::with_encoding_extension(output_path, encoding);
            if swapped == output_path {
                swapped
            } else {
                unique_path(&swapped)
            }
        } else {
            output_path.to_path_buf()
        };
        if encoding.is_lossy() {
            info!(
                "{width}x{height} crop exceeds {} bytes uncompressed, writing lossy {}",
                self.config.lossy_threshold_bytes,
                path.display()
            );
        }

        encode::write_raster(&rendered.raster, dpi, encoding, &path)?;

        let quality = QualityRating::from_dpi(dpi);
        info!(
            "Extracted page {} region {} at {:.0} DPI ({}x{}, {}) to {}",
            page + 1,
            rect,
            dpi,
            width,
            height,
            quality,
            path.display()
        );

        Ok(ExtractionResult {
            page,
            page_rect: rect,
            scale: rendered.scale,
            dpi,
            pixel_width: width,
            pixel_height: height,
            physical: PhysicalSize::from_pixels(width, height, dpi),
            quality,
            encoding,
            tier: rendered.tier,
            path,
        })
    }

    /// Small preview of the selection, fitted into `max_width` x `max_height`
    pub fn preview_thumbnail<B: PdfBackend + ?Sized>(
        &self,
        backend: &B,
        selection: &CropSelection,
        max_width: u32,
        max_height: u32,
    ) -> Result<RgbImage, ExtractionError> {
        let page = selection.page_index;
        let rect = self.clamped_rect(backend, selection)?;
        let scale = self.config.preview_scale;
        let raster = render_once(backend, page, &rect, scale)?;

        let (width, height) = (raster.width, raster.height);
        let mut pixels = raster.pixels;
        pixels.truncate(width as usize * height as usize * 3);
        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
            ExtractionError::RenderFailure {
                page,
                scale,
                detail: "pixel buffer does not match dimensions".to_string(),
            }
        })?;

        let (fit_w, fit_h) = fit_within(width, height, max_width.max(1), max_height.max(1));
        if (fit_w, fit_h) == (width, height) {
            return Ok(image);
        }
        Ok(imageops::resize(&image, fit_w, fit_h, FilterType::Lanczos3))
    }

    fn choose_encoding(&self, width: u32, height: u32) -> OutputEncoding {
        OutputEncoding::choose(
            width,
            height,
            self.config.lossy_threshold_bytes,
            self.config.jpeg_quality,
        )
    }
}

fn render_once<B: PdfBackend + ?Sized>(
    backend: &B,
    page: usize,
    rect: &Rect,
    scale: f32,
) -> Result<Raster, ExtractionError> {
    debug!("page {page}: render {rect} at scale {scale:.3}");
    match backend.render(page, scale, rect) {
        Ok(raster) if raster.is_valid() => Ok(raster),
        Ok(raster) => Err(ExtractionError::RenderFailure {
            page,
            scale,
            detail: format!("empty raster {}x{}", raster.width, raster.height),
        }),
        Err(e) => Err(ExtractionError::RenderFailure {
            page,
            scale,
            detail: e.to_string(),
        }),
    }
}

/// Largest size with the same aspect ratio inside the bounds, never upscaled
fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let ratio = (max_width as f32 / width as f32).min(max_height as f32 / height as f32);
    (
        ((width as f32 * ratio).round() as u32).max(1),
        ((height as f32 * ratio).round() as u32).max(1),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::estimator::ScalePolicy;
    use crate::test_utils::test_helpers::{FakeDocument, FakePage};

    fn no_probe() -> EstimatorConfig {
        EstimatorConfig {
            probe_enabled: false,
            ..EstimatorConfig::default()
        }
    }

    fn selection(page: usize, rect: Rect) -> CropSelection {
        let mut selection = CropSelection::legacy(1, page, Rect::default(), 1.0, "crop");
        selection.page_rect = Some(rect);
        selection
    }

    #[test]
    fn quality_thresholds() {
        let ratings: Vec<_> = [600.0, 300.0, 200.0, 150.0, 72.0]
            .into_iter()
            .map(|dpi| QualityRating::from_dpi(dpi).label())
            .collect();
        assert_eq!(ratings, ["excellent", "very good", "good", "fair", "poor"]);
        assert_eq!(QualityRating::from_dpi(599.9), QualityRating::VeryGood);
    }

    #[test]
    fn ladder_is_normalized() {
        assert_eq!(
            normalize_ladder(&[2.0, 12.0, 6.0, 6.0, -1.0, f32::NAN, 8.0]),
            vec![12.0, 8.0, 6.0, 2.0]
        );
    }

    #[test]
    fn crop_at_scale_four() {
        let doc = FakeDocument::new(vec![FakePage::letter()]);
        let extractor = CropExtractor::new(no_probe(), ExtractorConfig::default());
        let rendered = extractor
            .render_crop(&doc, 0, &Rect::new(10.0, 10.0, 20.0, 20.0), 4.0)
            .expect("renders");
        assert_eq!((rendered.raster.width, rendered.raster.height), (40, 40));
        assert_eq!(rendered.tier, RenderTier::Estimated);
        assert_eq!(POINTS_PER_INCH * rendered.scale, 288.0);
    }

    #[test]
    fn single_retry_at_fallback_scale() {
        let doc = FakeDocument::new(vec![FakePage::letter().rendering_up_to(3.0)]);
        let extractor = CropExtractor::new(no_probe(), ExtractorConfig::default());
        let rendered = extractor
            .render_crop(&doc, 0, &Rect::new(0.0, 0.0, 10.0, 10.0), 6.0)
            .expect("fallback renders");
        assert_eq!(rendered.tier, RenderTier::Fallback);
        assert_eq!(rendered.attempts, vec![6.0, 3.0]);
    }

    #[test]
    fn retry_skipped_when_estimate_is_fallback_scale() {
        let doc = FakeDocument::new(vec![FakePage::letter().failing_at(3.0)]);
        let extractor = CropExtractor::new(no_probe(), ExtractorConfig::default());
        let rendered = extractor
            .render_crop(&doc, 0, &Rect::new(0.0, 0.0, 10.0, 10.0), 3.0)
            .expect("ladder renders");
        assert_eq!(rendered.tier, RenderTier::Emergency);
        assert_eq!(rendered.attempts, vec![3.0, 12.0]);
        assert_eq!(doc.render_calls(), vec![(0, 3.0), (0, 12.0)]);
    }

    #[test]
    fn ladder_descends_and_stops_at_first_success() {
        let doc = FakeDocument::new(vec![FakePage::letter().rendering_up_to(6.0).failing_at(3.0)]);
        let extractor = CropExtractor::new(no_probe(), ExtractorConfig::default());
        let rendered = extractor
            .render_crop(&doc, 0, &Rect::new(0.0, 0.0, 10.0, 10.0), 7.0)
            .expect("ladder renders");
        assert_eq!(rendered.tier, RenderTier::Emergency);
        assert_eq!(rendered.scale, 6.0);
        assert_eq!(rendered.attempts, vec![7.0, 3.0, 12.0, 8.0, 6.0]);
        let scales: Vec<f32> = doc.render_calls().iter().map(|(_, s)| *s).collect();
        assert_eq!(scales, vec![7.0, 3.0, 12.0, 8.0, 6.0]);
    }

    #[test]
    fn exhausted_ladder_reports_failure() {
        let doc = FakeDocument::new(vec![FakePage::letter().failing_render()]);
        let extractor = CropExtractor::new(no_probe(), ExtractorConfig::default());
        let err = extractor
            .render_crop(&doc, 0, &Rect::new(0.0, 0.0, 10.0, 10.0), 4.0)
            .expect_err("nothing renders");
        assert!(matches!(
            err,
            ExtractionError::ExtractionFailed { page: 0, attempts: 7 }
        ));
    }

    #[test]
    fn ladder_ignores_scale_cap() {
        let estimator = EstimatorConfig {
            policy: ScalePolicy::Capped { max_scale: 4.0 },
            ..no_probe()
        };
        let doc = FakeDocument::new(vec![FakePage::letter().rendering_from(10.0)]);
        let extractor = CropExtractor::new(estimator, ExtractorConfig::default());
        let rendered = extractor
            .render_crop(&doc, 0, &Rect::new(0.0, 0.0, 10.0, 10.0), 4.0)
            .expect("top rung renders");
        assert_eq!(rendered.scale, 12.0);
    }

    #[test]
    fn extract_writes_png_with_metadata() {
        let dir = tempfile::tempdir().expect("temp dir");
        let doc = FakeDocument::new(vec![FakePage::letter().with_image(
            crate::pdf::types::EmbeddedImage {
                pixel_width: 400,
                pixel_height: 400,
                placement: Rect::new(0.0, 0.0, 100.0, 100.0),
            },
        )]);
        // The blank letter page sits in the 6x tier; cap at the image's 4x
        let estimator = EstimatorConfig {
            policy: ScalePolicy::Capped { max_scale: 4.0 },
            ..no_probe()
        };
        let mut extractor = CropExtractor::new(estimator, ExtractorConfig::default());
        let path = dir.path().join("crop.png");
        let result = extractor
            .extract(&doc, &selection(0, Rect::new(10.0, 10.0, 20.0, 20.0)), &path)
            .expect("extracts");

        assert_eq!(result.scale, 4.0);
        assert_eq!((result.pixel_width, result.pixel_height), (40, 40));
        assert_eq!(result.dpi, 288.0);
        assert_eq!(result.quality, QualityRating::Good);
        assert_eq!(result.encoding, OutputEncoding::Png);
        assert!((result.physical.width_in - 40.0 / 288.0).abs() < 1e-6);
        assert_eq!(result.path, path);
        assert!(path.exists());
    }

    #[test]
    fn oversized_output_switches_to_jpeg() {
        let dir = tempfile::tempdir().expect("temp dir");
        let doc = FakeDocument::new(vec![FakePage::letter()]);
        let config = ExtractorConfig {
            lossy_threshold_bytes: 1000,
            ..ExtractorConfig::default()
        };
        let mut extractor = CropExtractor::new(no_probe(), config);
        let result = extractor
            .extract(
                &doc,
                &selection(0, Rect::new(0.0, 0.0, 20.0, 20.0)),
                &dir.path().join("big.png"),
            )
            .expect("extracts");
        assert_eq!(result.encoding, OutputEncoding::Jpeg { quality: 95 });
        assert_eq!(result.path, dir.path().join("big.jpg"));
        assert!(result.path.exists());
    }

    #[test]
    fn collapsed_region_is_invalid() {
        let doc = FakeDocument::new(vec![FakePage::new(0.0, 792.0)]);
        let extractor = CropExtractor::new(no_probe(), ExtractorConfig::default());
        let err = extractor
            .clamped_rect(&doc, &selection(0, Rect::new(0.0, 0.0, 10.0, 10.0)))
            .expect_err("page has no width");
        assert!(matches!(err, ExtractionError::InvalidRegion { page: 0, .. }));
    }

    #[test]
    fn unknown_page_is_reported() {
        let doc = FakeDocument::new(vec![FakePage::letter()]);
        let extractor = CropExtractor::new(no_probe(), ExtractorConfig::default());
        let err = extractor
            .page_info(&doc, 3)
            .expect_err("only one page");
        assert!(matches!(err, ExtractionError::PageOutOfRange { page: 3, count: 1 }));
    }

    #[test]
    fn preview_info_does_not_render() {
        let doc = FakeDocument::new(vec![FakePage::letter().with_text_blocks(2)]);
        let mut extractor = CropExtractor::new(EstimatorConfig::default(), ExtractorConfig::default());
        let info = extractor
            .preview_info(&doc, &selection(0, Rect::new(0.0, 0.0, 72.0, 36.0)))
            .expect("preview");
        assert!(doc.render_calls().is_empty());
        assert_eq!(info.scale, 6.0);
        assert_eq!((info.pixel_width, info.pixel_height), (432, 216));
        assert_eq!(info.quality, QualityRating::VeryGood);
        assert_eq!(info.physical.width_in, 1.0);
        assert_eq!(info.file_size_estimate, 432 * 216 * 3 / 2);
    }

    #[test]
    fn thumbnail_fits_bounds() {
        let doc = FakeDocument::new(vec![FakePage::letter()]);
        let extractor = CropExtractor::new(no_probe(), ExtractorConfig::default());
        let thumb = extractor
            .preview_thumbnail(&doc, &selection(0, Rect::new(0.0, 0.0, 400.0, 200.0)), 300, 300)
            .expect("thumbnail");
        assert_eq!(thumb.dimensions(), (300, 150));
        assert_eq!(doc.render_calls(), vec![(0, PREVIEW_SCALE)]);
    }
}
