//! Native resolution estimation
//!
//! Infers, per page, the extraction scale (multiple of 72 DPI) that
//! reproduces the page's own quality. Signals are combined as a running
//! maximum; none of them can lower the result:
//!
//! 1. embedded images: scale at which image pixels map 1:1 to output pixels
//! 2. scanned-content fallback: text-density tier when images are absent or
//!    coarser than the tier itself
//! 3. drawable objects: self-contained objects (form XObjects) force a high
//!    scale whatever the other signals say
//! 4. text floor: any text gets at least a crisp-text scale
//! 5. probe: trial renders of a small corner at higher scales, kept when
//!    they reveal more detail than a resolved page would
//!
//! Inspection failures never propagate: the page gets the conservative
//! default scale.

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::backend::PdfBackend;
use super::cache::EstimateCache;
use super::error::BackendError;
use super::types::{ContentBlock, ContentKind, EmbeddedImage, PageSize, Raster, Rect};

/// Scale of plain 72 DPI rendering
pub const BASE_SCALE: f32 = 1.0;

/// Text blocks per square point below which a page counts as sparse
pub const SPARSE_DENSITY: f32 = 0.001;
/// Text blocks per square point below which a page counts as moderate
pub const MODERATE_DENSITY: f32 = 0.01;

pub const SPARSE_SCAN_SCALE: f32 = 6.0;
pub const MODERATE_SCAN_SCALE: f32 = 4.0;
pub const DENSE_SCAN_SCALE: f32 = 3.0;
/// Scale forced by form XObjects (frequently downsampled scans)
pub const DRAWABLE_SCAN_SCALE: f32 = 6.0;

/// 300 DPI
pub const CRISP_TEXT_SCALE: f32 = 300.0 / 72.0;

/// Side of the probed top-left corner, in points
pub const PROBE_SIZE: f32 = 100.0;
/// Candidate multipliers tried by the probe
pub const PROBE_MULTIPLIERS: [f32; 2] = [1.5, 2.0];
/// Detail growth over linear needed to accept a candidate
pub const PROBE_GAIN: f32 = 1.1;
/// Minimum sharp transitions for a probe render to count as content
pub const PROBE_MIN_TRANSITIONS: usize = 16;
/// Luma step treated as a sharp transition
const SHARP_LUMA_STEP: u16 = 32;

/// Upper bound policy on the estimated scale
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ScalePolicy {
    /// Keep whatever the signals ask for
    Native,
    /// Never exceed `max_scale`
    Capped { max_scale: f32 },
}

impl Default for ScalePolicy {
    fn default() -> Self {
        ScalePolicy::Capped { max_scale: 8.0 }
    }
}

impl ScalePolicy {
    /// Apply the policy, returning the bounded scale and whether it was cut
    #[must_use]
    pub fn apply(self, scale: f32) -> (f32, bool) {
        match self {
            ScalePolicy::Native => (scale, false),
            ScalePolicy::Capped { max_scale } => {
                let cap = max_scale.max(BASE_SCALE);
                if scale > cap { (cap, true) } else { (scale, false) }
            }
        }
    }

    #[must_use]
    pub fn max_scale(self) -> Option<f32> {
        match self {
            ScalePolicy::Native => None,
            ScalePolicy::Capped { max_scale } => Some(max_scale.max(BASE_SCALE)),
        }
    }
}

/// Estimator configuration
#[derive(Clone, Debug, PartialEq)]
pub struct EstimatorConfig {
    pub policy: ScalePolicy,
    /// Returned when the page cannot be inspected
    pub conservative_scale: f32,
    /// Floor applied when the page has text
    pub text_floor_scale: f32,
    pub probe_enabled: bool,
    /// Pages whose estimate is remembered
    pub cache_size: usize,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            policy: ScalePolicy::default(),
            conservative_scale: CRISP_TEXT_SCALE,
            text_floor_scale: CRISP_TEXT_SCALE,
            probe_enabled: true,
            cache_size: 64,
        }
    }
}

/// Per-signal contributions for one page
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ScaleSignals {
    pub image: Option<f32>,
    pub scan: Option<f32>,
    pub drawable: Option<f32>,
    pub text_floor: Option<f32>,
    pub probe: Option<f32>,
}

impl ScaleSignals {
    /// Running maximum over the base scale and every present signal
    #[must_use]
    pub fn combine(&self) -> f32 {
        [
            self.image,
            self.scan,
            self.drawable,
            self.text_floor,
            self.probe,
        ]
            .into_iter()
            .flatten()
            .filter(|s| s.is_finite())
            .fold(BASE_SCALE, f32::max)
    }
}

/// Result of estimating one page
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ScaleEstimate {
    pub page: usize,
    pub scale: f32,
    pub signals: ScaleSignals,
    /// The policy cut the combined scale
    pub capped: bool,
    /// Inspection failed and the conservative default was used
    pub fallback: bool,
}

impl ScaleEstimate {
    #[must_use]
    pub fn dpi(&self) -> f32 {
        self.scale * super::types::POINTS_PER_INCH
    }
}

/// Infers extraction scales and caches them per page
pub struct NativeResolutionEstimator {
    config: EstimatorConfig,
    cache: EstimateCache,
}

impl NativeResolutionEstimator {
    #[must_use]
    pub fn new(config: EstimatorConfig) -> Self {
        Self {
            cache: EstimateCache::new(config.cache_size),
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Full estimate including the probe, cached per page
    pub fn estimate<B: PdfBackend + ?Sized>(&mut self, backend: &B, page: usize) -> ScaleEstimate {
        if let Some(hit) = self.cache.get(page) {
            return hit;
        }
        let estimate = self.run(backend, page, self.config.probe_enabled);
        if !estimate.fallback {
            self.cache.insert(estimate);
        }
        estimate
    }

    /// Estimate without trial renders. Uses a cached full estimate if there
    /// is one; the result of a static estimate is not cached.
    pub fn estimate_static<B: PdfBackend + ?Sized>(
        &mut self,
        backend: &B,
        page: usize,
    ) -> ScaleEstimate {
        if let Some(hit) = self.cache.get(page) {
            return hit;
        }
        self.run(backend, page, false)
    }

    /// Forget cached estimates
    pub fn invalidate(&mut self) {
        self.cache.invalidate_all();
    }

    fn run<B: PdfBackend + ?Sized>(&self, backend: &B, page: usize, probe: bool) -> ScaleEstimate {
        match self.inspect(backend, page, probe) {
            Ok(signals) => {
                let (scale, capped) = self.config.policy.apply(signals.combine());
                debug!(
                    "page {page}: signals {signals:?} -> scale {scale:.3}{}",
                    if capped { " (capped)" } else { "" }
                );
                ScaleEstimate {
                    page,
                    scale,
                    signals,
                    capped,
                    fallback: false,
                }
            }
            Err(e) => {
                warn!(
                    "Could not inspect page {page}, using conservative scale {:.3}: {e}",
                    self.config.conservative_scale
                );
                ScaleEstimate {
                    page,
                    scale: self.config.conservative_scale,
                    signals: ScaleSignals::default(),
                    capped: false,
                    fallback: true,
                }
            }
        }
    }

    fn inspect<B: PdfBackend + ?Sized>(
        &self,
        backend: &B,
        page: usize,
        probe: bool,
    ) -> Result<ScaleSignals, BackendError> {
        backend.check_page(page)?;
        let size = backend.page_size(page)?;
        let images = backend.embedded_images(page)?;
        let blocks = backend.content_blocks(page)?;

        let mut signals = ScaleSignals {
            image: image_signal(&images),
            ..ScaleSignals::default()
        };

        let scan = scan_signal(&blocks, size);
        if signals.image.is_none_or(|s| s < scan) {
            signals.scan = Some(scan);
        }

        if blocks.iter().any(|b| b.kind == ContentKind::Drawable) {
            signals.drawable = Some(DRAWABLE_SCAN_SCALE);
        }

        if blocks.iter().any(|b| b.kind == ContentKind::Text) {
            signals.text_floor = Some(self.config.text_floor_scale);
        }

        if probe {
            let current = self.config.policy.apply(signals.combine()).0;
            let at_cap = self
                .config
                .policy
                .max_scale()
                .is_some_and(|cap| current >= cap);
            if !at_cap {
                signals.probe = probe_signal(backend, page, size, current);
            }
        }

        Ok(signals)
    }
}

/// Maximum 1:1 scale over all placed images
#[must_use]
pub fn image_signal(images: &[EmbeddedImage]) -> Option<f32> {
    images
        .iter()
        .filter_map(EmbeddedImage::native_scale)
        .reduce(f32::max)
}

/// Scanned-content scale from text-block density
#[must_use]
pub fn scan_signal(blocks: &[ContentBlock], size: PageSize) -> f32 {
    let text_blocks = blocks.iter().filter(|b| b.kind == ContentKind::Text).count();
    let density = if size.area() > 0.0 {
        text_blocks as f32 / size.area()
    } else {
        0.0
    };

    if density < SPARSE_DENSITY {
        SPARSE_SCAN_SCALE
    } else if density < MODERATE_DENSITY {
        MODERATE_SCAN_SCALE
    } else {
        DENSE_SCAN_SCALE
    }
}

/// Trial-render the top-left corner at `current` and the candidate
/// multiples. A resolved page gains sharp transitions linearly with scale
/// (edges are one-dimensional); faster growth means the lower scale was
/// merging detail, so the candidate wins.
fn probe_signal<B: PdfBackend + ?Sized>(
    backend: &B,
    page: usize,
    size: PageSize,
    current: f32,
) -> Option<f32> {
    let region = Rect::new(0.0, 0.0, PROBE_SIZE.min(size.width), PROBE_SIZE.min(size.height));
    if region.area() <= 0.0 || current <= 0.0 {
        return None;
    }

    let transitions_at = |scale: f32| -> Option<usize> {
        match backend.render(page, scale, &region) {
            Ok(raster) if raster.is_valid() => Some(sharp_transitions(&raster)),
            Ok(_) => {
                debug!("probe render of page {page} at {scale:.3} was empty");
                None
            }
            Err(e) => {
                debug!("probe render of page {page} at {scale:.3} failed: {e}");
                None
            }
        }
    };

    let mut best_scale = current;
    let mut best_count = transitions_at(current)?;

    for multiplier in PROBE_MULTIPLIERS {
        let candidate = current * multiplier;
        let Some(count) = transitions_at(candidate) else {
            continue;
        };
        let expected = best_count as f32 * (candidate / best_scale) * PROBE_GAIN;
        if count >= PROBE_MIN_TRANSITIONS && count as f32 > expected {
            debug!(
                "probe on page {page}: {count} transitions at {candidate:.3} vs {expected:.1} expected"
            );
            best_scale = candidate;
            best_count = count;
        }
    }

    (best_scale > current).then_some(best_scale)
}

/// Count pixels whose luma differs sharply from the right or lower neighbour
#[must_use]
pub fn sharp_transitions(raster: &Raster) -> usize {
    let width = raster.width as usize;
    let height = raster.height as usize;
    if !raster.is_valid() {
        return 0;
    }

    let luma = |x: usize, y: usize| -> u16 {
        let idx = (y * width + x) * 3;
        let px = &raster.pixels[idx..idx + 3];
        (u16::from(px[0]) * 54 + u16::from(px[1]) * 183 + u16::from(px[2]) * 19) >> 8
    };

    let mut count = 0;
    for y in 0..height {
        for x in 0..width {
            let here = luma(x, y);
            let right = (x + 1 < width).then(|| luma(x + 1, y));
            let below = (y + 1 < height).then(|| luma(x, y + 1));
            let sharp = [right, below]
                .into_iter()
                .flatten()
                .any(|n| n.abs_diff(here) > SHARP_LUMA_STEP);
            if sharp {
                count += 1;
            }
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::test_helpers::{FakeDocument, FakePage};

    fn config_without_probe() -> EstimatorConfig {
        EstimatorConfig {
            probe_enabled: false,
            ..EstimatorConfig::default()
        }
    }

    fn image(px: u32, placed: f32) -> EmbeddedImage {
        EmbeddedImage {
            pixel_width: px,
            pixel_height: px,
            placement: Rect::new(0.0, 0.0, placed, placed),
        }
    }

    #[test]
    fn image_at_six_hundred_pixels_per_hundred_points() {
        let doc = FakeDocument::new(vec![FakePage::letter().with_image(image(600, 100.0))]);
        let mut estimator = NativeResolutionEstimator::new(config_without_probe());
        let estimate = estimator.estimate(&doc, 0);
        assert!(estimate.scale >= 6.0, "scale {}", estimate.scale);
        assert_eq!(estimate.signals.image, Some(6.0));
        assert_eq!(estimate.signals.scan, None);
    }

    #[test]
    fn largest_image_wins() {
        let images = [image(100, 100.0), image(900, 100.0), image(300, 100.0)];
        assert_eq!(image_signal(&images), Some(9.0));
        assert_eq!(image_signal(&[]), None);
    }

    #[test]
    fn empty_page_uses_sparse_scan_tier() {
        let doc = FakeDocument::new(vec![FakePage::letter()]);
        let mut estimator = NativeResolutionEstimator::new(config_without_probe());
        let estimate = estimator.estimate(&doc, 0);
        assert_eq!(estimate.signals.scan, Some(SPARSE_SCAN_SCALE));
        assert_eq!(estimate.scale, SPARSE_SCAN_SCALE);
    }

    #[test]
    fn low_resolution_image_triggers_scan_fallback() {
        let doc = FakeDocument::new(vec![FakePage::letter().with_image(image(50, 100.0))]);
        let mut estimator = NativeResolutionEstimator::new(config_without_probe());
        let estimate = estimator.estimate(&doc, 0);
        assert_eq!(estimate.signals.image, Some(0.5));
        assert_eq!(estimate.signals.scan, Some(SPARSE_SCAN_SCALE));
    }

    #[test]
    fn density_tiers() {
        let page = PageSize::new(100.0, 100.0);
        let text = |n: usize| vec![ContentBlock::new(ContentKind::Text, Rect::new(0.0, 0.0, 1.0, 1.0)); n];
        assert_eq!(scan_signal(&text(5), page), SPARSE_SCAN_SCALE);
        assert_eq!(scan_signal(&text(50), page), MODERATE_SCAN_SCALE);
        assert_eq!(scan_signal(&text(200), page), DENSE_SCAN_SCALE);
    }

    /// 100x100 page with 200 text blocks sits in the dense tier
    fn dense_page() -> FakePage {
        FakePage::new(100.0, 100.0).with_text_blocks(200)
    }

    #[test]
    fn drawable_object_forces_high_scale() {
        let doc = FakeDocument::new(vec![
            dense_page()
                .with_image(image(200, 100.0))
                .with_drawable(Rect::new(0.0, 0.0, 100.0, 100.0)),
        ]);
        let mut estimator = NativeResolutionEstimator::new(config_without_probe());
        let estimate = estimator.estimate(&doc, 0);
        assert_eq!(estimate.signals.image, Some(2.0));
        assert_eq!(estimate.signals.scan, Some(DENSE_SCAN_SCALE));
        assert_eq!(estimate.signals.drawable, Some(DRAWABLE_SCAN_SCALE));
        assert_eq!(estimate.scale, DRAWABLE_SCAN_SCALE);
    }

    #[test]
    fn drawable_never_lowers_a_finer_image() {
        let doc = FakeDocument::new(vec![
            FakePage::letter()
                .with_image(image(700, 100.0))
                .with_drawable(Rect::new(0.0, 0.0, 612.0, 792.0)),
        ]);
        let mut estimator = NativeResolutionEstimator::new(EstimatorConfig {
            policy: ScalePolicy::Native,
            ..config_without_probe()
        });
        let estimate = estimator.estimate(&doc, 0);
        assert_eq!(estimate.signals.drawable, Some(DRAWABLE_SCAN_SCALE));
        assert_eq!(estimate.scale, 7.0);
    }

    #[test]
    fn text_raises_floor_over_image() {
        let doc = FakeDocument::new(vec![dense_page().with_image(image(200, 100.0))]);
        let mut estimator = NativeResolutionEstimator::new(config_without_probe());
        let estimate = estimator.estimate(&doc, 0);
        assert_eq!(estimate.signals.image, Some(2.0));
        assert_eq!(estimate.signals.scan, Some(DENSE_SCAN_SCALE));
        assert_eq!(estimate.signals.text_floor, Some(CRISP_TEXT_SCALE));
        assert!((estimate.scale - CRISP_TEXT_SCALE).abs() < 1e-6);
    }

    /// Finer images never produce a lower estimate, including just past
    /// the point where the image starts to outweigh the density tier
    #[test]
    fn estimate_rises_with_image_resolution() {
        let pixels = [50, 90, 100, 101, 150, 300, 599, 600, 601, 700, 900, 1200];
        for text_blocks in [0, 3] {
            let mut previous = 0.0;
            for px in pixels {
                let doc = FakeDocument::new(vec![
                    FakePage::letter()
                        .with_image(image(px, 100.0))
                        .with_text_blocks(text_blocks),
                ]);
                let mut estimator = NativeResolutionEstimator::new(EstimatorConfig {
                    policy: ScalePolicy::Native,
                    ..config_without_probe()
                });
                let scale = estimator.estimate(&doc, 0).scale;
                assert!(
                    scale >= previous,
                    "{px}px with {text_blocks} text blocks: {scale} after {previous}"
                );
                previous = scale;
            }
            assert_eq!(previous, 12.0);
        }
    }

    #[test]
    fn blank_page_and_coarse_image_agree() {
        let mut estimator = NativeResolutionEstimator::new(config_without_probe());
        let blank = estimator.estimate(&FakeDocument::new(vec![FakePage::letter()]), 0);
        let mut estimator = NativeResolutionEstimator::new(config_without_probe());
        let coarse = estimator.estimate(
            &FakeDocument::new(vec![FakePage::letter().with_image(image(101, 100.0))]),
            0,
        );
        assert_eq!(blank.scale, SPARSE_SCAN_SCALE);
        assert_eq!(coarse.scale, SPARSE_SCAN_SCALE);
    }

    #[test]
    fn estimate_rises_with_density_tier() {
        // Fewer blocks on the same page means a sparser, higher tier
        let mut previous = 0.0;
        for count in [200, 50, 5, 0] {
            let doc = FakeDocument::new(vec![
                FakePage::new(100.0, 100.0)
                    .with_image(image(200, 100.0))
                    .with_text_blocks(count),
            ]);
            let mut estimator = NativeResolutionEstimator::new(config_without_probe());
            let scale = estimator.estimate(&doc, 0).scale;
            assert!(scale >= previous, "{count} blocks: {scale} after {previous}");
            previous = scale;
        }
    }

    #[test]
    fn combine_is_monotonic_in_each_signal() {
        let base = ScaleSignals {
            image: Some(2.0),
            scan: Some(3.0),
            drawable: None,
            text_floor: Some(CRISP_TEXT_SCALE),
            probe: Some(1.5),
        };
        let steps = [0.5_f32, 1.0, 2.0, 4.0, 6.0, 9.0, 14.0];
        for field in 0..5 {
            let mut previous = 0.0;
            for value in steps {
                let mut signals = base;
                match field {
                    0 => signals.image = Some(value),
                    1 => signals.scan = Some(value),
                    2 => signals.drawable = Some(value),
                    3 => signals.text_floor = Some(value),
                    _ => signals.probe = Some(value),
                }
                let combined = signals.combine();
                assert!(combined >= previous, "field {field} value {value}");
                previous = combined;
            }
        }
    }

    #[test]
    fn cap_policy_limits_scale() {
        let doc = FakeDocument::new(vec![FakePage::letter().with_image(image(2400, 100.0))]);

        let mut capped = NativeResolutionEstimator::new(config_without_probe());
        let estimate = capped.estimate(&doc, 0);
        assert_eq!(estimate.scale, 8.0);
        assert!(estimate.capped);

        let mut native = NativeResolutionEstimator::new(EstimatorConfig {
            policy: ScalePolicy::Native,
            ..config_without_probe()
        });
        let estimate = native.estimate(&doc, 0);
        assert_eq!(estimate.scale, 24.0);
        assert!(!estimate.capped);
    }

    #[test]
    fn inspection_failure_returns_conservative_scale() {
        let doc = FakeDocument::new(vec![FakePage::letter().failing_inspection()]);
        let mut estimator = NativeResolutionEstimator::new(config_without_probe());
        let estimate = estimator.estimate(&doc, 0);
        assert!(estimate.fallback);
        assert_eq!(estimate.scale, CRISP_TEXT_SCALE);

        let estimate = estimator.estimate(&doc, 7);
        assert!(estimate.fallback);
    }

    #[test]
    fn estimates_are_cached() {
        let doc = FakeDocument::new(vec![FakePage::letter().with_image(image(600, 100.0))]);
        let mut estimator = NativeResolutionEstimator::new(EstimatorConfig::default());
        let first = estimator.estimate(&doc, 0);
        let renders = doc.render_calls().len();
        let second = estimator.estimate(&doc, 0);
        assert_eq!(first, second);
        assert_eq!(doc.render_calls().len(), renders);
    }

    #[test]
    fn static_estimate_never_renders() {
        let doc = FakeDocument::new(vec![FakePage::letter().with_image(image(600, 100.0))]);
        let mut estimator = NativeResolutionEstimator::new(EstimatorConfig::default());
        let estimate = estimator.estimate_static(&doc, 0);
        assert_eq!(estimate.scale, 6.0);
        assert!(doc.render_calls().is_empty());
    }

    #[test]
    fn probe_prefers_scale_revealing_detail() {
        // Fine stripes that only resolve above 6.5x; the sparse tier asks for 6x.
        let doc = FakeDocument::new(vec![FakePage::letter().with_hidden_detail_above(6.5)]);
        let mut estimator = NativeResolutionEstimator::new(EstimatorConfig {
            policy: ScalePolicy::Native,
            ..EstimatorConfig::default()
        });
        let estimate = estimator.estimate(&doc, 0);
        assert_eq!(estimate.signals.scan, Some(SPARSE_SCAN_SCALE));
        assert_eq!(estimate.signals.probe, Some(9.0));
        assert_eq!(estimate.scale, 9.0);
    }

    #[test]
    fn probe_keeps_resolved_content() {
        let doc = FakeDocument::new(vec![FakePage::letter()]);
        let mut estimator = NativeResolutionEstimator::new(EstimatorConfig::default());
        let estimate = estimator.estimate(&doc, 0);
        assert_eq!(estimate.signals.probe, None);
        assert_eq!(estimate.scale, SPARSE_SCAN_SCALE);
        assert!(!doc.render_calls().is_empty());
    }

    #[test]
    fn sharp_transitions_on_checkerboard() {
        let mut pixels = Vec::new();
        for y in 0..4u32 {
            for x in 0..4u32 {
                let v = if (x + y) % 2 == 0 { 0 } else { 255 };
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        let raster = Raster::new(4, 4, pixels);
        assert_eq!(sharp_transitions(&raster), 15);
        assert_eq!(sharp_transitions(&Raster::new(2, 2, vec![255; 12])), 0);
    }
}
