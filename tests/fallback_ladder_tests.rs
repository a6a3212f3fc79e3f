use pdfsnip::pdf::{
    CropExtractor, EstimatorConfig, ExtractionError, ExtractorConfig, Rect, RenderTier,
    ScalePolicy,
};
use pdfsnip::test_utils::test_helpers::{FakeDocument, FakePage};

fn extractor(max_scale: f32) -> CropExtractor {
    CropExtractor::new(
        EstimatorConfig {
            policy: ScalePolicy::Capped { max_scale },
            probe_enabled: false,
            ..EstimatorConfig::default()
        },
        ExtractorConfig::default(),
    )
}

const CROP: Rect = Rect::new(0.0, 0.0, 50.0, 50.0);

/// Estimated scale, then the fixed retry, then the ladder from the top
#[test]
fn test_render_attempt_order() {
    let doc = FakeDocument::new(vec![FakePage::letter().rendering_up_to(4.0)]);
    let rendered = extractor(8.0).render_crop(&doc, 0, &CROP, 5.0).unwrap();

    // 5.0 is empty, the 3.0 retry succeeds
    assert_eq!(rendered.attempts, vec![5.0, 3.0]);
    assert_eq!(rendered.tier, RenderTier::Fallback);
    assert_eq!(rendered.scale, 3.0);
}

#[test]
fn test_ladder_descends_until_a_render_succeeds() {
    let doc = FakeDocument::new(vec![
        FakePage::letter().rendering_from(6.0).failing_at(3.0),
    ]);
    let rendered = extractor(8.0).render_crop(&doc, 0, &CROP, 5.0).unwrap();

    assert_eq!(rendered.attempts, vec![5.0, 3.0, 12.0]);
    assert_eq!(rendered.tier, RenderTier::Emergency);
    assert_eq!((rendered.raster.width, rendered.raster.height), (600, 600));
}

/// Emergency rungs above the policy cap are still tried
#[test]
fn test_ladder_is_not_capped() {
    let doc = FakeDocument::new(vec![FakePage::letter().rendering_from(10.0)]);
    let rendered = extractor(2.0).render_crop(&doc, 0, &CROP, 2.0).unwrap();
    assert_eq!(rendered.scale, 12.0);
}

#[test]
fn test_exhausted_ladder_reports_every_attempt() {
    let doc = FakeDocument::new(vec![FakePage::letter().failing_render()]);
    let err = extractor(8.0).render_crop(&doc, 0, &CROP, 5.0).unwrap_err();
    assert!(matches!(
        err,
        ExtractionError::ExtractionFailed { page: 0, attempts: 7 }
    ));
    assert_eq!(doc.render_calls().len(), 7);
}
