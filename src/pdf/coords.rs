//! Mapping between display, page and render coordinate spaces
//!
//! Page-space is PDF points (72 per inch, origin top-left). Display-space is
//! what the interactive view drew: page-space times `zoom * 2.0`. Render-space
//! is the output raster: page-space times the extraction scale.

use super::types::{PageSize, Rect};

/// On-screen rendering baseline applied on top of the view zoom
pub const DISPLAY_OVERSAMPLE: f32 = 2.0;

/// Smallest display scale accepted when converting back to page-space
pub const MIN_DISPLAY_SCALE: f32 = 0.1;

/// Minimum crop extent in points after clamping
pub const MIN_PAGE_EXTENT: f32 = 1.0;

/// Clamped rectangle has no area inside the page
#[derive(Clone, Copy, Debug, PartialEq, thiserror::Error)]
#[error("region {0} has no area inside the page")]
pub struct InvalidRegion(pub Rect);

/// Display scale of the interactive view for a zoom factor
#[must_use]
pub fn display_scale(zoom: f32) -> f32 {
    zoom * DISPLAY_OVERSAMPLE
}

/// Display-space rectangle → page-space
#[must_use]
pub fn to_page_space(display_rect: &Rect, display_scale: f32) -> Rect {
    let scale = if display_scale.is_finite() {
        display_scale.max(MIN_DISPLAY_SCALE)
    } else {
        MIN_DISPLAY_SCALE
    };
    display_rect.scaled(1.0 / scale)
}

/// Page-space rectangle → display-space, for redrawing stored crops
#[must_use]
pub fn to_display_space(page_rect: &Rect, display_scale: f32) -> Rect {
    page_rect.scaled(display_scale.max(MIN_DISPLAY_SCALE))
}

/// Page-space rectangle → output pixel coordinates
#[must_use]
pub fn to_render_space(page_rect: &Rect, extraction_scale: f32) -> Rect {
    page_rect.scaled(extraction_scale)
}

/// Output pixel coordinates → page-space
#[must_use]
pub fn from_render_space(pixel_rect: &Rect, extraction_scale: f32) -> Rect {
    pixel_rect.scaled(1.0 / extraction_scale)
}

/// Pixel dimensions of `page_rect` rendered at `extraction_scale`
#[must_use]
pub fn output_dimensions(page_rect: &Rect, extraction_scale: f32) -> (u32, u32) {
    let px = to_render_space(page_rect, extraction_scale);
    (
        px.width().round().max(1.0) as u32,
        px.height().round().max(1.0) as u32,
    )
}

/// Clamp a page-space rectangle to the page.
///
/// Reversed corners are normalized. An extent below one point is widened
/// from the lesser coordinate, or backwards from the page edge when the
/// rectangle sits on it.
pub fn clamp_to_page(rect: &Rect, page: PageSize) -> Result<Rect, InvalidRegion> {
    if !rect.is_finite() || !page.width.is_finite() || !page.height.is_finite() {
        return Err(InvalidRegion(*rect));
    }

    let rect = Rect::from_corners(rect.left, rect.top, rect.right, rect.bottom);
    let (left, right) = clamp_axis(rect.left, rect.right, page.width);
    let (top, bottom) = clamp_axis(rect.top, rect.bottom, page.height);
    let clamped = Rect::new(left, top, right, bottom);

    if clamped.width() <= 0.0 || clamped.height() <= 0.0 {
        return Err(InvalidRegion(clamped));
    }
    Ok(clamped)
}

fn clamp_axis(lo: f32, hi: f32, extent: f32) -> (f32, f32) {
    let extent = extent.max(0.0);
    let mut lo = lo.clamp(0.0, extent);
    let mut hi = hi.clamp(0.0, extent);

    if hi - lo < MIN_PAGE_EXTENT {
        if lo + MIN_PAGE_EXTENT <= extent {
            hi = lo + MIN_PAGE_EXTENT;
        } else {
            hi = extent;
            lo = (extent - MIN_PAGE_EXTENT).max(0.0);
        }
    }
    (lo, hi)
}

/// Vertical stacking of pages in continuous view, in display pixels
#[derive(Clone, Debug, Default)]
pub struct ContinuousLayout {
    page_heights: Vec<f32>,
    gap: f32,
}

impl ContinuousLayout {
    /// Gap between stacked pages in display pixels
    pub const DEFAULT_GAP: f32 = 10.0;

    #[must_use]
    pub fn new(page_heights: Vec<f32>, gap: f32) -> Self {
        Self {
            page_heights,
            gap: gap.max(0.0),
        }
    }

    /// Layout for pages drawn at `display_scale`
    #[must_use]
    pub fn from_page_sizes(sizes: &[PageSize], display_scale: f32, gap: f32) -> Self {
        let heights = sizes.iter().map(|s| s.height * display_scale).collect();
        Self::new(heights, gap)
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_heights.len()
    }

    /// Global y of the top edge of `page`
    #[must_use]
    pub fn page_offset(&self, page: usize) -> Option<f32> {
        if page >= self.page_heights.len() {
            return None;
        }
        Some(
            self.page_heights
                .iter()
                .take(page)
                .map(|h| h + self.gap)
                .sum(),
        )
    }

    /// Total scrollable height
    #[must_use]
    pub fn total_height(&self) -> f32 {
        let pages: f32 = self.page_heights.iter().sum();
        let gaps = self.gap * self.page_heights.len().saturating_sub(1) as f32;
        pages + gaps
    }

    /// Map a global display y to `(page, local_y)`.
    ///
    /// Coordinates past the end land on the last page, coordinates above the
    /// first page land on page 0 (local y is then negative). `None` when the
    /// layout has no pages.
    #[must_use]
    pub fn locate(&self, global_y: f32) -> Option<(usize, f32)> {
        if self.page_heights.is_empty() {
            return None;
        }

        let mut page = 0;
        let mut page_top = 0.0;
        let mut offset = 0.0;
        for (idx, height) in self.page_heights.iter().enumerate() {
            if global_y >= offset {
                page = idx;
                page_top = offset;
            } else {
                break;
            }
            offset += height + self.gap;
        }
        Some((page, global_y - page_top))
    }

    /// Translate a rectangle in global display coordinates to its page and a
    /// page-local display rectangle. The page is chosen by the top edge.
    #[must_use]
    pub fn localize(&self, global_rect: &Rect) -> Option<(usize, Rect)> {
        let (page, local_top) = self.locate(global_rect.top)?;
        let shift = global_rect.top - local_top;
        Some((
            page,
            Rect::new(
                global_rect.left,
                local_top,
                global_rect.right,
                global_rect.bottom - shift,
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rect_eq(a: Rect, b: Rect) {
        let eps = 1e-3;
        assert!(
            (a.left - b.left).abs() < eps
                && (a.top - b.top).abs() < eps
                && (a.right - b.right).abs() < eps
                && (a.bottom - b.bottom).abs() < eps,
            "{a} != {b}"
        );
    }

    #[test]
    fn display_to_page_divides_by_zoom_times_two() {
        let display = Rect::new(100.0, 200.0, 300.0, 400.0);
        let page = to_page_space(&display, display_scale(1.5));
        assert_rect_eq(page, Rect::new(100.0 / 3.0, 200.0 / 3.0, 100.0, 400.0 / 3.0));
    }

    #[test]
    fn zero_display_scale_uses_minimum() {
        let display = Rect::new(1.0, 1.0, 2.0, 2.0);
        let page = to_page_space(&display, 0.0);
        assert_rect_eq(page, Rect::new(10.0, 10.0, 20.0, 20.0));
        let page = to_page_space(&display, -3.0);
        assert_rect_eq(page, Rect::new(10.0, 10.0, 20.0, 20.0));
    }

    #[test]
    fn render_space_round_trip() {
        let rects = [
            Rect::new(0.0, 0.0, 612.0, 792.0),
            Rect::new(10.0, 10.0, 20.0, 20.0),
            Rect::new(33.3, 47.1, 250.9, 301.7),
        ];
        for rect in rects {
            for scale in [0.25_f32, 1.0, 2.0, 4.1666, 6.0, 12.0] {
                let back = from_render_space(&to_render_space(&rect, scale), scale);
                assert_rect_eq(back, rect);
            }
        }
    }

    #[test]
    fn output_dimensions_at_scale_four() {
        let rect = Rect::new(10.0, 10.0, 20.0, 20.0);
        assert_eq!(output_dimensions(&rect, 4.0), (40, 40));
    }

    #[test]
    fn clamp_keeps_inner_rect() {
        let page = PageSize::new(612.0, 792.0);
        let rect = Rect::new(10.0, 20.0, 100.0, 200.0);
        assert_eq!(clamp_to_page(&rect, page), Ok(rect));
    }

    #[test]
    fn clamp_trims_overhang() {
        let page = PageSize::new(612.0, 792.0);
        let rect = Rect::new(-50.0, -10.0, 700.0, 900.0);
        assert_eq!(clamp_to_page(&rect, page), Ok(page.bounds()));
    }

    #[test]
    fn clamp_widens_degenerate_rect() {
        let page = PageSize::new(612.0, 792.0);
        let rect = Rect::new(100.0, 100.0, 100.0, 100.2);
        assert_eq!(
            clamp_to_page(&rect, page),
            Ok(Rect::new(100.0, 100.0, 101.0, 101.0))
        );
    }

    #[test]
    fn clamp_widens_backwards_at_page_edge() {
        let page = PageSize::new(612.0, 792.0);
        let rect = Rect::new(650.0, 800.0, 700.0, 900.0);
        assert_eq!(
            clamp_to_page(&rect, page),
            Ok(Rect::new(611.0, 791.0, 612.0, 792.0))
        );
    }

    #[test]
    fn clamp_fails_on_empty_page() {
        let page = PageSize::new(0.0, 792.0);
        let rect = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert!(clamp_to_page(&rect, page).is_err());
    }

    #[test]
    fn clamp_fails_on_nan() {
        let page = PageSize::new(612.0, 792.0);
        let rect = Rect::new(f32::NAN, 0.0, 10.0, 10.0);
        assert!(clamp_to_page(&rect, page).is_err());
    }

    #[test]
    fn locate_in_continuous_layout() {
        let layout = ContinuousLayout::new(vec![100.0, 200.0, 100.0], 10.0);
        assert_eq!(layout.page_offset(0), Some(0.0));
        assert_eq!(layout.page_offset(1), Some(110.0));
        assert_eq!(layout.page_offset(2), Some(320.0));
        assert_eq!(layout.page_offset(3), None);
        assert_eq!(layout.total_height(), 420.0);

        assert_eq!(layout.locate(50.0), Some((0, 50.0)));
        assert_eq!(layout.locate(110.0), Some((1, 0.0)));
        assert_eq!(layout.locate(315.0), Some((1, 205.0)));
        assert_eq!(layout.locate(330.0), Some((2, 10.0)));
    }

    #[test]
    fn locate_past_end_returns_last_page() {
        let layout = ContinuousLayout::new(vec![100.0, 100.0], 10.0);
        assert_eq!(layout.locate(5000.0), Some((1, 4890.0)));
    }

    #[test]
    fn locate_above_first_page_returns_page_zero() {
        let layout = ContinuousLayout::new(vec![100.0, 100.0], 10.0);
        assert_eq!(layout.locate(-25.0), Some((0, -25.0)));
        assert_eq!(ContinuousLayout::default().locate(10.0), None);
    }

    #[test]
    fn localize_shifts_rect_to_page() {
        let layout = ContinuousLayout::new(vec![100.0, 100.0], 10.0);
        let (page, local) = layout
            .localize(&Rect::new(5.0, 120.0, 50.0, 180.0))
            .expect("layout has pages");
        assert_eq!(page, 1);
        assert_rect_eq(local, Rect::new(5.0, 10.0, 50.0, 70.0));
    }
}
