//! Interactive view state
//!
//! Zoom factor and view mode of the on-screen page view. Passed explicitly
//! into crop creation so page-space conversion never reads ambient state.

use super::coords::{self, ContinuousLayout};
use super::types::PageSize;

/// Zoom and layout mode of the interactive view
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    /// Current zoom factor (1.0 = 100%)
    pub zoom: f32,
    /// Pages stacked vertically instead of one at a time
    pub continuous: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            continuous: false,
        }
    }
}

impl ViewState {
    /// Zoom step multiplier
    pub const ZOOM_STEP: f32 = 1.25;
    /// Minimum allowed zoom factor
    pub const MIN_ZOOM: f32 = 0.1;
    /// Maximum allowed zoom factor
    pub const MAX_ZOOM: f32 = 5.0;
    /// Horizontal margin kept free by fit-to-width, in display pixels
    pub const FIT_MARGIN: f32 = 20.0;
    /// Views narrower than this are ignored by fit-to-width
    pub const MIN_FIT_VIEW_WIDTH: f32 = 100.0;

    #[must_use]
    pub fn with_zoom(zoom: f32) -> Self {
        Self {
            zoom: Self::clamp_zoom(zoom),
            ..Self::default()
        }
    }

    /// Scale from page points to display pixels
    #[must_use]
    pub fn display_scale(&self) -> f32 {
        coords::display_scale(self.zoom)
    }

    /// Zoom in by one step
    pub fn step_in(&mut self) {
        self.zoom = Self::clamp_zoom(self.zoom * Self::ZOOM_STEP);
    }

    /// Zoom out by one step
    pub fn step_out(&mut self) {
        self.zoom = Self::clamp_zoom(self.zoom / Self::ZOOM_STEP);
    }

    /// Back to 100%
    pub fn reset(&mut self) {
        self.zoom = 1.0;
    }

    /// Fit the page width into `view_width` display pixels.
    ///
    /// Returns false (zoom untouched) for views too narrow to fit into.
    pub fn fit_to_width(&mut self, view_width: f32, page: PageSize) -> bool {
        if view_width <= Self::MIN_FIT_VIEW_WIDTH || page.width <= 0.0 {
            return false;
        }
        self.zoom = Self::clamp_zoom((view_width - Self::FIT_MARGIN) / page.width);
        true
    }

    /// Continuous layout of `pages` at the current zoom
    #[must_use]
    pub fn layout(&self, pages: &[PageSize]) -> ContinuousLayout {
        ContinuousLayout::from_page_sizes(pages, self.display_scale(), ContinuousLayout::DEFAULT_GAP)
    }

    /// Clamp zoom to valid range, handling NaN/Inf
    #[must_use]
    pub fn clamp_zoom(zoom: f32) -> f32 {
        if zoom.is_finite() {
            zoom.clamp(Self::MIN_ZOOM, Self::MAX_ZOOM)
        } else {
            1.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_are_clamped() {
        let mut view = ViewState::default();
        for _ in 0..20 {
            view.step_in();
        }
        assert_eq!(view.zoom, ViewState::MAX_ZOOM);
        for _ in 0..40 {
            view.step_out();
        }
        assert_eq!(view.zoom, ViewState::MIN_ZOOM);
        view.reset();
        assert_eq!(view.zoom, 1.0);
    }

    #[test]
    fn display_scale_includes_oversampling() {
        assert_eq!(ViewState::with_zoom(1.5).display_scale(), 3.0);
    }

    #[test]
    fn fit_to_width_leaves_margin() {
        let mut view = ViewState::default();
        assert!(view.fit_to_width(632.0, PageSize::new(612.0, 792.0)));
        assert!((view.zoom - 1.0).abs() < 1e-6);

        assert!(!view.fit_to_width(80.0, PageSize::new(612.0, 792.0)));
        assert!((view.zoom - 1.0).abs() < 1e-6);
    }

    #[test]
    fn non_finite_zoom_resets() {
        assert_eq!(ViewState::clamp_zoom(f32::NAN), 1.0);
        assert_eq!(ViewState::clamp_zoom(f32::INFINITY), 1.0);
    }
}
