//! Crop selections
//!
//! Ordered collection of user-drawn crop regions. Each selection keeps its
//! canonical page-space rectangle; the display rectangle and zoom are kept
//! for redraw and for legacy records that never had a page rectangle.

use serde::Serialize;

use super::coords::{self, InvalidRegion};
use super::types::{PageSize, Rect};
use super::zoom::ViewState;

/// Minimum drag extent, in display pixels, for a selection to be created
pub const MIN_DRAG_PX: f32 = 10.0;

/// Identity of a selection, never reused within a store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SelectionId(u64);

impl SelectionId {
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// One user-drawn crop region
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CropSelection {
    pub id: SelectionId,
    pub page_index: usize,
    /// Rectangle as drawn, in display pixels at `display_zoom`
    pub display_rect: Rect,
    /// Canonical page-space rectangle, clamped to the page
    pub page_rect: Option<Rect>,
    pub display_zoom: f32,
    pub label: String,
    /// Label was generated and follows renumbering
    pub auto_named: bool,
}

impl CropSelection {
    /// Record carrying only display coordinates and the zoom they were drawn
    /// at. The extractor converts it with the `zoom * 2.0` convention.
    #[must_use]
    pub fn legacy(
        id: u64,
        page_index: usize,
        display_rect: Rect,
        display_zoom: f32,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: SelectionId(id),
            page_index,
            display_rect,
            page_rect: None,
            display_zoom,
            label: label.into(),
            auto_named: false,
        }
    }

    /// Page-space rectangle, converting legacy display coordinates if needed
    #[must_use]
    pub fn resolve_page_rect(&self) -> Rect {
        self.page_rect.unwrap_or_else(|| {
            coords::to_page_space(&self.display_rect, coords::display_scale(self.display_zoom))
        })
    }

    /// Where to draw the selection at the given view
    #[must_use]
    pub fn display_rect_at(&self, view: &ViewState) -> Rect {
        coords::to_display_space(&self.resolve_page_rect(), view.display_scale())
    }
}

/// Default label for the crop at 1-based `ordinal`
#[must_use]
pub fn default_label(document: &str, ordinal: usize) -> String {
    format!("{document}_Q{ordinal}")
}

/// Ordered crop selections for one document
#[derive(Clone, Debug, Default)]
pub struct CropSelectionStore {
    selections: Vec<CropSelection>,
    next_id: u64,
    document: String,
}

impl CropSelectionStore {
    #[must_use]
    pub fn new(document: impl Into<String>) -> Self {
        Self {
            selections: Vec::new(),
            next_id: 1,
            document: document.into(),
        }
    }

    /// Add a selection drawn on `page_index`.
    ///
    /// Drags under 10x10 display pixels create nothing. Otherwise the
    /// rectangle is converted to page-space with the view's display scale
    /// and clamped to `page`.
    pub fn add(
        &mut self,
        raw_display_rect: Rect,
        page_index: usize,
        view: &ViewState,
        page: PageSize,
    ) -> Option<&CropSelection> {
        if !raw_display_rect.is_finite() {
            return None;
        }
        let display_rect = Rect::from_corners(
            raw_display_rect.left,
            raw_display_rect.top,
            raw_display_rect.right,
            raw_display_rect.bottom,
        );
        if display_rect.width() < MIN_DRAG_PX || display_rect.height() < MIN_DRAG_PX {
            return None;
        }

        let page_rect = coords::to_page_space(&display_rect, view.display_scale());
        let page_rect = match coords::clamp_to_page(&page_rect, page) {
            Ok(rect) => rect,
            Err(InvalidRegion(rect)) => {
                log::debug!("dropping selection on page {page_index}: {rect} outside page");
                return None;
            }
        };

        let id = SelectionId(self.next_id);
        self.next_id += 1;
        let ordinal = self.selections.len() + 1;
        self.selections.push(CropSelection {
            id,
            page_index,
            display_rect,
            page_rect: Some(page_rect),
            display_zoom: view.zoom,
            label: default_label(&self.document, ordinal),
            auto_named: true,
        });
        self.selections.last()
    }

    /// Add a selection drawn in continuous view, where `global_rect` is in
    /// the stacked layout's coordinates. The page is picked by the top edge.
    pub fn add_in_layout(
        &mut self,
        global_rect: Rect,
        view: &ViewState,
        pages: &[PageSize],
    ) -> Option<&CropSelection> {
        let layout = view.layout(pages);
        let (page_index, local) = layout.localize(&Rect::from_corners(
            global_rect.left,
            global_rect.top,
            global_rect.right,
            global_rect.bottom,
        ))?;
        let page = *pages.get(page_index)?;
        self.add(local, page_index, view, page)
    }

    /// Add a rectangle already in page-space points, e.g. from the command
    /// line. No drag threshold applies; the rectangle is clamped to `page`.
    pub fn add_page_rect(
        &mut self,
        page_index: usize,
        page_rect: Rect,
        page: PageSize,
    ) -> Result<&CropSelection, InvalidRegion> {
        let page_rect = coords::clamp_to_page(&page_rect, page)?;
        let view = ViewState::default();
        let id = SelectionId(self.next_id);
        self.next_id += 1;
        let ordinal = self.selections.len() + 1;
        self.selections.push(CropSelection {
            id,
            page_index,
            display_rect: coords::to_display_space(&page_rect, view.display_scale()),
            page_rect: Some(page_rect),
            display_zoom: view.zoom,
            label: default_label(&self.document, ordinal),
            auto_named: true,
        });
        Ok(&self.selections[self.selections.len() - 1])
    }

    /// Insert an already-built record (legacy import)
    pub fn push(&mut self, selection: CropSelection) {
        self.next_id = self.next_id.max(selection.id.0 + 1);
        self.selections.push(selection);
    }

    /// Remove the selection at `index`; out of range is a no-op.
    /// Auto-named selections after it are renumbered.
    pub fn remove(&mut self, index: usize) -> Option<CropSelection> {
        if index >= self.selections.len() {
            return None;
        }
        let removed = self.selections.remove(index);
        self.renumber_from(index);
        Some(removed)
    }

    pub fn clear(&mut self) {
        self.selections.clear();
    }

    /// Give the selection a user label. An empty label restores the default.
    pub fn rename(&mut self, index: usize, label: &str) -> bool {
        let document = self.document.clone();
        let Some(selection) = self.selections.get_mut(index) else {
            return false;
        };
        let label = label.trim();
        if label.is_empty() {
            selection.label = default_label(&document, index + 1);
            selection.auto_named = true;
        } else {
            selection.label = label.to_string();
            selection.auto_named = false;
        }
        true
    }

    /// Move a selection to another page, re-clamping it to that page
    pub fn reassign_page(&mut self, index: usize, page_index: usize, page: PageSize) -> bool {
        let Some(selection) = self.selections.get_mut(index) else {
            return false;
        };
        match coords::clamp_to_page(&selection.resolve_page_rect(), page) {
            Ok(rect) => {
                selection.page_index = page_index;
                selection.page_rect = Some(rect);
                true
            }
            Err(_) => false,
        }
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&CropSelection> {
        self.selections.get(index)
    }

    #[must_use]
    pub fn position(&self, id: SelectionId) -> Option<usize> {
        self.selections.iter().position(|s| s.id == id)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[CropSelection] {
        &self.selections
    }

    pub fn iter(&self) -> impl Iterator<Item = &CropSelection> {
        self.selections.iter()
    }

    /// Selections drawn on `page`, with their list index
    pub fn on_page(&self, page: usize) -> impl Iterator<Item = (usize, &CropSelection)> {
        self.selections
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.page_index == page)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.selections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.selections.is_empty()
    }

    #[must_use]
    pub fn document(&self) -> &str {
        &self.document
    }

    fn renumber_from(&mut self, start: usize) {
        for (index, selection) in self.selections.iter_mut().enumerate().skip(start) {
            if selection.auto_named {
                selection.label = default_label(&self.document, index + 1);
            }
        }
    }
}
