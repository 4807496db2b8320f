/// Local UI state of the feed
///
/// Selection, layout mode and the variant modal live here, along with the
/// set of cards whose content has been mounted. All transitions are plain
/// state changes driven by `FeedAction`s; the iced shell forwards user
/// events as actions and re-renders from this state.

use std::collections::{BTreeSet, HashSet};

use crate::state::data::ImageId;

use super::card::MasonryLayout;
use super::fetcher::FetchFlags;

/// How far above the end of the content the sentinel sits
pub const SENTINEL_MARGIN: f32 = 400.0;
/// Cards this far outside the viewport are mounted ahead of time
pub const MOUNT_OVERSCAN: f32 = 300.0;

/// Card arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// A single centered column
    List,
    /// Masonry columns filling the width
    #[default]
    Grid,
}

impl Layout {
    pub fn toggled(self) -> Self {
        match self {
            Layout::List => Layout::Grid,
            Layout::Grid => Layout::List,
        }
    }
}

/// User interactions with the feed
#[derive(Debug, Clone, PartialEq)]
pub enum FeedAction {
    /// A card's checkbox changed
    ToggleCheckbox { id: ImageId, checked: bool },
    /// Switch between list and grid
    ToggleLayout,
    /// Open the variant modal for a single image
    RequestVariant(ImageId),
    /// Close the variant modal
    CloseModal,
    /// Clear the selection
    DeselectAll,
}

/// Scroll position of the feed, in content coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub offset_y: f32,
    pub height: f32,
    pub content_height: f32,
}

impl Viewport {
    pub fn bottom(&self) -> f32 {
        self.offset_y + self.height
    }
}

#[derive(Debug, Default)]
pub struct FeedView {
    selected: BTreeSet<ImageId>,
    layout: Layout,
    variant_modal_opened: bool,
    mounted: HashSet<ImageId>,
}

impl FeedView {
    pub fn new(layout: Layout) -> Self {
        Self {
            layout,
            ..Self::default()
        }
    }

    pub fn apply(&mut self, action: FeedAction) {
        match action {
            FeedAction::ToggleCheckbox { id, checked: true } => {
                self.selected.insert(id);
            }
            FeedAction::ToggleCheckbox { id, checked: false } => {
                self.selected.remove(&id);
            }
            FeedAction::ToggleLayout => self.layout = self.layout.toggled(),
            FeedAction::RequestVariant(id) => {
                self.selected = BTreeSet::from([id]);
                self.variant_modal_opened = true;
            }
            FeedAction::CloseModal => {
                self.variant_modal_opened = false;
                self.selected.clear();
            }
            FeedAction::DeselectAll => self.selected.clear(),
        }
    }

    pub fn selected(&self) -> &BTreeSet<ImageId> {
        &self.selected
    }

    pub fn is_selected(&self, id: ImageId) -> bool {
        self.selected.contains(&id)
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    pub fn is_variant_modal_opened(&self) -> bool {
        self.variant_modal_opened
    }

    pub fn is_mounted(&self, id: ImageId) -> bool {
        self.mounted.contains(&id)
    }

    /// Mount every card overlapping the viewport (plus overscan).
    /// Mounted cards stay mounted. Returns how many were newly mounted.
    pub fn mount_visible(&mut self, layout: &MasonryLayout, viewport: &Viewport) -> usize {
        let top = viewport.offset_y - MOUNT_OVERSCAN;
        let bottom = viewport.bottom() + MOUNT_OVERSCAN;
        let before = self.mounted.len();
        self.mounted.extend(layout.visible_ids(top, bottom));
        self.mounted.len() - before
    }
}

/// Whether the pagination sentinel at the end of the content is on screen
pub fn sentinel_visible(viewport: &Viewport) -> bool {
    viewport.bottom() >= viewport.content_height - SENTINEL_MARGIN
}

/// Whether the feed should ask for the next page now.
///
/// Never while a request is in flight or after an error; the in-flight
/// flag debounces repeated scroll events.
pub fn should_fetch_next(sentinel_visible: bool, flags: &FetchFlags) -> bool {
    sentinel_visible && !flags.is_fetching && !flags.is_error && flags.has_next_page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::card::{CardRect, MasonryLayout};

    fn toggle(id: ImageId, checked: bool) -> FeedAction {
        FeedAction::ToggleCheckbox { id, checked }
    }

    #[test]
    fn test_check_then_uncheck_restores_selection() {
        let mut view = FeedView::default();
        view.apply(toggle(1, true));
        let before = view.selected().clone();

        view.apply(toggle(7, true));
        view.apply(toggle(7, false));

        assert_eq!(view.selected(), &before);
    }

    #[test]
    fn test_unchecking_unknown_id_is_harmless() {
        let mut view = FeedView::default();
        view.apply(toggle(3, false));
        assert!(view.selected().is_empty());
    }

    #[test]
    fn test_toggle_layout_flips() {
        let mut view = FeedView::new(Layout::List);
        view.apply(FeedAction::ToggleLayout);
        assert_eq!(view.layout(), Layout::Grid);
        view.apply(FeedAction::ToggleLayout);
        assert_eq!(view.layout(), Layout::List);
    }

    #[test]
    fn test_request_variant_selects_only_that_image() {
        let mut view = FeedView::default();
        view.apply(toggle(1, true));
        view.apply(toggle(2, true));

        view.apply(FeedAction::RequestVariant(5));

        assert!(view.is_variant_modal_opened());
        assert_eq!(view.selected().iter().copied().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn test_close_modal_clears_selection() {
        let mut view = FeedView::default();
        view.apply(FeedAction::RequestVariant(5));
        view.apply(FeedAction::CloseModal);

        assert!(!view.is_variant_modal_opened());
        assert!(view.selected().is_empty());
    }

    #[test]
    fn test_deselect_all_keeps_modal_state() {
        let mut view = FeedView::default();
        view.apply(FeedAction::RequestVariant(5));
        view.apply(FeedAction::DeselectAll);

        assert!(view.is_variant_modal_opened());
        assert!(view.selected().is_empty());
    }

    #[test]
    fn test_sentinel_visibility() {
        let near_end = Viewport {
            offset_y: 1700.0,
            height: 800.0,
            content_height: 2800.0,
        };
        let far = Viewport {
            offset_y: 0.0,
            ..near_end
        };
        let short_content = Viewport {
            offset_y: 0.0,
            height: 800.0,
            content_height: 300.0,
        };

        assert!(sentinel_visible(&near_end));
        assert!(!sentinel_visible(&far));
        assert!(sentinel_visible(&short_content));
    }

    #[test]
    fn test_should_fetch_next_guards() {
        let idle = FetchFlags {
            has_next_page: true,
            ..Default::default()
        };
        assert!(should_fetch_next(true, &idle));
        assert!(!should_fetch_next(false, &idle));

        let fetching = FetchFlags { is_fetching: true, ..idle };
        assert!(!should_fetch_next(true, &fetching));

        let failed = FetchFlags { is_error: true, ..idle };
        assert!(!should_fetch_next(true, &failed));

        let exhausted = FetchFlags { has_next_page: false, ..idle };
        assert!(!should_fetch_next(true, &exhausted));
    }

    #[test]
    fn test_mounted_cards_stay_mounted() {
        let card = |id, y| CardRect {
            id,
            column: 0,
            x: 0.0,
            y,
            width: 300.0,
            height: 300.0,
        };
        let layout = MasonryLayout {
            columns: vec![vec![0, 1, 2]],
            cards: vec![card(1, 0.0), card(2, 1000.0), card(3, 5000.0)],
            column_width: 300.0,
            content_height: 5300.0,
        };
        let mut view = FeedView::default();

        let top = Viewport {
            offset_y: 0.0,
            height: 600.0,
            content_height: 5300.0,
        };
        assert_eq!(view.mount_visible(&layout, &top), 1);
        assert!(view.is_mounted(1) && !view.is_mounted(2));

        let middle = Viewport { offset_y: 900.0, ..top };
        assert_eq!(view.mount_visible(&layout, &middle), 1);

        // Scrolling back does not unmount anything
        assert_eq!(view.mount_visible(&layout, &top), 0);
        assert!(view.is_mounted(1) && view.is_mounted(2) && !view.is_mounted(3));
    }
}
