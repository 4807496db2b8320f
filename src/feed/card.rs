/// Card geometry and content for feed entries
///
/// Heights are derived from the image's aspect ratio so the masonry layout
/// can be computed before any image bytes are loaded. Content itself is
/// mounted lazily by the feed view.

use crate::state::data::{IngestionStatus, Item, ImageId, UserId};

use super::view::Layout;

/// Height used when the intrinsic dimensions are unknown
pub const FALLBACK_HEIGHT: u32 = 300;
/// Extra room for the header row above landscape images
pub const HEADER_OFFSET: u32 = 60;
/// No card is ever taller than this
pub const MAX_HEIGHT: u32 = 600;

/// Portrait images (aspect ratio < 1) carry the header row on top of the
/// image instead of above it. Unknown dimensions keep it above.
pub fn header_overlays(width: Option<u32>, height: Option<u32>) -> bool {
    matches!((width, height), (Some(w), Some(h)) if w > 0 && w < h)
}

/// Display height of a card `container_width` pixels wide.
///
/// Landscape and square images (aspect ratio >= 1) get the header row on
/// top of the image; portrait images overlay it.
pub fn card_height(width: Option<u32>, height: Option<u32>, container_width: f32) -> u32 {
    let (Some(width), Some(height)) = (width, height) else {
        return FALLBACK_HEIGHT;
    };
    if width == 0 || height == 0 {
        return FALLBACK_HEIGHT;
    }

    // floor(container / aspect), written as container * height / width
    let image_height = (container_width.max(0.0) as f64 * height as f64 / width as f64).floor();
    let header = if header_overlays(Some(width), Some(height)) {
        0
    } else {
        HEADER_OFFSET
    };

    let total = image_height.min(MAX_HEIGHT as f64) as u32 + header;
    total.min(MAX_HEIGHT)
}

/// What a card shows once it is mounted
#[derive(Debug, Clone, PartialEq)]
pub enum CardContent {
    /// The thumbnail at this path
    Image { path: String },
    /// A solid color derived from the content hash
    Placeholder { color: [u8; 3] },
}

/// Decide what a card may show. Unscanned images (only ever visible to
/// their owner) and NSFW images when not allowed get a placeholder.
pub fn card_content(item: &Item, show_nsfw: bool) -> CardContent {
    let safe = item.ingestion == IngestionStatus::Scanned && (show_nsfw || !item.nsfw);

    match (&item.thumbnail_path, safe) {
        (Some(path), true) => CardContent::Image { path: path.clone() },
        _ => {
            let seed = item
                .hash
                .clone()
                .unwrap_or_else(|| format!("image-{}", item.id));
            CardContent::Placeholder {
                color: placeholder_color(&seed),
            }
        }
    }
}

/// Muted color for a placeholder, stable for a given hash
pub fn placeholder_color(seed: &str) -> [u8; 3] {
    let digest = blake3::hash(seed.as_bytes());
    let bytes = digest.as_bytes();
    // Pull every channel halfway towards mid-gray so placeholders stay calm
    [bytes[0], bytes[1], bytes[2]].map(|c| (c / 2) + 64)
}

/// Spacing and width limits of the feed layout
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutSettings {
    /// Grid columns are never narrower than this
    pub min_column_width: f32,
    /// List layout is never wider than this
    pub max_list_width: f32,
    /// Gap between columns and between cards
    pub gap: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            min_column_width: 300.0,
            max_list_width: 600.0,
            gap: 16.0,
        }
    }
}

/// Position of one card in the feed
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CardRect {
    pub id: ImageId,
    pub column: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl CardRect {
    /// Whether the card overlaps the vertical band `[top, bottom)`
    pub fn intersects(&self, top: f32, bottom: f32) -> bool {
        self.y < bottom && self.y + self.height > top
    }
}

/// Masonry placement of the visible items
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MasonryLayout {
    /// Card indices per column, top to bottom
    pub columns: Vec<Vec<usize>>,
    /// One rectangle per item, in item order
    pub cards: Vec<CardRect>,
    pub column_width: f32,
    pub content_height: f32,
}

impl MasonryLayout {
    /// Place `items` into columns. Each card goes into the currently
    /// shortest column (leftmost on ties), so item order reads roughly
    /// left-to-right, top-to-bottom.
    pub fn compute(
        items: &[Item],
        available_width: f32,
        layout: Layout,
        settings: &LayoutSettings,
    ) -> Self {
        let available_width = available_width.max(1.0);
        let gap = settings.gap;

        let (column_count, column_width) = match layout {
            Layout::List => (1, available_width.min(settings.max_list_width)),
            Layout::Grid => {
                let fit = (available_width + gap) / (settings.min_column_width + gap);
                let count = (fit.floor() as usize).max(1);
                let width = (available_width - gap * (count - 1) as f32) / count as f32;
                (count, width)
            }
        };

        let mut columns = vec![Vec::new(); column_count];
        let mut heights = vec![0.0_f32; column_count];
        let mut cards = Vec::with_capacity(items.len());

        for (index, item) in items.iter().enumerate() {
            let column = heights
                .iter()
                .enumerate()
                .fold(0, |best, (i, h)| if *h < heights[best] { i } else { best });

            let height = card_height(item.width, item.height, column_width) as f32;
            cards.push(CardRect {
                id: item.id,
                column,
                x: column as f32 * (column_width + gap),
                y: heights[column],
                width: column_width,
                height,
            });
            columns[column].push(index);
            heights[column] += height + gap;
        }

        let content_height = heights
            .iter()
            .map(|h| (h - gap).max(0.0))
            .fold(0.0, f32::max);

        Self {
            columns,
            cards,
            column_width,
            content_height,
        }
    }

    /// Ids of the cards overlapping `[top, bottom)`
    pub fn visible_ids(&self, top: f32, bottom: f32) -> impl Iterator<Item = ImageId> + '_ {
        self.cards
            .iter()
            .filter(move |card| card.intersects(top, bottom))
            .map(|card| card.id)
    }
}

/// Owner-only badge text for images still going through ingestion
pub fn ingestion_badge(item: &Item, viewer: Option<UserId>) -> Option<&'static str> {
    if viewer != Some(item.user_id) {
        return None;
    }
    match item.ingestion {
        IngestionStatus::Scanned => None,
        IngestionStatus::Pending => Some("Processing"),
        IngestionStatus::Error => Some("Failed to process"),
        IngestionStatus::Blocked => Some("Blocked"),
        IngestionStatus::NotFound => Some("File missing"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(id: i64, width: Option<u32>, height: Option<u32>) -> Item {
        Item {
            id,
            user_id: 1,
            username: "ada".into(),
            ingestion: IngestionStatus::Scanned,
            tag_ids: Vec::new(),
            width,
            height,
            hash: Some("LEHV6nWB2yk8".into()),
            nsfw: false,
            thumbnail_path: Some(format!("/cache/{}.jpg", id)),
            reactions: Default::default(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_landscape_height_includes_header() {
        assert_eq!(card_height(Some(900), Some(600), 450.0), 360);
    }

    #[test]
    fn test_portrait_height_has_no_header() {
        // aspect 0.5: 200 / 0.5 = 400
        assert_eq!(card_height(Some(300), Some(600), 200.0), 400);
    }

    #[test]
    fn test_header_overlays_only_portrait() {
        assert!(header_overlays(Some(300), Some(600)));
        assert!(!header_overlays(Some(600), Some(300)));
        assert!(!header_overlays(Some(500), Some(500)));
        assert!(!header_overlays(None, Some(600)));
    }

    #[test]
    fn test_square_counts_as_landscape() {
        assert_eq!(card_height(Some(500), Some(500), 100.0), 160);
    }

    #[test]
    fn test_missing_dimensions_use_fallback() {
        for width in [0.0, 120.0, 450.0, 4000.0] {
            assert_eq!(card_height(None, Some(600), width), FALLBACK_HEIGHT);
            assert_eq!(card_height(Some(900), None, width), FALLBACK_HEIGHT);
            assert_eq!(card_height(None, None, width), FALLBACK_HEIGHT);
        }
        assert_eq!(card_height(Some(0), Some(600), 450.0), FALLBACK_HEIGHT);
    }

    #[test]
    fn test_height_never_exceeds_max() {
        let dims = [(1, 10_000), (10_000, 1), (900, 600), (1, 1), (3, 7)];
        let widths = [0.0, 1.0, 450.0, 1200.0, 100_000.0];
        for (w, h) in dims {
            for container in widths {
                assert!(card_height(Some(w), Some(h), container) <= MAX_HEIGHT);
            }
        }
    }

    #[test]
    fn test_floor_is_applied() {
        // 100 / (3/2) = 66.67
        assert_eq!(card_height(Some(3), Some(2), 100.0), 66 + HEADER_OFFSET);
    }

    #[test]
    fn test_unsafe_content_gets_placeholder() {
        let mut pending = item(1, Some(10), Some(10));
        pending.ingestion = IngestionStatus::Pending;
        assert!(matches!(card_content(&pending, true), CardContent::Placeholder { .. }));

        let mut nsfw = item(2, Some(10), Some(10));
        nsfw.nsfw = true;
        assert!(matches!(card_content(&nsfw, false), CardContent::Placeholder { .. }));
        assert_eq!(
            card_content(&nsfw, true),
            CardContent::Image { path: "/cache/2.jpg".into() }
        );
    }

    #[test]
    fn test_placeholder_color_is_stable() {
        let a = item(1, None, None);
        let mut b = item(2, None, None);
        b.ingestion = IngestionStatus::Error;
        let mut c = a.clone();
        c.ingestion = IngestionStatus::Error;

        assert_eq!(card_content(&b, false), card_content(&c, false));
        assert_eq!(placeholder_color("x"), placeholder_color("x"));
    }

    #[test]
    fn test_grid_places_cards_in_shortest_column() {
        let settings = LayoutSettings {
            min_column_width: 100.0,
            max_list_width: 600.0,
            gap: 0.0,
        };
        let items = [
            item(1, Some(100), Some(300)), // 300 tall
            item(2, Some(100), Some(100)), // 100 + header
            item(3, None, None),           // fallback 300
            item(4, None, None),
        ];

        let layout = MasonryLayout::compute(&items, 200.0, Layout::Grid, &settings);

        assert_eq!(layout.columns.len(), 2);
        assert_eq!(layout.column_width, 100.0);
        assert_eq!(layout.columns[0], vec![0, 3]);
        assert_eq!(layout.columns[1], vec![1, 2]);
        assert_eq!(layout.cards[2].y, 160.0);
        assert_eq!(layout.content_height, 600.0);
    }

    #[test]
    fn test_list_layout_is_single_capped_column() {
        let settings = LayoutSettings::default();
        let items = [item(1, Some(900), Some(600)), item(2, None, None)];

        let layout = MasonryLayout::compute(&items, 1200.0, Layout::List, &settings);

        assert_eq!(layout.columns.len(), 1);
        assert_eq!(layout.column_width, settings.max_list_width);
        assert_eq!(layout.cards[1].y, layout.cards[0].height + settings.gap);
    }

    #[test]
    fn test_visible_ids_by_band() {
        let settings = LayoutSettings {
            gap: 0.0,
            ..LayoutSettings::default()
        };
        let items = [item(1, None, None), item(2, None, None), item(3, None, None)];
        let layout = MasonryLayout::compute(&items, 300.0, Layout::List, &settings);

        let ids: Vec<_> = layout.visible_ids(350.0, 500.0).collect();
        assert_eq!(ids, vec![2]);
        let ids: Vec<_> = layout.visible_ids(0.0, 301.0).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_ingestion_badge_only_for_owner() {
        let mut pending = item(1, None, None);
        pending.ingestion = IngestionStatus::Pending;

        assert_eq!(ingestion_badge(&pending, Some(1)), Some("Processing"));
        assert_eq!(ingestion_badge(&pending, Some(2)), None);
        assert_eq!(ingestion_badge(&item(2, None, None), Some(1)), None);
    }
}
