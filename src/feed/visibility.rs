/// Client-side visibility filter
///
/// Removes items the viewer should not see: unscanned images of other
/// users and anything the viewer has hidden (image, owner or tag). The
/// viewer's own images are always shown.

use std::sync::Arc;

use crate::state::data::{IngestionStatus, Item, UserId};
use crate::state::preferences::{PreferenceMaps, PreferenceSnapshot};

/// Whether a single item is visible to `viewer`
pub fn is_visible(item: &Item, maps: &PreferenceMaps, viewer: Option<UserId>) -> bool {
    if viewer == Some(item.user_id) {
        return true;
    }
    if item.ingestion != IngestionStatus::Scanned {
        return false;
    }
    if maps.is_image_hidden(item.id) || maps.is_user_hidden(item.user_id) {
        return false;
    }
    !item.tag_ids.iter().any(|tag| maps.is_tag_hidden(*tag))
}

/// The visible subset of `items`, order preserved.
///
/// Nothing is returned while the preferences are still loading, so hidden
/// content never flashes on screen.
pub fn filter_visible<'a>(
    items: impl IntoIterator<Item = &'a Item>,
    prefs: &PreferenceSnapshot,
    viewer: Option<UserId>,
) -> Vec<Item> {
    if prefs.loading {
        return Vec::new();
    }
    items
        .into_iter()
        .filter(|item| is_visible(item, &prefs.maps, viewer))
        .cloned()
        .collect()
}

/// Inputs the cached result depends on
#[derive(Debug, Clone)]
struct CacheKey {
    data_version: u64,
    maps: Arc<PreferenceMaps>,
    loading: bool,
    viewer: Option<UserId>,
}

impl CacheKey {
    fn matches(&self, other: &CacheKey) -> bool {
        self.data_version == other.data_version
            && Arc::ptr_eq(&self.maps, &other.maps)
            && self.loading == other.loading
            && self.viewer == other.viewer
    }
}

/// Memoized `filter_visible`.
///
/// Recomputes only when the item data version, the preference snapshot
/// (by identity), the loading flag or the viewer changes.
#[derive(Debug)]
pub struct VisibilityCache {
    key: Option<CacheKey>,
    visible: Arc<[Item]>,
    computations: u64,
}

impl Default for VisibilityCache {
    fn default() -> Self {
        Self {
            key: None,
            visible: Arc::from(Vec::new()),
            computations: 0,
        }
    }
}

impl VisibilityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visible items for the given inputs. `items` is only iterated when
    /// the cached result is out of date.
    pub fn get<'a, I>(
        &mut self,
        data_version: u64,
        items: impl FnOnce() -> I,
        prefs: &PreferenceSnapshot,
        viewer: Option<UserId>,
    ) -> Arc<[Item]>
    where
        I: IntoIterator<Item = &'a Item>,
    {
        let key = CacheKey {
            data_version,
            maps: Arc::clone(&prefs.maps),
            loading: prefs.loading,
            viewer,
        };

        let fresh = self.key.as_ref().is_some_and(|cached| cached.matches(&key));
        if !fresh {
            self.visible = filter_visible(items(), prefs, viewer).into();
            self.key = Some(key);
            self.computations += 1;
        }

        Arc::clone(&self.visible)
    }

    /// How many times the filter actually ran
    pub fn computations(&self) -> u64 {
        self.computations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    const VIEWER: UserId = 1;
    const OTHER: UserId = 2;

    fn item(id: i64, owner: UserId, ingestion: IngestionStatus, tags: &[i64]) -> Item {
        Item {
            id,
            user_id: owner,
            username: format!("user{}", owner),
            ingestion,
            tag_ids: tags.to_vec(),
            width: Some(100),
            height: Some(100),
            hash: None,
            nsfw: false,
            thumbnail_path: None,
            reactions: Default::default(),
            created_at: Utc::now(),
        }
    }

    fn everything_hidden() -> PreferenceMaps {
        let mut maps = PreferenceMaps::default();
        for id in 0..10 {
            maps.images.insert(id, true);
            maps.tags.insert(id, true);
            maps.users.insert(id, true);
        }
        maps
    }

    fn ids(items: &[Item]) -> Vec<i64> {
        items.iter().map(|item| item.id).collect()
    }

    #[test]
    fn test_owner_always_sees_own_items() {
        let prefs = PreferenceSnapshot::loaded(everything_hidden());
        let items = [
            item(1, VIEWER, IngestionStatus::Pending, &[3]),
            item(2, VIEWER, IngestionStatus::Blocked, &[]),
            item(3, VIEWER, IngestionStatus::Scanned, &[1, 2]),
        ];

        let visible = filter_visible(&items, &prefs, Some(VIEWER));
        assert_eq!(ids(&visible), vec![1, 2, 3]);
    }

    #[test]
    fn test_unscanned_items_of_others_are_excluded() {
        let prefs = PreferenceSnapshot::loaded(PreferenceMaps::default());
        let items = [
            item(1, OTHER, IngestionStatus::Pending, &[]),
            item(2, OTHER, IngestionStatus::Error, &[]),
            item(3, OTHER, IngestionStatus::NotFound, &[]),
            item(4, OTHER, IngestionStatus::Blocked, &[]),
            item(5, OTHER, IngestionStatus::Scanned, &[]),
        ];

        assert_eq!(ids(&filter_visible(&items, &prefs, Some(VIEWER))), vec![5]);
        assert_eq!(ids(&filter_visible(&items, &prefs, None)), vec![5]);
    }

    #[test]
    fn test_hidden_image_owner_and_tag_are_excluded() {
        let mut maps = PreferenceMaps::default();
        maps.images.insert(1, true);
        maps.users.insert(3, true);
        maps.tags.insert(40, true);
        // Explicitly un-hidden entries don't hide anything
        maps.tags.insert(41, false);
        let prefs = PreferenceSnapshot::loaded(maps);

        let items = [
            item(1, OTHER, IngestionStatus::Scanned, &[]),
            item(2, 3, IngestionStatus::Scanned, &[]),
            item(3, OTHER, IngestionStatus::Scanned, &[7, 40]),
            item(4, OTHER, IngestionStatus::Scanned, &[41]),
            item(5, OTHER, IngestionStatus::Scanned, &[]),
        ];

        assert_eq!(ids(&filter_visible(&items, &prefs, Some(VIEWER))), vec![4, 5]);
    }

    #[test]
    fn test_loading_preferences_yield_nothing() {
        let items = [
            item(1, VIEWER, IngestionStatus::Scanned, &[]),
            item(2, OTHER, IngestionStatus::Scanned, &[]),
        ];

        let visible = filter_visible(&items, &PreferenceSnapshot::loading(), Some(VIEWER));
        assert!(visible.is_empty());
    }

    #[test]
    fn test_cache_recomputes_only_on_input_change() {
        let items = vec![item(1, OTHER, IngestionStatus::Scanned, &[])];
        let prefs = PreferenceSnapshot::loaded(PreferenceMaps::default());
        let mut cache = VisibilityCache::new();

        let first = cache.get(1, || &items, &prefs, None);
        let second = cache.get(1, || &items, &prefs, None);
        assert_eq!(cache.computations(), 1);
        assert!(Arc::ptr_eq(&first, &second));

        // Same contents in a new snapshot is still a new input
        let reloaded = PreferenceSnapshot::loaded(PreferenceMaps::default());
        cache.get(1, || &items, &reloaded, None);
        assert_eq!(cache.computations(), 2);

        cache.get(2, || &items, &reloaded, None);
        cache.get(2, || &items, &reloaded, Some(VIEWER));
        assert_eq!(cache.computations(), 4);
    }

    #[test]
    fn test_cache_follows_loading_transition() {
        let items = vec![item(1, OTHER, IngestionStatus::Scanned, &[])];
        let mut cache = VisibilityCache::new();

        let loading = PreferenceSnapshot::loading();
        assert!(cache.get(1, || &items, &loading, None).is_empty());

        let loaded = PreferenceSnapshot::loaded(PreferenceMaps::default());
        assert_eq!(cache.get(1, || &items, &loaded, None).len(), 1);
    }
}
