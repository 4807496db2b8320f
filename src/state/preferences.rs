/// Hidden-content preferences of the viewer
///
/// The feed only ever reads an immutable snapshot of these maps. Changes go
/// through the catalog, after which a fresh snapshot is loaded and swapped in.

use std::collections::HashMap;
use std::sync::Arc;

use super::data::{ImageId, TagId, UserId};
use super::library::Library;
use crate::error::FeedError;

/// What a hidden preference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HiddenKind {
    Image,
    Tag,
    User,
}

impl HiddenKind {
    fn as_str(&self) -> &'static str {
        match self {
            HiddenKind::Image => "image",
            HiddenKind::Tag => "tag",
            HiddenKind::User => "user",
        }
    }
}

/// Identity -> hidden lookups for images, tags and users
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreferenceMaps {
    pub images: HashMap<ImageId, bool>,
    pub tags: HashMap<TagId, bool>,
    pub users: HashMap<UserId, bool>,
}

impl PreferenceMaps {
    pub fn is_image_hidden(&self, id: ImageId) -> bool {
        self.images.get(&id).copied().unwrap_or(false)
    }

    pub fn is_tag_hidden(&self, id: TagId) -> bool {
        self.tags.get(&id).copied().unwrap_or(false)
    }

    pub fn is_user_hidden(&self, id: UserId) -> bool {
        self.users.get(&id).copied().unwrap_or(false)
    }

    /// Mark `id` of `kind` as hidden
    pub fn hide(&mut self, kind: HiddenKind, id: i64) {
        let map = match kind {
            HiddenKind::Image => &mut self.images,
            HiddenKind::Tag => &mut self.tags,
            HiddenKind::User => &mut self.users,
        };
        map.insert(id, true);
    }
}

/// Read-only view of the preferences handed to the feed
#[derive(Debug, Clone)]
pub struct PreferenceSnapshot {
    pub maps: Arc<PreferenceMaps>,
    /// True until the first load completes
    pub loading: bool,
}

impl PreferenceSnapshot {
    /// Snapshot used before the preferences have been loaded
    pub fn loading() -> Self {
        Self {
            maps: Arc::new(PreferenceMaps::default()),
            loading: true,
        }
    }

    pub fn loaded(maps: PreferenceMaps) -> Self {
        Self {
            maps: Arc::new(maps),
            loading: false,
        }
    }
}

impl Library {
    /// Load the hidden maps of `viewer`. Anonymous viewers hide nothing.
    pub fn hidden_preferences(&self, viewer: Option<UserId>) -> Result<PreferenceMaps, FeedError> {
        let mut maps = PreferenceMaps::default();
        let Some(viewer) = viewer else {
            return Ok(maps);
        };

        let mut stmt = self
            .conn
            .prepare("SELECT kind, target_id FROM hidden_preferences WHERE user_id = ?1")?;
        let rows = stmt.query_map([viewer], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        for row in rows {
            let (kind, target) = row?;
            let kind = match kind.as_str() {
                "image" => HiddenKind::Image,
                "tag" => HiddenKind::Tag,
                "user" => HiddenKind::User,
                _ => continue,
            };
            maps.hide(kind, target);
        }

        Ok(maps)
    }

    /// Persist a hidden preference for `viewer`
    pub fn hide(&self, viewer: UserId, kind: HiddenKind, target: i64) -> Result<(), FeedError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO hidden_preferences (user_id, kind, target_id)
             VALUES (?1, ?2, ?3)",
            rusqlite::params![viewer, kind.as_str(), target],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_viewer_hides_nothing() {
        let library = Library::open_in_memory().unwrap();
        library.hide(1, HiddenKind::Tag, 9).unwrap();

        assert_eq!(library.hidden_preferences(None).unwrap(), PreferenceMaps::default());
    }

    #[test]
    fn test_hidden_preferences_are_per_viewer() {
        let library = Library::open_in_memory().unwrap();
        library.hide(1, HiddenKind::Image, 10).unwrap();
        library.hide(1, HiddenKind::User, 20).unwrap();
        library.hide(1, HiddenKind::Tag, 30).unwrap();
        library.hide(2, HiddenKind::Tag, 40).unwrap();

        let maps = library.hidden_preferences(Some(1)).unwrap();

        assert!(maps.is_image_hidden(10));
        assert!(maps.is_user_hidden(20));
        assert!(maps.is_tag_hidden(30));
        assert!(!maps.is_tag_hidden(40));
        assert!(!maps.is_image_hidden(20));
    }

    #[test]
    fn test_snapshot_constructors() {
        assert!(PreferenceSnapshot::loading().loading);
        assert!(!PreferenceSnapshot::loaded(PreferenceMaps::default()).loading);
    }
}
