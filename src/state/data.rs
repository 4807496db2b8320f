/// Shared data structures for the application state
///
/// These structs represent the data model that flows between
/// the catalog layer, the feed pipeline and the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of an image in the catalog
pub type ImageId = i64;
/// Identity of a user (image owner or viewer)
pub type UserId = i64;
/// Identity of a tag
pub type TagId = i64;

/// Moderation/processing state of an image
///
/// Only `Scanned` images are ever shown to someone other than their owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IngestionStatus {
    /// Imported but not yet processed
    Pending,
    /// Decoded successfully, dimensions and thumbnail are known
    Scanned,
    /// Decoding failed
    Error,
    /// Rejected by moderation
    Blocked,
    /// The source file disappeared before it could be scanned
    NotFound,
}

impl IngestionStatus {
    /// Name stored in the `images.ingestion` column
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestionStatus::Pending => "Pending",
            IngestionStatus::Scanned => "Scanned",
            IngestionStatus::Error => "Error",
            IngestionStatus::Blocked => "Blocked",
            IngestionStatus::NotFound => "NotFound",
        }
    }

    /// Parse the stored column value; unknown values are treated as `Pending`
    /// so they stay hidden from non-owners.
    pub fn from_db(value: &str) -> Self {
        match value {
            "Scanned" => IngestionStatus::Scanned,
            "Error" => IngestionStatus::Error,
            "Blocked" => IngestionStatus::Blocked,
            "NotFound" => IngestionStatus::NotFound,
            _ => IngestionStatus::Pending,
        }
    }
}

/// Reaction and comment counters displayed on a card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactionCounts {
    pub like: u32,
    pub dislike: u32,
    pub laugh: u32,
    pub cry: u32,
    pub heart: u32,
    pub comment: u32,
}

impl ReactionCounts {
    /// Sum of all reactions (comments excluded)
    pub fn total(&self) -> u32 {
        self.like + self.dislike + self.laugh + self.cry + self.heart
    }
}

/// A single entry of the feed
///
/// Created by the catalog, never mutated by the feed pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    /// Unique catalog ID
    pub id: ImageId,
    /// Owner of the image
    pub user_id: UserId,
    /// Owner's username, for display
    pub username: String,
    /// Moderation/processing state
    pub ingestion: IngestionStatus,
    /// Tags attached to the image
    pub tag_ids: Vec<TagId>,
    /// Intrinsic width in pixels (None until scanned)
    pub width: Option<u32>,
    /// Intrinsic height in pixels (None until scanned)
    pub height: Option<u32>,
    /// Content hash used for the placeholder visualization
    pub hash: Option<String>,
    /// Flagged as not safe for work
    pub nsfw: bool,
    /// Path to the generated thumbnail (None if not yet generated)
    pub thumbnail_path: Option<String>,
    /// Reaction counters
    pub reactions: ReactionCounts,
    /// Import time
    pub created_at: DateTime<Utc>,
}

/// Opaque position in a paginated sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cursor(pub String);

impl Cursor {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The tag a category-style page belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub tag_id: TagId,
    pub name: String,
}

/// One page of results from the query layer
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Items in the order the query layer returned them
    pub items: Vec<Item>,
    /// Cursor for the following page; None at the end of data
    pub next_cursor: Option<Cursor>,
    /// Cursor for the preceding page (category queries only)
    pub prev_cursor: Option<Cursor>,
    /// Set for category-style pages
    pub category: Option<Category>,
}
