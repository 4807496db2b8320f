/// Widgets of the feed window
pub mod card;
pub mod feed;
