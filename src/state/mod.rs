/// State management module
///
/// This module handles all persistent and shared application state:
/// - Database connections and catalog maintenance (library.rs)
/// - Shared data structures (data.rs)
/// - Query string parsing into typed filters (query.rs)
/// - Cursor-paginated feed queries (feed_query.rs)
/// - Saved filters per scope (filters.rs)
/// - Hidden-content preferences (preferences.rs)

pub mod data;
pub mod feed_query;
pub mod filters;
pub mod library;
pub mod preferences;
pub mod query;
