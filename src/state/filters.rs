/// Persistent filter store
///
/// Filters the user last browsed with are saved per scope (e.g. "images",
/// "profile") as JSON. The effective filters of a feed are the stored
/// filters with the query-string overrides laid on top.

use rusqlite::OptionalExtension;
use tracing::debug;

use super::library::Library;
use super::query::FilterState;
use crate::error::FeedError;

/// Scope used by the main image feed
pub const DEFAULT_SCOPE: &str = "images";

impl Library {
    /// Filters saved for `scope`, or empty filters if none were saved
    pub fn load_filters(&self, scope: &str) -> Result<FilterState, FeedError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT filters_json FROM filter_scopes WHERE scope = ?1",
                [scope],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(FilterState::default()),
        }
    }

    /// Replace the filters saved for `scope`
    pub fn save_filters(&self, scope: &str, filters: &FilterState) -> Result<(), FeedError> {
        let json = serde_json::to_string(filters)?;
        self.conn.execute(
            "INSERT INTO filter_scopes (scope, filters_json) VALUES (?1, ?2)
             ON CONFLICT(scope) DO UPDATE SET filters_json = excluded.filters_json",
            [scope, json.as_str()],
        )?;
        debug!("saved filters for scope `{}`: {}", scope, json);
        Ok(())
    }

    /// Stored filters for `scope` merged with `overrides` (overrides win)
    pub fn effective_filters(
        &self,
        scope: &str,
        overrides: &FilterState,
    ) -> Result<FilterState, FeedError> {
        Ok(self.load_filters(scope)?.merged_with(overrides))
    }
}
