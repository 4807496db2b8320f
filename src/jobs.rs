/// Background jobs launched from the UI
///
/// Each job runs on the blocking pool with its own catalog connection
/// (rusqlite::Connection is not Send, so the UI's connection can't be
/// shared) and reports back through a message.

use std::path::PathBuf;

use crate::error::FeedError;
use crate::feed::fetcher::PageRequest;
use crate::state::data::{ImageId, Page, UserId};
use crate::state::feed_query::QueryContext;
use crate::state::library::Library;
use crate::state::preferences::{HiddenKind, PreferenceMaps};
use crate::state::query::{FilterState, Reaction};

async fn with_library<T, F>(db_path: PathBuf, job: F) -> Result<T, FeedError>
where
    T: Send + 'static,
    F: FnOnce(&Library) -> Result<T, FeedError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let library = Library::open(&db_path)?;
        job(&library)
    })
    .await?
}

/// Execute a page request from the fetcher
pub async fn fetch_pages(
    db_path: PathBuf,
    request: PageRequest,
    ctx: QueryContext,
) -> Result<Vec<Page>, FeedError> {
    with_library(db_path, move |library| request.run(library, &ctx)).await
}

/// Load the viewer's hidden maps
pub async fn load_preferences(
    db_path: PathBuf,
    viewer: Option<UserId>,
) -> Result<PreferenceMaps, FeedError> {
    with_library(db_path, move |library| library.hidden_preferences(viewer)).await
}

/// Persist a hidden preference
pub async fn hide(
    db_path: PathBuf,
    viewer: UserId,
    kind: HiddenKind,
    target: i64,
) -> Result<(), FeedError> {
    with_library(db_path, move |library| library.hide(viewer, kind, target)).await
}

/// Save the filters of a scope
pub async fn save_filters(
    db_path: PathBuf,
    scope: String,
    filters: FilterState,
) -> Result<(), FeedError> {
    with_library(db_path, move |library| library.save_filters(&scope, &filters)).await
}

/// Record the viewer's reaction to an image
pub async fn react(
    db_path: PathBuf,
    viewer: UserId,
    image_id: ImageId,
    reaction: Reaction,
) -> Result<(), FeedError> {
    with_library(db_path, move |library| {
        Ok(library.react(image_id, viewer, reaction)?)
    })
    .await
}

/// Flag or unflag an image as NSFW
pub async fn set_nsfw(
    db_path: PathBuf,
    image_id: ImageId,
    nsfw: bool,
) -> Result<(), FeedError> {
    with_library(db_path, move |library| Ok(library.set_nsfw(image_id, nsfw)?)).await
}
