/// The feed pipeline
///
/// - Paginated fetching with in-flight tracking (fetcher.rs)
/// - Client-side visibility filtering and its cache (visibility.rs)
/// - Selection/layout/modal state and the pagination trigger (view.rs)
/// - Card geometry, masonry layout and content decisions (card.rs)

pub mod card;
pub mod fetcher;
pub mod view;
pub mod visibility;
