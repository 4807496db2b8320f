use iced::widget::scrollable;
use iced::{window, Element, Size, Subscription, Task, Theme};
use rfd::FileDialog;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod feed;
mod ingest;
mod jobs;
mod state;
mod ui;

use config::AppConfig;
use error::{FeedError, StartupError};
use feed::card::{LayoutSettings, MasonryLayout};
use feed::fetcher::{PageRequest, PaginatedFetcher};
use feed::view::{self as feed_view, FeedAction, FeedView, Layout, Viewport};
use feed::visibility::VisibilityCache;
use ingest::import::ImportResult;
use ingest::scan::ScanOutcome;
use state::data::{ImageId, Item, Page, UserId};
use state::feed_query::QueryContext;
use state::library::Library;
use state::preferences::{HiddenKind, PreferenceMaps, PreferenceSnapshot};
use state::query::{FilterState, Reaction, ViewMode};

const USAGE: &str = "\
image-feed

USAGE:
  image-feed [--query <QUERY>] [--scope <SCOPE>] [--config <PATH>]

OPTIONS:
  --query <QUERY>   Filter overrides as a query string, e.g. \"tags=3&sort=Newest\"
  --scope <SCOPE>   Saved filter scope to start from
  --config <PATH>   Config file (default: <config dir>/image-feed/config.toml)
  -h, --help        Print this help
";

/// Initial window size; also the layout width until the first resize event
const WINDOW_SIZE: Size = Size::new(1280.0, 860.0);
/// Horizontal padding around the feed
const FEED_PADDING: f32 = 20.0;
/// Vertical space taken by the toolbar and status line
const CHROME_HEIGHT: f32 = 110.0;

/// Everything resolved before the window opens
struct Startup {
    config: AppConfig,
    db_path: PathBuf,
    scope: String,
    viewer: Option<UserId>,
    filters: FilterState,
}

/// Main application state
struct FeedApp {
    config: AppConfig,
    db_path: PathBuf,
    scope: String,
    viewer: Option<UserId>,
    settings: LayoutSettings,
    /// Pages fetched so far
    fetcher: PaginatedFetcher,
    /// Hidden-content snapshot; swapped wholesale on reload
    preferences: PreferenceSnapshot,
    /// Set when the last preference load failed, cleared by Retry
    preferences_error: Option<FeedError>,
    visibility: VisibilityCache,
    /// Visible items, derived from fetcher + preferences
    visible: Arc<[Item]>,
    view: FeedView,
    masonry: MasonryLayout,
    viewport: Viewport,
    available_width: f32,
    /// Status message to display to the user
    status: String,
}

/// Application messages (events)
#[derive(Debug, Clone)]
pub enum Message {
    PreferencesLoaded(Result<PreferenceMaps, FeedError>),
    PageLoaded {
        generation: u64,
        result: Result<Vec<Page>, FeedError>,
    },
    Feed(FeedAction),
    Scrolled(scrollable::Viewport),
    WindowResized(Size),
    ToggleCategories,
    FetchPrevious,
    Refresh,
    Retry,
    Hide(HiddenKind, i64),
    HideComplete(Result<(), FeedError>),
    React(ImageId, Reaction),
    SetNsfw(ImageId, bool),
    CatalogUpdated(Result<(), FeedError>),
    FiltersSaved(Result<(), FeedError>),
    /// User clicked the "Import Folder" button
    ImportFolder,
    ImportComplete(Result<ImportResult, FeedError>),
    ScanComplete(Result<ScanOutcome, FeedError>),
}

impl FeedApp {
    /// Create the application and kick off the initial loads
    fn new(startup: Startup) -> (Self, Task<Message>) {
        let Startup {
            config,
            db_path,
            scope,
            viewer,
            filters,
        } = startup;

        let mut fetcher = PaginatedFetcher::new(filters, true);
        let first_page = fetcher.start();

        let mut app = FeedApp {
            settings: config.layout_settings(),
            config,
            db_path,
            scope,
            viewer,
            fetcher,
            preferences: PreferenceSnapshot::loading(),
            preferences_error: None,
            visibility: VisibilityCache::new(),
            visible: Arc::from(Vec::new()),
            view: FeedView::new(Layout::Grid),
            masonry: MasonryLayout::default(),
            viewport: Viewport {
                offset_y: 0.0,
                height: WINDOW_SIZE.height - CHROME_HEIGHT,
                content_height: 0.0,
            },
            available_width: WINDOW_SIZE.width - 2.0 * FEED_PADDING,
            status: String::from("Loading..."),
        };
        app.refresh_visible();

        let tasks = Task::batch([
            app.load_preferences(),
            app.run(first_page),
            app.scan_pending(),
        ]);

        (app, tasks)
    }

    /// Handle application messages and update state
    fn update(&mut self, message: Message) -> Task<Message> {
        match message {
            Message::PreferencesLoaded(Ok(maps)) => {
                self.preferences = PreferenceSnapshot::loaded(maps);
                self.preferences_error = None;
                self.refresh_visible();
                self.maybe_fetch_next()
            }
            Message::PreferencesLoaded(Err(err)) => {
                // Stay fail-closed: the feed shows nothing until preferences load
                error!("loading preferences failed: {}", err);
                self.status = format!("Could not load preferences: {}", err);
                self.preferences_error = Some(err);
                Task::none()
            }
            Message::PageLoaded { generation, result } => {
                if self.fetcher.receive_pages(generation, result) {
                    self.refresh_visible();
                    self.update_status();
                }
                self.maybe_fetch_next()
            }
            Message::Feed(action) => {
                let relayout = action == FeedAction::ToggleLayout;
                self.view.apply(action);
                if relayout {
                    self.relayout();
                }
                Task::none()
            }
            Message::Scrolled(viewport) => {
                self.viewport.offset_y = viewport.absolute_offset().y;
                self.viewport.height = viewport.bounds().height;
                self.view.mount_visible(&self.masonry, &self.viewport);
                self.maybe_fetch_next()
            }
            Message::WindowResized(size) => {
                self.available_width = (size.width - 2.0 * FEED_PADDING).max(1.0);
                self.viewport.height = (size.height - CHROME_HEIGHT).max(1.0);
                self.relayout();
                self.maybe_fetch_next()
            }
            Message::ToggleCategories => {
                let mut filters = self.fetcher.filters().clone();
                filters.view = match filters.view {
                    Some(ViewMode::Categories) => Some(ViewMode::Feed),
                    _ => Some(ViewMode::Categories),
                };
                self.set_filters(filters)
            }
            Message::FetchPrevious => match self.fetcher.fetch_previous() {
                Some(request) => self.run(request),
                None => Task::none(),
            },
            Message::Refresh => {
                let request = self.fetcher.refetch();
                self.run(request)
            }
            Message::Retry => {
                let preferences = match self.preferences_error.take() {
                    Some(_) => self.load_preferences(),
                    None => Task::none(),
                };
                let page = match self.fetcher.retry() {
                    Some(request) => self.run(request),
                    None => Task::none(),
                };
                Task::batch([preferences, page])
            }
            Message::Hide(kind, target) => {
                let Some(viewer) = self.viewer else {
                    self.status = String::from("Set `viewer` in the config to hide content.");
                    return Task::none();
                };
                Task::perform(
                    jobs::hide(self.db_path.clone(), viewer, kind, target),
                    Message::HideComplete,
                )
            }
            Message::HideComplete(Ok(())) => self.load_preferences(),
            Message::HideComplete(Err(err)) => {
                warn!("hiding failed: {}", err);
                self.status = format!("Could not hide: {}", err);
                Task::none()
            }
            Message::React(image_id, reaction) => {
                let Some(viewer) = self.viewer else {
                    return Task::none();
                };
                Task::perform(
                    jobs::react(self.db_path.clone(), viewer, image_id, reaction),
                    Message::CatalogUpdated,
                )
            }
            Message::SetNsfw(image_id, nsfw) => Task::perform(
                jobs::set_nsfw(self.db_path.clone(), image_id, nsfw),
                Message::CatalogUpdated,
            ),
            Message::CatalogUpdated(Ok(())) => {
                let request = self.fetcher.refetch();
                self.run(request)
            }
            Message::CatalogUpdated(Err(err)) => {
                warn!("catalog update failed: {}", err);
                self.status = format!("Could not save: {}", err);
                Task::none()
            }
            Message::FiltersSaved(result) => {
                if let Err(err) = result {
                    warn!("saving filters for `{}` failed: {}", self.scope, err);
                }
                Task::none()
            }
            Message::ImportFolder => {
                let Some(owner) = self.viewer else {
                    self.status = String::from("Set `viewer` in the config to import images.");
                    return Task::none();
                };

                // Show the native folder picker dialog
                let folder = FileDialog::new()
                    .set_title("Select Folder with Images")
                    .pick_folder();

                if let Some(folder_path) = folder {
                    self.status = format!("Importing from {}...", folder_path.display());
                    let import = ingest::import::import_folder_async(
                        self.db_path.clone(),
                        owner,
                        folder_path,
                    );
                    return Task::perform(import, Message::ImportComplete);
                }

                Task::none()
            }
            Message::ImportComplete(Ok(result)) => {
                self.status = format!(
                    "Import complete! Added {} images, skipped {} duplicates.",
                    result.imported_count, result.skipped_count
                );
                let refetch = self.fetcher.refetch();
                Task::batch([self.run(refetch), self.scan_pending()])
            }
            Message::ImportComplete(Err(err)) => {
                self.status = format!("Import failed: {}", err);
                Task::none()
            }
            Message::ScanComplete(Ok(outcome)) => {
                if outcome.total() == 0 {
                    return Task::none();
                }
                // More may be pending; keep going batch by batch
                let refetch = self.fetcher.refetch();
                Task::batch([self.run(refetch), self.scan_pending()])
            }
            Message::ScanComplete(Err(err)) => {
                error!("ingestion scan failed: {}", err);
                Task::none()
            }
        }
    }

    /// Build the user interface
    fn view(&self) -> Element<Message> {
        ui::feed::view(ui::feed::FeedScreen {
            fetcher: &self.fetcher,
            preferences: &self.preferences,
            visible: &self.visible,
            view: &self.view,
            masonry: &self.masonry,
            settings: &self.settings,
            viewer: self.viewer,
            show_nsfw: self.config.show_nsfw,
            status: &self.status,
            preferences_failed: self.preferences_error.is_some(),
            padding: FEED_PADDING,
        })
    }

    fn subscription(&self) -> Subscription<Message> {
        window::resize_events().map(|(_id, size)| Message::WindowResized(size))
    }

    /// Set the application theme
    fn theme(&self) -> Theme {
        Theme::Dark
    }

    /// Recompute the visible list (memoized) and its layout
    fn refresh_visible(&mut self) {
        self.visible = self.visibility.get(
            self.fetcher.data_version(),
            || self.fetcher.items(),
            &self.preferences,
            self.viewer,
        );
        debug!(
            "{} visible items ({} filter runs)",
            self.visible.len(),
            self.visibility.computations()
        );
        self.relayout();
    }

    fn relayout(&mut self) {
        self.masonry = MasonryLayout::compute(
            &self.visible,
            self.available_width,
            self.view.layout(),
            &self.settings,
        );
        self.viewport.content_height = self.masonry.content_height;
        self.view.mount_visible(&self.masonry, &self.viewport);
    }

    fn update_status(&mut self) {
        let flags = self.fetcher.flags();
        self.status = if let Some(err) = self.fetcher.error() {
            format!("Loading failed: {}", err)
        } else if flags.has_next_page {
            format!("{} images", self.visible.len())
        } else {
            format!("{} images, end of feed", self.visible.len())
        };
    }

    /// Ask for the next page if the sentinel is on screen and the fetcher is idle.
    /// Nothing is laid out until preferences load, so the sentinel can't be
    /// trusted before that.
    fn maybe_fetch_next(&mut self) -> Task<Message> {
        if self.preferences.loading {
            return Task::none();
        }
        let sentinel = feed_view::sentinel_visible(&self.viewport);
        if !feed_view::should_fetch_next(sentinel, &self.fetcher.flags()) {
            return Task::none();
        }
        match self.fetcher.fetch_next() {
            Some(request) => self.run(request),
            None => Task::none(),
        }
    }

    fn set_filters(&mut self, filters: FilterState) -> Task<Message> {
        let Some(request) = self.fetcher.set_filters(filters.clone()) else {
            return Task::none();
        };
        self.refresh_visible();
        let save = Task::perform(
            jobs::save_filters(self.db_path.clone(), self.scope.clone(), filters),
            Message::FiltersSaved,
        );
        Task::batch([self.run(request), save])
    }

    /// Execute a fetcher request in the background
    fn run(&self, request: PageRequest) -> Task<Message> {
        let generation = request.generation;
        let ctx = QueryContext::new(self.viewer, self.config.page_limit);
        Task::perform(
            jobs::fetch_pages(self.db_path.clone(), request, ctx),
            move |result| Message::PageLoaded { generation, result },
        )
    }

    fn load_preferences(&self) -> Task<Message> {
        Task::perform(
            jobs::load_preferences(self.db_path.clone(), self.viewer),
            Message::PreferencesLoaded,
        )
    }

    fn scan_pending(&self) -> Task<Message> {
        Task::perform(
            ingest::scan::scan_pending_async(
                self.db_path.clone(),
                self.config.thumbnail_dir(),
                self.config.scan_batch_size,
            ),
            Message::ScanComplete,
        )
    }
}

/// Parse arguments, load config and prepare the catalog
fn prepare() -> Result<Option<Startup>, StartupError> {
    let mut args = pico_args::Arguments::from_env();
    if args.contains(["-h", "--help"]) {
        print!("{}", USAGE);
        return Ok(None);
    }

    let config_path: Option<PathBuf> = args.opt_value_from_str("--config")?;
    let query: Option<String> = args.opt_value_from_str("--query")?;
    let scope: Option<String> = args.opt_value_from_str("--scope")?;
    let remaining = args.finish();
    if !remaining.is_empty() {
        warn!("ignoring unexpected arguments: {:?}", remaining);
    }

    let config = match &config_path {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_or_default(None),
    };
    let overrides = match &query {
        Some(query) => FilterState::from_query_str(query)?,
        None => FilterState::default(),
    };
    let scope = scope.unwrap_or_else(|| config.filter_scope.clone());

    let db_path = config.database_path();
    let library = Library::open(&db_path)?;
    let viewer = config
        .viewer
        .as_deref()
        .map(|name| library.ensure_user(name))
        .transpose()?;

    let filters = library.effective_filters(&scope, &overrides)?;
    library.save_filters(&scope, &filters)?;
    library.verify_files()?;

    info!(
        "image feed initialized with {} images (scope `{}`, filters `{}`)",
        library.image_count()?,
        scope,
        filters.to_query_string()
    );

    Ok(Some(Startup {
        config,
        db_path,
        scope,
        viewer,
        filters,
    }))
}

fn main() -> Result<(), StartupError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("image_feed=info")),
        )
        .init();

    let Some(startup) = prepare()? else {
        return Ok(());
    };

    iced::application("Image Feed", FeedApp::update, FeedApp::view)
        .subscription(FeedApp::subscription)
        .theme(FeedApp::theme)
        .window_size(WINDOW_SIZE)
        .centered()
        .run_with(move || FeedApp::new(startup))?;

    Ok(())
}
