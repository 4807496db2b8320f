/// Cursor-based paginated fetching
///
/// `PaginatedFetcher` owns the pages the feed has accumulated and decides
/// which request to send next. It never performs I/O itself: every
/// operation hands back a `PageRequest` that the caller runs against the
/// catalog (on a background task), and the response is fed back through
/// `receive`. Only one request is in flight at a time, which is what makes
/// `fetch_next` safe to call on every scroll event.

use tracing::{debug, warn};

use crate::error::FeedError;
use crate::state::data::{Cursor, Item, Page};
use crate::state::feed_query::{Direction, QueryContext};
use crate::state::library::Library;
use crate::state::query::{FilterState, ViewMode};

/// Which query function serves the pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// `get_infinite`
    Infinite,
    /// `get_images_by_category`
    ByCategory,
}

impl QueryKind {
    pub fn for_filters(filters: &FilterState) -> Self {
        match filters.view {
            Some(ViewMode::Categories) => QueryKind::ByCategory,
            _ => QueryKind::Infinite,
        }
    }
}

/// Why a request was sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    First,
    Next,
    Previous,
    Refetch,
}

/// A request the caller must execute and report back with `receive`
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub generation: u64,
    pub kind: RequestKind,
    pub query: QueryKind,
    pub filters: FilterState,
    pub cursor: Option<Cursor>,
    pub direction: Direction,
    /// Pages to load walking forward from `cursor`; above 1 only for a
    /// refetch of several displayed pages
    pub page_count: usize,
}

impl PageRequest {
    /// Load the single page at `cursor`
    pub fn execute(&self, library: &Library, ctx: &QueryContext) -> Result<Page, FeedError> {
        self.page_at(library, ctx, self.cursor.as_ref(), self.direction)
    }

    /// Load `page_count` pages, following next cursors until they run out
    pub fn run(&self, library: &Library, ctx: &QueryContext) -> Result<Vec<Page>, FeedError> {
        let mut pages = vec![self.execute(library, ctx)?];
        while pages.len() < self.page_count {
            let Some(cursor) = pages.last().and_then(|page| page.next_cursor.clone()) else {
                break;
            };
            pages.push(self.page_at(library, ctx, Some(&cursor), Direction::Forward)?);
        }
        Ok(pages)
    }

    fn page_at(
        &self,
        library: &Library,
        ctx: &QueryContext,
        cursor: Option<&Cursor>,
        direction: Direction,
    ) -> Result<Page, FeedError> {
        match self.query {
            QueryKind::Infinite => library.get_infinite(&self.filters, cursor, ctx),
            QueryKind::ByCategory => {
                library.get_images_by_category(&self.filters, cursor, direction, ctx)
            }
        }
    }
}

/// Observable state of the fetcher
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchFlags {
    /// First page in flight and nothing to display yet
    pub is_loading: bool,
    /// Any request in flight
    pub is_fetching: bool,
    /// Reloading from the first page while data is displayed
    pub is_refetching: bool,
    /// The last request failed
    pub is_error: bool,
    /// The last page carries a next cursor
    pub has_next_page: bool,
}

/// The request currently awaited, kept after a failure so `retry` can
/// resend it
#[derive(Debug, Clone)]
struct InFlight {
    generation: u64,
    kind: RequestKind,
    cursor: Option<Cursor>,
    direction: Direction,
}

#[derive(Debug)]
pub struct PaginatedFetcher {
    query: QueryKind,
    filters: FilterState,
    keep_previous_data: bool,
    pages: Vec<Page>,
    in_flight: Option<InFlight>,
    failed: Option<InFlight>,
    generation: u64,
    error: Option<FeedError>,
    data_version: u64,
}

impl PaginatedFetcher {
    /// Create an idle fetcher; call `start` to request the first page.
    ///
    /// With `keep_previous_data`, changing filters leaves the current pages
    /// on display until the first page for the new filters arrives.
    pub fn new(filters: FilterState, keep_previous_data: bool) -> Self {
        Self {
            query: QueryKind::for_filters(&filters),
            filters,
            keep_previous_data,
            pages: Vec::new(),
            in_flight: None,
            failed: None,
            generation: 0,
            error: None,
            data_version: 0,
        }
    }

    pub fn filters(&self) -> &FilterState {
        &self.filters
    }

    pub fn query(&self) -> QueryKind {
        self.query
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// All items of all pages, in page order
    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.pages.iter().flat_map(|page| page.items.iter())
    }

    pub fn error(&self) -> Option<&FeedError> {
        self.error.as_ref()
    }

    /// Increments every time the displayed pages change
    pub fn data_version(&self) -> u64 {
        self.data_version
    }

    pub fn flags(&self) -> FetchFlags {
        let kind = self.in_flight.as_ref().map(|f| f.kind);
        let restarting = matches!(kind, Some(RequestKind::First | RequestKind::Refetch));
        FetchFlags {
            is_loading: restarting && self.pages.is_empty(),
            is_fetching: self.in_flight.is_some(),
            is_refetching: restarting && !self.pages.is_empty(),
            is_error: self.error.is_some(),
            has_next_page: self.next_cursor().is_some(),
        }
    }

    /// The first page carries a previous cursor
    pub fn has_previous_page(&self) -> bool {
        self.pages.first().is_some_and(|page| page.prev_cursor.is_some())
    }

    fn next_cursor(&self) -> Option<&Cursor> {
        self.pages.last().and_then(|page| page.next_cursor.as_ref())
    }

    fn issue(
        &mut self,
        kind: RequestKind,
        cursor: Option<Cursor>,
        direction: Direction,
    ) -> PageRequest {
        self.in_flight = Some(InFlight {
            generation: self.generation,
            kind,
            cursor: cursor.clone(),
            direction,
        });
        debug!(
            "issuing {:?} request (generation {}, cursor {:?})",
            kind, self.generation, cursor
        );
        let page_count = match kind {
            RequestKind::Refetch => self.pages.len().max(1),
            _ => 1,
        };
        PageRequest {
            generation: self.generation,
            kind,
            query: self.query,
            filters: self.filters.clone(),
            cursor,
            direction,
            page_count,
        }
    }

    /// Start a new generation, forgetting any error
    fn restart(&mut self, kind: RequestKind) -> PageRequest {
        self.generation += 1;
        self.error = None;
        self.failed = None;
        self.issue(kind, None, Direction::Forward)
    }

    /// Request the first page, superseding anything in flight
    pub fn start(&mut self) -> PageRequest {
        self.restart(RequestKind::First)
    }

    /// Request the page after the last one.
    ///
    /// Returns None (and changes nothing) while a request is in flight,
    /// after an error, or when there is no next cursor.
    pub fn fetch_next(&mut self) -> Option<PageRequest> {
        if self.in_flight.is_some() || self.error.is_some() {
            return None;
        }
        let cursor = self.next_cursor()?.clone();
        Some(self.issue(RequestKind::Next, Some(cursor), Direction::Forward))
    }

    /// Request the page before the first one. Same no-op rules as
    /// `fetch_next`, using the first page's previous cursor.
    pub fn fetch_previous(&mut self) -> Option<PageRequest> {
        if self.in_flight.is_some() || self.error.is_some() {
            return None;
        }
        let cursor = self.pages.first()?.prev_cursor.clone()?;
        Some(self.issue(RequestKind::Previous, Some(cursor), Direction::Backward))
    }

    /// Switch to new filters and restart from the first page.
    /// Returns None when the filters are unchanged.
    pub fn set_filters(&mut self, filters: FilterState) -> Option<PageRequest> {
        if filters == self.filters {
            return None;
        }
        self.query = QueryKind::for_filters(&filters);
        self.filters = filters;
        if !self.keep_previous_data && !self.pages.is_empty() {
            self.pages.clear();
            self.data_version += 1;
        }
        Some(self.start())
    }

    /// Reload every displayed page from the start, keeping them on
    /// screen until the response arrives.
    pub fn refetch(&mut self) -> PageRequest {
        self.restart(RequestKind::Refetch)
    }

    /// Clear an error and resend exactly the request that failed.
    /// A failed first page or refetch starts a new generation.
    pub fn retry(&mut self) -> Option<PageRequest> {
        if self.in_flight.is_some() {
            return None;
        }
        self.error.take()?;
        let failed = self.failed.take()?;
        let request = match failed.kind {
            RequestKind::First => self.start(),
            RequestKind::Refetch => self.refetch(),
            RequestKind::Next | RequestKind::Previous => {
                self.issue(failed.kind, failed.cursor, failed.direction)
            }
        };
        Some(request)
    }

    /// Apply a single-page response. Returns false when it belongs to a
    /// superseded request and was dropped.
    pub fn receive(&mut self, generation: u64, result: Result<Page, FeedError>) -> bool {
        self.receive_pages(generation, result.map(|page| vec![page]))
    }

    /// Apply the pages loaded by `PageRequest::run`
    pub fn receive_pages(&mut self, generation: u64, result: Result<Vec<Page>, FeedError>) -> bool {
        match &self.in_flight {
            Some(in_flight) if in_flight.generation == generation => {}
            _ => {
                debug!("dropping stale response for generation {}", generation);
                return false;
            }
        }
        let Some(in_flight) = self.in_flight.take() else {
            return false;
        };

        match result {
            Ok(pages) => {
                match in_flight.kind {
                    RequestKind::First | RequestKind::Refetch => self.pages = pages,
                    RequestKind::Next => self.pages.extend(pages),
                    RequestKind::Previous => {
                        for page in pages.into_iter().rev() {
                            if page.items.is_empty() {
                                if let Some(first) = self.pages.first_mut() {
                                    first.prev_cursor = None;
                                }
                            } else {
                                self.pages.insert(0, page);
                            }
                        }
                    }
                }
                self.data_version += 1;
            }
            Err(err) => {
                warn!("{:?} request failed: {}", in_flight.kind, err);
                self.error = Some(err);
                self.failed = Some(in_flight);
            }
        }

        true
    }
}
