/// Cursor-paginated image queries over the catalog
///
/// This is the query layer the feed consumes: `get_infinite` for the plain
/// feed and `get_images_by_category` for one-page-per-tag browsing. Hidden
/// preferences and ingestion status are deliberately not applied here, the
/// feed filters those client-side.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use std::collections::HashMap;
use tracing::debug;

use super::data::{
    Category, Cursor, ImageId, IngestionStatus, Item, Page, ReactionCounts, TagId, UserId,
};
use super::library::{timestamp_to_utc, Library};
use super::query::{FilterState, Section, SortOrder, MAX_LIMIT};
use crate::error::FeedError;

/// Direction of a paginated request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Per-request context that does not come from the filters
#[derive(Debug, Clone, PartialEq)]
pub struct QueryContext {
    /// The current viewer, needed by reaction filters
    pub viewer: Option<UserId>,
    /// Page size when the filters don't set one, within `1..=MAX_LIMIT`
    pub default_limit: i64,
    /// Reference time for period filters
    pub now: DateTime<Utc>,
}

impl QueryContext {
    pub fn new(viewer: Option<UserId>, default_limit: i64) -> Self {
        Self {
            viewer,
            default_limit: default_limit.clamp(1, MAX_LIMIT),
            now: Utc::now(),
        }
    }

    /// Page size for `filters`. Saved filters skip query parsing, so the
    /// bounds are applied again here.
    fn limit(&self, filters: &FilterState) -> i64 {
        filters
            .limit
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_LIMIT)
    }
}

/// Keyset position inside a sorted feed: (sort score, image id)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FeedPosition {
    score: i64,
    id: ImageId,
}

impl FeedPosition {
    fn encode(&self) -> Cursor {
        Cursor(format!("{}:{}", self.score, self.id))
    }

    fn decode(cursor: &Cursor) -> Result<Self, FeedError> {
        let invalid = || FeedError::InvalidCursor(cursor.to_string());
        let (score, id) = cursor.as_str().split_once(':').ok_or_else(invalid)?;
        Ok(FeedPosition {
            score: score.parse().map_err(|_| invalid())?,
            id: id.parse().map_err(|_| invalid())?,
        })
    }
}

fn decode_tag_cursor(cursor: &Cursor) -> Result<TagId, FeedError> {
    cursor
        .as_str()
        .parse()
        .map_err(|_| FeedError::InvalidCursor(cursor.to_string()))
}

/// SQL expression each sort order ranks images by
fn score_expression(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::Newest => "i.imported_at",
        SortOrder::MostComments => "i.comment_count",
        SortOrder::MostReactions => {
            "(SELECT COUNT(*) FROM image_reactions r WHERE r.image_id = i.id)"
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Accumulates WHERE conditions with their positional parameters
#[derive(Default)]
struct Conditions {
    clauses: Vec<String>,
    params: Vec<Value>,
}

impl Conditions {
    fn push(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.clauses.join(" AND "))
        }
    }

    /// Conditions shared by both query kinds. Tag filtering is left to the
    /// caller since category pages replace it with a single tag.
    fn from_filters(filters: &FilterState, ctx: &QueryContext) -> Self {
        let mut conditions = Conditions::default();

        let columns = [
            ("i.model_id", filters.model_id),
            ("i.model_version_id", filters.model_version_id),
            ("i.post_id", filters.post_id),
        ];
        for (column, value) in columns {
            if let Some(value) = value {
                conditions.push(format!("{} = ?", column), [Value::Integer(value)]);
            }
        }

        if let Some(collection_id) = filters.collection_id {
            conditions.push(
                "EXISTS (SELECT 1 FROM collection_images c
                         WHERE c.image_id = i.id AND c.collection_id = ?)",
                [Value::Integer(collection_id)],
            );
        }

        if let Some(username) = &filters.username {
            conditions.push("LOWER(u.username) = ?", [Value::Text(username.clone())]);
        }

        if let Some(since) = filters.period.and_then(|p| p.since(ctx.now)) {
            conditions.push("i.imported_at >= ?", [Value::Integer(since.timestamp())]);
        }

        let wants_reactions =
            filters.reactions.is_some() || filters.section == Some(Section::Reactions);
        if wants_reactions {
            match ctx.viewer {
                Some(viewer) => {
                    let mut clause = String::from(
                        "EXISTS (SELECT 1 FROM image_reactions vr
                                 WHERE vr.image_id = i.id AND vr.user_id = ?",
                    );
                    let mut params = vec![Value::Integer(viewer)];
                    if let Some(reactions) = &filters.reactions {
                        clause.push_str(&format!(
                            " AND vr.reaction IN ({})",
                            placeholders(reactions.len())
                        ));
                        params.extend(
                            reactions
                                .iter()
                                .map(|r| Value::Text(r.as_str().to_string())),
                        );
                    }
                    clause.push(')');
                    conditions.push(clause, params);
                }
                // Reactions belong to a viewer; anonymous requests match nothing
                None => conditions.push("0", Vec::<Value>::new()),
            }
        }

        conditions
    }
}

impl Library {
    /// One page of the plain feed, starting after `cursor`.
    pub fn get_infinite(
        &self,
        filters: &FilterState,
        cursor: Option<&Cursor>,
        ctx: &QueryContext,
    ) -> Result<Page, FeedError> {
        let mut conditions = Conditions::from_filters(filters, ctx);
        if let Some(tags) = &filters.tags {
            conditions.push(
                format!(
                    "EXISTS (SELECT 1 FROM image_tags t
                             WHERE t.image_id = i.id AND t.tag_id IN ({}))",
                    placeholders(tags.len())
                ),
                tags.iter().map(|t| Value::Integer(*t)),
            );
        }

        let sort = filters.sort.unwrap_or(SortOrder::Newest);
        if let Some(cursor) = cursor {
            let position = FeedPosition::decode(cursor)?;
            let score = score_expression(sort);
            conditions.push(
                format!("({score} < ? OR ({score} = ? AND i.id < ?))"),
                [
                    Value::Integer(position.score),
                    Value::Integer(position.score),
                    Value::Integer(position.id),
                ],
            );
        }

        let limit = ctx.limit(filters);
        let (items, positions) = self.query_images(sort, conditions, limit + 1)?;

        let has_more = items.len() as i64 > limit;
        let mut items = items;
        items.truncate(limit as usize);
        let next_cursor = if has_more {
            positions.get(items.len() - 1).map(FeedPosition::encode)
        } else {
            None
        };

        debug!(
            "get_infinite: {} items, next cursor {:?}",
            items.len(),
            next_cursor
        );

        Ok(Page {
            items,
            next_cursor,
            prev_cursor: None,
            category: None,
        })
    }

    /// One category (tag) of images per page.
    ///
    /// Forward pages walk tags in ascending id order after `cursor`;
    /// backward pages walk them in descending order before it. Tags with no
    /// matching images are skipped.
    pub fn get_images_by_category(
        &self,
        filters: &FilterState,
        cursor: Option<&Cursor>,
        direction: Direction,
        ctx: &QueryContext,
    ) -> Result<Page, FeedError> {
        let boundary = cursor.map(decode_tag_cursor).transpose()?;
        let candidates =
            self.category_candidates(filters.tags.as_deref(), boundary, direction)?;

        let sort = filters.sort.unwrap_or(SortOrder::Newest);
        let limit = ctx.limit(filters);
        let in_category = |tag_id: TagId| {
            let mut conditions = Conditions::from_filters(filters, ctx);
            conditions.push(
                "EXISTS (SELECT 1 FROM image_tags t WHERE t.image_id = i.id AND t.tag_id = ?)",
                [Value::Integer(tag_id)],
            );
            conditions
        };

        for (index, category) in candidates.iter().enumerate() {
            let (items, _) = self.query_images(sort, in_category(category.tag_id), limit)?;
            if items.is_empty() {
                continue;
            }

            // Only a later category with matching images earns a cursor
            let mut more_remaining = false;
            for later in &candidates[index + 1..] {
                if self.any_images(in_category(later.tag_id))? {
                    more_remaining = true;
                    break;
                }
            }
            let here = Cursor(category.tag_id.to_string());
            let (next_cursor, prev_cursor) = match direction {
                Direction::Forward => (
                    more_remaining.then(|| here.clone()),
                    boundary.map(|_| here.clone()),
                ),
                Direction::Backward => (None, more_remaining.then(|| here.clone())),
            };

            return Ok(Page {
                items,
                next_cursor,
                prev_cursor,
                category: Some(category.clone()),
            });
        }

        Ok(Page::default())
    }

    fn category_candidates(
        &self,
        only: Option<&[TagId]>,
        boundary: Option<TagId>,
        direction: Direction,
    ) -> Result<Vec<Category>, FeedError> {
        let mut conditions = Conditions::default();
        if let Some(only) = only {
            conditions.push(
                format!("id IN ({})", placeholders(only.len())),
                only.iter().map(|t| Value::Integer(*t)),
            );
        }
        let order = match direction {
            Direction::Forward => {
                if let Some(boundary) = boundary {
                    conditions.push("id > ?", [Value::Integer(boundary)]);
                }
                "ASC"
            }
            Direction::Backward => {
                // A backward request always needs a boundary
                conditions.push("id < ?", [Value::Integer(boundary.unwrap_or(0))]);
                "DESC"
            }
        };

        let sql = format!(
            "SELECT id, name FROM tags {} ORDER BY id {}",
            conditions.sql(),
            order
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(conditions.params), |row| {
            Ok(Category {
                tag_id: row.get(0)?,
                name: row.get(1)?,
            })
        })?;

        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn any_images(&self, conditions: Conditions) -> Result<bool, FeedError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM images i JOIN users u ON u.id = i.user_id {})",
            conditions.sql()
        );
        let found = self.conn.query_row(
            &sql,
            rusqlite::params_from_iter(conditions.params),
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Run the image SELECT, returning items with their keyset positions
    fn query_images(
        &self,
        sort: SortOrder,
        conditions: Conditions,
        limit: i64,
    ) -> Result<(Vec<Item>, Vec<FeedPosition>), FeedError> {
        let score = score_expression(sort);
        let count = |reaction: &str| {
            format!(
                "(SELECT COUNT(*) FROM image_reactions r
                  WHERE r.image_id = i.id AND r.reaction = '{}')",
                reaction
            )
        };

        let sql = format!(
            "SELECT i.id, i.user_id, u.username, i.ingestion, i.width, i.height, i.hash,
                    i.nsfw, i.thumbnail_path, i.comment_count, i.imported_at,
                    {like}, {dislike}, {laugh}, {cry}, {heart},
                    {score}
             FROM images i
             JOIN users u ON u.id = i.user_id
             {where_clause}
             ORDER BY {score} DESC, i.id DESC
             LIMIT {limit}",
            like = count("Like"),
            dislike = count("Dislike"),
            laugh = count("Laugh"),
            cry = count("Cry"),
            heart = count("Heart"),
            score = score,
            where_clause = conditions.sql(),
            limit = limit,
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(conditions.params), |row| {
            let ingestion: String = row.get(3)?;
            let counter = |idx: usize| -> rusqlite::Result<u32> {
                Ok(row.get::<_, i64>(idx)?.max(0) as u32)
            };
            let item = Item {
                id: row.get(0)?,
                user_id: row.get(1)?,
                username: row.get(2)?,
                ingestion: IngestionStatus::from_db(&ingestion),
                tag_ids: Vec::new(),
                width: row.get(4)?,
                height: row.get(5)?,
                hash: row.get(6)?,
                nsfw: row.get(7)?,
                thumbnail_path: row.get(8)?,
                reactions: ReactionCounts {
                    like: counter(11)?,
                    dislike: counter(12)?,
                    laugh: counter(13)?,
                    cry: counter(14)?,
                    heart: counter(15)?,
                    comment: counter(9)?,
                },
                created_at: timestamp_to_utc(row.get(10)?),
            };
            let position = FeedPosition {
                score: row.get(16)?,
                id: item.id,
            };
            Ok((item, position))
        })?;

        let (mut items, positions): (Vec<Item>, Vec<FeedPosition>) =
            rows.collect::<Result<Vec<_>, _>>()?.into_iter().unzip();

        let mut tags = self.tags_for(&items)?;
        for item in &mut items {
            item.tag_ids = tags.remove(&item.id).unwrap_or_default();
        }

        Ok((items, positions))
    }

    fn tags_for(&self, items: &[Item]) -> Result<HashMap<ImageId, Vec<TagId>>, FeedError> {
        let mut tags: HashMap<ImageId, Vec<TagId>> = HashMap::new();
        if items.is_empty() {
            return Ok(tags);
        }

        let sql = format!(
            "SELECT image_id, tag_id FROM image_tags
             WHERE image_id IN ({}) ORDER BY image_id, tag_id",
            placeholders(items.len())
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params_from_iter(items.iter().map(|item| item.id)),
            |row| Ok((row.get::<_, ImageId>(0)?, row.get::<_, TagId>(1)?)),
        )?;
        for row in rows {
            let (image_id, tag_id) = row?;
            tags.entry(image_id).or_default().push(tag_id);
        }

        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::query::{Period, Reaction};

    /// Catalog with `n` scanned images owned by "ada", imported one second apart
    fn seeded(n: i64) -> (Library, UserId, Vec<ImageId>) {
        let library = Library::open_in_memory().unwrap();
        let ada = library.ensure_user("Ada").unwrap();
        let mut ids = Vec::new();
        for i in 0..n {
            let path = format!("/photos/{}.png", i);
            let id = library.import_image(ada, &path, "x.png").unwrap().unwrap();
            library.set_imported_at(id, 1_700_000_000 + i).unwrap();
            library.mark_scanned(id, 900, 600, "hash", None).unwrap();
            ids.push(id);
        }
        (library, ada, ids)
    }

    fn ctx() -> QueryContext {
        QueryContext::new(None, 3)
    }

    fn ids(page: &Page) -> Vec<ImageId> {
        page.items.iter().map(|item| item.id).collect()
    }

    #[test]
    fn test_pages_walk_without_gaps_or_duplicates() {
        let (library, _, all) = seeded(7);
        let filters = FilterState::default();

        let mut seen = Vec::new();
        let mut cursor = None;
        let mut pages = 0;
        loop {
            let page = library.get_infinite(&filters, cursor.as_ref(), &ctx()).unwrap();
            seen.extend(ids(&page));
            pages += 1;
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        let mut newest_first = all.clone();
        newest_first.reverse();
        assert_eq!(seen, newest_first);
        assert_eq!(pages, 3);
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let (library, _, _) = seeded(3);
        let page = library
            .get_infinite(&FilterState::default(), None, &ctx())
            .unwrap();
        assert_eq!(page.items.len(), 3);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_invalid_cursor_is_rejected() {
        let (library, _, _) = seeded(1);
        let err = library
            .get_infinite(&FilterState::default(), Some(&Cursor("nope".into())), &ctx())
            .unwrap_err();
        assert_eq!(err, FeedError::InvalidCursor("nope".into()));
    }

    #[test]
    fn test_filters_by_tag_and_username() {
        let (library, _, ids_) = seeded(4);
        let bob = library.ensure_user("bob").unwrap();
        let bobs = library.import_image(bob, "/photos/bob.png", "bob.png").unwrap().unwrap();
        let cats = library.ensure_tag("cats").unwrap();
        library.tag_image(ids_[1], cats).unwrap();
        library.tag_image(bobs, cats).unwrap();

        let tagged = FilterState {
            tags: Some(vec![cats]),
            limit: Some(10),
            ..Default::default()
        };
        let page = library.get_infinite(&tagged, None, &ctx()).unwrap();
        assert_eq!(ids(&page), vec![bobs, ids_[1]]);
        assert!(page.items.iter().all(|item| item.tag_ids == vec![cats]));

        let by_ada = FilterState {
            username: Some("ada".into()),
            ..tagged
        };
        let page = library.get_infinite(&by_ada, None, &ctx()).unwrap();
        assert_eq!(ids(&page), vec![ids_[1]]);
    }

    #[test]
    fn test_sort_by_reactions() {
        let (library, ada, ids_) = seeded(3);
        let bob = library.ensure_user("bob").unwrap();
        library.react(ids_[0], ada, Reaction::Like).unwrap();
        library.react(ids_[0], bob, Reaction::Heart).unwrap();
        library.react(ids_[2], bob, Reaction::Cry).unwrap();

        let filters = FilterState {
            sort: Some(SortOrder::MostReactions),
            limit: Some(2),
            ..Default::default()
        };
        let first = library.get_infinite(&filters, None, &ctx()).unwrap();
        assert_eq!(ids(&first), vec![ids_[0], ids_[2]]);
        assert_eq!(first.items[0].reactions.total(), 2);
        assert_eq!(first.items[0].reactions.heart, 1);

        let second = library
            .get_infinite(&filters, first.next_cursor.as_ref(), &ctx())
            .unwrap();
        assert_eq!(ids(&second), vec![ids_[1]]);
    }

    #[test]
    fn test_reaction_filter_needs_a_viewer() {
        let (library, ada, ids_) = seeded(2);
        library.react(ids_[1], ada, Reaction::Laugh).unwrap();
        let filters = FilterState {
            reactions: Some(vec![Reaction::Laugh]),
            ..Default::default()
        };

        let anonymous = library.get_infinite(&filters, None, &ctx()).unwrap();
        assert!(anonymous.items.is_empty());

        let viewer = QueryContext::new(Some(ada), 10);
        let page = library.get_infinite(&filters, None, &viewer).unwrap();
        assert_eq!(ids(&page), vec![ids_[1]]);
    }

    #[test]
    fn test_filters_by_origin_and_collection() {
        let (library, _, ids_) = seeded(3);
        library.set_origin(ids_[0], Some(10), Some(11), Some(12)).unwrap();
        library.set_origin(ids_[1], Some(10), Some(99), None).unwrap();
        library.add_to_collection(5, ids_[2]).unwrap();

        let query = |filters: FilterState| {
            ids(&library.get_infinite(&filters, None, &ctx()).unwrap())
        };

        let by_model = query(FilterState {
            model_id: Some(10),
            ..Default::default()
        });
        assert_eq!(by_model, vec![ids_[1], ids_[0]]);

        let by_version = query(FilterState {
            model_version_id: Some(11),
            ..Default::default()
        });
        assert_eq!(by_version, vec![ids_[0]]);

        let by_post = query(FilterState {
            post_id: Some(12),
            ..Default::default()
        });
        assert_eq!(by_post, vec![ids_[0]]);

        let by_collection = query(FilterState {
            collection_id: Some(5),
            ..Default::default()
        });
        assert_eq!(by_collection, vec![ids_[2]]);

        let nowhere = query(FilterState {
            collection_id: Some(6),
            ..Default::default()
        });
        assert!(nowhere.is_empty());
    }

    #[test]
    fn test_period_filter_uses_import_time() {
        let (library, _, ids_) = seeded(3);
        let now = Utc::now();
        library
            .set_imported_at(ids_[0], (now - chrono::Duration::days(3)).timestamp())
            .unwrap();

        let ctx = QueryContext { now, ..ctx() };
        let within = |period: Period| {
            let filters = FilterState {
                period: Some(period),
                ..Default::default()
            };
            ids(&library.get_infinite(&filters, None, &ctx).unwrap())
        };

        assert!(within(Period::Day).is_empty());
        assert_eq!(within(Period::Week), vec![ids_[0]]);
        assert_eq!(within(Period::AllTime).len(), 3);
    }

    #[test]
    fn test_page_limit_is_clamped() {
        assert_eq!(QueryContext::new(None, i64::MAX).default_limit, MAX_LIMIT);
        assert_eq!(QueryContext::new(None, -4).default_limit, 1);

        let (library, _, _) = seeded(2);
        let oversized = FilterState {
            limit: Some(i64::MAX),
            ..Default::default()
        };
        let page = library
            .get_infinite(&oversized, None, &QueryContext::new(None, i64::MAX))
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_category_cursor_stops_before_empty_tags() {
        let (library, _, ids_) = seeded(2);
        let cats = library.ensure_tag("cats").unwrap();
        library.ensure_tag("empty").unwrap();
        library.tag_image(ids_[0], cats).unwrap();

        let page = library
            .get_images_by_category(&FilterState::default(), None, Direction::Forward, &ctx())
            .unwrap();
        assert_eq!(ids(&page), vec![ids_[0]]);
        assert_eq!(page.next_cursor, None);
    }

    #[test]
    fn test_category_pages_skip_empty_tags() {
        let (library, _, ids_) = seeded(3);
        let cats = library.ensure_tag("cats").unwrap();
        let empty = library.ensure_tag("empty").unwrap();
        let dogs = library.ensure_tag("dogs").unwrap();
        library.tag_image(ids_[0], cats).unwrap();
        library.tag_image(ids_[2], dogs).unwrap();
        assert!(empty > cats && dogs > empty);

        let filters = FilterState::default();
        let first = library
            .get_images_by_category(&filters, None, Direction::Forward, &ctx())
            .unwrap();
        assert_eq!(first.category.as_ref().map(|c| c.tag_id), Some(cats));
        assert_eq!(ids(&first), vec![ids_[0]]);
        assert_eq!(first.prev_cursor, None);

        let second = library
            .get_images_by_category(
                &filters,
                first.next_cursor.as_ref(),
                Direction::Forward,
                &ctx(),
            )
            .unwrap();
        assert_eq!(second.category.as_ref().map(|c| c.name.as_str()), Some("dogs"));
        assert_eq!(second.next_cursor, None);

        // Backward from the first category finds nothing
        let before = library
            .get_images_by_category(
                &filters,
                Some(&Cursor(cats.to_string())),
                Direction::Backward,
                &ctx(),
            )
            .unwrap();
        assert_eq!(before, Page::default());
    }
}
