/// Query parameter parsing for the feed filters
///
/// Turns a raw query string (`?tags=3&tags=7&sort=Newest`) into a typed
/// `FilterState` and back. Every field is coerced independently and every
/// malformed field is reported; a query with any invalid field is rejected
/// as a whole.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::form_urlencoded;

use super::data::TagId;

/// Largest page size a query may ask for
pub const MAX_LIMIT: i64 = 200;

/// Declares a closed set of query values with a canonical spelling.
/// Parsing is case-insensitive; serialization always uses the canonical name.
macro_rules! query_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|candidate| candidate.as_str().eq_ignore_ascii_case(value.trim()))
            }

            fn expected() -> String {
                Self::ALL.iter().map(|v| v.as_str()).collect::<Vec<_>>().join("|")
            }
        }
    };
}

query_enum!(
    /// Time window an image must have been created in
    Period {
        Day => "Day",
        Week => "Week",
        Month => "Month",
        Year => "Year",
        AllTime => "AllTime",
    }
);

query_enum!(
    /// Feed ordering
    SortOrder {
        MostReactions => "MostReactions",
        MostComments => "MostComments",
        Newest => "Newest",
    }
);

query_enum!(
    /// Plain infinite feed or one page per tag
    ViewMode {
        Feed => "feed",
        Categories => "categories",
    }
);

query_enum!(
    /// Reaction kinds a viewer can leave on an image
    Reaction {
        Like => "Like",
        Dislike => "Dislike",
        Laugh => "Laugh",
        Cry => "Cry",
        Heart => "Heart",
    }
);

query_enum!(
    /// Which part of a profile feed to show
    Section {
        Images => "images",
        Reactions => "reactions",
    }
);

impl Period {
    /// Lower bound on creation time, or None for `AllTime`
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Period::Day => Some(now - Duration::days(1)),
            Period::Week => Some(now - Duration::weeks(1)),
            Period::Month => Some(now - Duration::days(30)),
            Period::Year => Some(now - Duration::days(365)),
            Period::AllTime => None,
        }
    }
}

/// One malformed query field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("`{field}`: expected an integer, got `{value}`")]
    NotAnInteger { field: &'static str, value: String },

    #[error("`{field}`: `{value}` is not one of {expected}")]
    NotInSet {
        field: &'static str,
        value: String,
        expected: String,
    },

    #[error("`{field}`: {value} is outside {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("`{field}`: `{value}` is empty once normalized")]
    EmptySlug { field: &'static str, value: String },

    #[error("`{field}` given more than once")]
    Repeated { field: &'static str },
}

/// All the field errors of a rejected query
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid query: {}", join_errors(.errors))]
pub struct QueryError {
    pub errors: Vec<FieldError>,
}

fn join_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Typed feed filters
///
/// Every field is optional; `None` means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<TagId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub period: Option<Period>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOrder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<ViewMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<Vec<Reaction>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<Section>,
}

// Query keys, in serialization order
const MODEL_ID: &str = "modelId";
const MODEL_VERSION_ID: &str = "modelVersionId";
const POST_ID: &str = "postId";
const COLLECTION_ID: &str = "collectionId";
const USERNAME: &str = "username";
const TAGS: &str = "tags";
const PERIOD: &str = "period";
const SORT: &str = "sort";
const LIMIT: &str = "limit";
const VIEW: &str = "view";
const REACTIONS: &str = "reactions";
const SECTION: &str = "section";

impl FilterState {
    /// Parse a raw query string, with or without the leading `?`
    pub fn from_query_str(query: &str) -> Result<Self, QueryError> {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self::parse(&pairs)
    }

    /// Parse decoded key/value pairs. Keys may repeat for list fields.
    pub fn parse<K, V>(pairs: &[(K, V)]) -> Result<Self, QueryError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut grouped: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for (key, value) in pairs {
            grouped.entry(key.as_ref()).or_default().push(value.as_ref());
        }

        let mut parser = FieldParser {
            grouped,
            errors: Vec::new(),
        };

        let filters = FilterState {
            model_id: parser.id(MODEL_ID),
            model_version_id: parser.id(MODEL_VERSION_ID),
            post_id: parser.id(POST_ID),
            collection_id: parser.id(COLLECTION_ID),
            username: parser.slug(USERNAME),
            tags: parser.id_list(TAGS),
            period: parser.one_of(PERIOD, Period::parse, Period::expected),
            sort: parser.one_of(SORT, SortOrder::parse, SortOrder::expected),
            limit: parser.bounded(LIMIT, 1, MAX_LIMIT),
            view: parser.one_of(VIEW, ViewMode::parse, ViewMode::expected),
            reactions: parser.list_of(REACTIONS, Reaction::parse, Reaction::expected),
            section: parser.one_of(SECTION, Section::parse, Section::expected),
        };

        if parser.errors.is_empty() {
            Ok(filters)
        } else {
            Err(QueryError {
                errors: parser.errors,
            })
        }
    }

    /// Serialize back to a query string (without the leading `?`).
    /// List fields are written as repeated keys.
    pub fn to_query_string(&self) -> String {
        let mut out = form_urlencoded::Serializer::new(String::new());

        let scalars = [
            (MODEL_ID, self.model_id),
            (MODEL_VERSION_ID, self.model_version_id),
            (POST_ID, self.post_id),
            (COLLECTION_ID, self.collection_id),
        ];
        for (key, value) in scalars {
            if let Some(value) = value {
                out.append_pair(key, &value.to_string());
            }
        }
        if let Some(username) = &self.username {
            out.append_pair(USERNAME, username);
        }
        for tag in self.tags.iter().flatten() {
            out.append_pair(TAGS, &tag.to_string());
        }
        if let Some(period) = self.period {
            out.append_pair(PERIOD, period.as_str());
        }
        if let Some(sort) = self.sort {
            out.append_pair(SORT, sort.as_str());
        }
        if let Some(limit) = self.limit {
            out.append_pair(LIMIT, &limit.to_string());
        }
        if let Some(view) = self.view {
            out.append_pair(VIEW, view.as_str());
        }
        for reaction in self.reactions.iter().flatten() {
            out.append_pair(REACTIONS, reaction.as_str());
        }
        if let Some(section) = self.section {
            out.append_pair(SECTION, section.as_str());
        }

        out.finish()
    }

    /// Overlay `overrides` on top of these filters, key by key.
    /// A key set in `overrides` always wins.
    pub fn merged_with(&self, overrides: &FilterState) -> FilterState {
        FilterState {
            model_id: overrides.model_id.or(self.model_id),
            model_version_id: overrides.model_version_id.or(self.model_version_id),
            post_id: overrides.post_id.or(self.post_id),
            collection_id: overrides.collection_id.or(self.collection_id),
            username: overrides.username.clone().or_else(|| self.username.clone()),
            tags: overrides.tags.clone().or_else(|| self.tags.clone()),
            period: overrides.period.or(self.period),
            sort: overrides.sort.or(self.sort),
            limit: overrides.limit.or(self.limit),
            view: overrides.view.or(self.view),
            reactions: overrides.reactions.clone().or_else(|| self.reactions.clone()),
            section: overrides.section.or(self.section),
        }
    }

    /// True when no key is set
    pub fn is_empty(&self) -> bool {
        *self == FilterState::default()
    }
}

/// Normalize free text into a slug: lowercase, whitespace becomes `-`,
/// only `[a-z0-9_.-]` survive, and leading/trailing `-` are trimmed.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.trim().chars() {
        if c.is_whitespace() {
            slug.push('-');
        } else if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
            slug.push(c.to_ascii_lowercase());
        }
    }
    slug.trim_matches('-').to_string()
}

/// Collects field values and errors while a query is parsed
struct FieldParser<'a> {
    grouped: BTreeMap<&'a str, Vec<&'a str>>,
    errors: Vec<FieldError>,
}

impl<'a> FieldParser<'a> {
    /// The single value of a scalar field
    fn single(&mut self, field: &'static str) -> Option<&'a str> {
        let values = self.grouped.get(field)?;
        if values.len() > 1 {
            self.errors.push(FieldError::Repeated { field });
            return None;
        }
        values.first().copied()
    }

    /// Every value of a list field; repeated keys and comma separated values
    /// are both accepted, empty parts are skipped.
    fn many(&self, field: &'static str) -> Vec<&'a str> {
        self.grouped
            .get(field)
            .map(|values| {
                values
                    .iter()
                    .flat_map(|v| v.split(','))
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn integer(&mut self, field: &'static str, value: &str) -> Option<i64> {
        match value.trim().parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => {
                self.errors.push(FieldError::NotAnInteger {
                    field,
                    value: value.to_string(),
                });
                None
            }
        }
    }

    fn bounded(&mut self, field: &'static str, min: i64, max: i64) -> Option<i64> {
        let raw = self.single(field)?;
        let n = self.integer(field, raw)?;
        if n < min || n > max {
            self.errors.push(FieldError::OutOfRange {
                field,
                value: n,
                min,
                max,
            });
            return None;
        }
        Some(n)
    }

    fn id(&mut self, field: &'static str) -> Option<i64> {
        self.bounded(field, 1, i64::MAX)
    }

    fn id_list(&mut self, field: &'static str) -> Option<Vec<i64>> {
        let mut ids = Vec::new();
        for raw in self.many(field) {
            if let Some(n) = self.integer(field, raw) {
                if n < 1 {
                    self.errors.push(FieldError::OutOfRange {
                        field,
                        value: n,
                        min: 1,
                        max: i64::MAX,
                    });
                } else if !ids.contains(&n) {
                    ids.push(n);
                }
            }
        }
        (!ids.is_empty()).then_some(ids)
    }

    fn slug(&mut self, field: &'static str) -> Option<String> {
        let raw = self.single(field)?;
        let slug = slugify(raw);
        if slug.is_empty() {
            self.errors.push(FieldError::EmptySlug {
                field,
                value: raw.to_string(),
            });
            return None;
        }
        Some(slug)
    }

    fn one_of<T>(
        &mut self,
        field: &'static str,
        parse: fn(&str) -> Option<T>,
        expected: fn() -> String,
    ) -> Option<T> {
        let raw = self.single(field)?;
        let parsed = parse(raw);
        if parsed.is_none() {
            self.errors.push(FieldError::NotInSet {
                field,
                value: raw.to_string(),
                expected: expected(),
            });
        }
        parsed
    }

    fn list_of<T: PartialEq>(
        &mut self,
        field: &'static str,
        parse: fn(&str) -> Option<T>,
        expected: fn() -> String,
    ) -> Option<Vec<T>> {
        let mut out = Vec::new();
        for raw in self.many(field) {
            match parse(raw) {
                Some(value) if !out.contains(&value) => out.push(value),
                Some(_) => {}
                None => self.errors.push(FieldError::NotInSet {
                    field,
                    value: raw.to_string(),
                    expected: expected(),
                }),
            }
        }
        (!out.is_empty()).then_some(out)
    }
}
