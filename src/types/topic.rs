//! Topics, synonyms and time ranges.
//!
//! A topic's `name` is a cached projection of its synonym list and optional
//! time range. Every mutation goes through [`Topic::refresh_name`] so the
//! projection can never drift from the state it is derived from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::ids::{RepositoryId, TopicId};

/// Locale used to pick the display synonym when none is requested.
pub const DEFAULT_LOCALE: &str = "en";

/// Name given to the root topic of a new repository.
pub const ROOT_TOPIC_NAME: &str = "Everything";

/// A locale-tagged name for a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Synonym {
    /// Locale tag, e.g. "en" or "fr".
    pub locale: String,
    /// The name in that locale.
    pub name: String,
}

impl Synonym {
    /// Create a synonym.
    pub fn new(locale: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            name: name.into(),
        }
    }

    /// Create a synonym in the default locale.
    pub fn en(name: impl Into<String>) -> Self {
        Self::new(DEFAULT_LOCALE, name)
    }
}

/// Ordered synonym list of a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Synonyms(Vec<Synonym>);

impl Synonyms {
    /// Create a synonym list.
    pub fn new(synonyms: Vec<Synonym>) -> Self {
        Self(synonyms)
    }

    /// Single-synonym list in the default locale.
    pub fn single(name: impl Into<String>) -> Self {
        Self(vec![Synonym::en(name)])
    }

    /// Name to display for a locale: the first synonym in that locale,
    /// falling back to the first synonym overall.
    pub fn display_name(&self, locale: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|s| s.locale == locale)
            .or_else(|| self.0.first())
            .map(|s| s.name.as_str())
    }

    /// Whether a synonym with this name exists in any locale.
    pub fn contains_name(&self, name: &str) -> bool {
        self.0.iter().any(|s| s.name == name)
    }

    /// Append a synonym unless its name is already present.
    ///
    /// Returns true if the synonym was added.
    pub fn push_unique(&mut self, synonym: Synonym) -> bool {
        if self.contains_name(&synonym.name) {
            return false;
        }
        self.0.push(synonym);
        true
    }

    /// Iterate over the synonyms in order.
    pub fn iter(&self) -> impl Iterator<Item = &Synonym> {
        self.0.iter()
    }

    /// Number of synonyms.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Consume into the inner list.
    pub fn into_inner(self) -> Vec<Synonym> {
        self.0
    }
}

/// How a time range is rendered in front of the topic name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeRangePrefixFormat {
    /// No prefix.
    #[default]
    None,
    /// "1950 "
    StartYear,
    /// "1950-04 "
    StartYearMonth,
}

impl TimeRangePrefixFormat {
    /// Parse a prefix format from its string form.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "NONE" | "" => Some(Self::None),
            "START_YEAR" => Some(Self::StartYear),
            "START_YEAR_MONTH" => Some(Self::StartYearMonth),
            _ => None,
        }
    }
}

impl fmt::Display for TimeRangePrefixFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "NONE"),
            Self::StartYear => write!(f, "START_YEAR"),
            Self::StartYearMonth => write!(f, "START_YEAR_MONTH"),
        }
    }
}

/// Time range associated with a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Start of the range.
    pub starts_at: DateTime<Utc>,
    /// Optional end of the range.
    pub ends_at: Option<DateTime<Utc>>,
    /// Prefix rendering.
    pub prefix_format: TimeRangePrefixFormat,
}

impl TimeRange {
    /// Create a time range.
    pub fn new(
        starts_at: DateTime<Utc>,
        ends_at: Option<DateTime<Utc>>,
        prefix_format: TimeRangePrefixFormat,
    ) -> Self {
        Self {
            starts_at,
            ends_at,
            prefix_format,
        }
    }

    /// Prefix to put in front of the topic name, if any.
    pub fn prefix(&self) -> Option<String> {
        match self.prefix_format {
            TimeRangePrefixFormat::None => None,
            TimeRangePrefixFormat::StartYear => Some(self.starts_at.format("%Y").to_string()),
            TimeRangePrefixFormat::StartYearMonth => {
                Some(self.starts_at.format("%Y-%m").to_string())
            }
        }
    }
}

/// Derive a topic name from its synonyms and time range.
pub fn derive_name(synonyms: &Synonyms, timerange: Option<&TimeRange>) -> String {
    let base = synonyms.display_name(DEFAULT_LOCALE).unwrap_or_default();
    match timerange.and_then(TimeRange::prefix) {
        Some(prefix) => format!("{} {}", prefix, base),
        None => base.to_string(),
    }
}

/// A concept node of the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    /// Unique identifier.
    pub id: TopicId,
    /// Owning repository.
    pub repository_id: RepositoryId,
    /// Display name (derived from synonyms and time range).
    pub name: String,
    /// Locale-tagged synonyms (at least one).
    pub synonyms: Synonyms,
    /// Optional description.
    pub description: Option<String>,
    /// Optional time range.
    pub timerange: Option<TimeRange>,
    /// Whether this is the repository root topic.
    pub root: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Topic {
    /// Create a new non-root topic with a single synonym.
    pub fn new(repository_id: RepositoryId, name: impl Into<String>) -> Self {
        Self::with_synonyms(repository_id, Synonyms::single(name))
    }

    /// Create a new non-root topic from a synonym list.
    pub fn with_synonyms(repository_id: RepositoryId, synonyms: Synonyms) -> Self {
        let mut topic = Self {
            id: TopicId::generate(),
            repository_id,
            name: String::new(),
            synonyms,
            description: None,
            timerange: None,
            root: false,
            created_at: Utc::now(),
        };
        topic.refresh_name();
        topic
    }

    /// Create the root topic of a repository.
    pub fn root(repository_id: RepositoryId) -> Self {
        let mut topic = Self::new(repository_id, ROOT_TOPIC_NAME);
        topic.root = true;
        topic
    }

    /// Set the description.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    /// Replace the synonym list and re-derive the name.
    pub fn set_synonyms(&mut self, synonyms: Synonyms) {
        self.synonyms = synonyms;
        self.refresh_name();
    }

    /// Replace the time range and re-derive the name.
    pub fn set_timerange(&mut self, timerange: Option<TimeRange>) {
        self.timerange = timerange;
        self.refresh_name();
    }

    /// Re-derive the cached name.
    pub fn refresh_name(&mut self) {
        self.name = derive_name(&self.synonyms, self.timerange.as_ref());
    }
}

/// A repository: the owner of one topic hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    /// Unique identifier.
    pub id: RepositoryId,
    /// Repository name.
    pub name: String,
    /// The single root topic.
    pub root_topic_id: TopicId,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}
