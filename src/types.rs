use std::{fmt, sync::LazyLock};

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static REPO_COMPONENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+$").expect("repository component pattern is valid")
});

#[derive(Debug, Error, PartialEq)]
pub enum RepoError {
    #[error("Repository must be in format 'owner/repo', got: '{0}'")]
    Format(String),
    #[error("Invalid repository component: '{0}'")]
    InvalidComponent(String),
}

/// A GitHub repository identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repo {
    owner: String,
    name: String,
}

impl Repo {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, RepoError> {
        let owner = owner.into();
        let name = name.into();
        for component in [&owner, &name] {
            if !REPO_COMPONENT.is_match(component) {
                return Err(RepoError::InvalidComponent(component.clone()));
            }
        }
        Ok(Self { owner, name })
    }

    pub fn parse(repo: &str) -> Result<Self, RepoError> {
        match repo.trim().split_once('/') {
            Some((owner, name)) if !name.contains('/') => Self::new(owner, name),
            _ => Err(RepoError::Format(repo.to_string())),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Date field a search window is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeQualifier {
    Created,
    Closed,
    Merged,
}

impl TimeQualifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeQualifier::Created => "created",
            TimeQualifier::Closed => "closed",
            TimeQualifier::Merged => "merged",
        }
    }
}

impl fmt::Display for TimeQualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An inclusive range of calendar days used as a search qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl QueryWindow {
    /// Returns `None` when `end` precedes `start`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (end >= start).then_some(Self { start, end })
    }

    /// Number of calendar days covered, counting both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Search qualifier such as `created:2024-01-01..2024-01-07`.
    pub fn qualifier(&self, field: TimeQualifier) -> String {
        format!("{field}:{self}")
    }
}

impl fmt::Display for QueryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Inputs of one windowed collection run. Not modified once the run starts.
#[derive(Debug, Clone)]
pub struct CollectionRequest {
    pub base_query: String,
    pub qualifier: TimeQualifier,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub page_size: u32,
}

/// Quota telemetry read from the `X-RateLimit-*` response headers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateLimitState {
    pub remaining: Option<u32>,
    pub limit: Option<u32>,
    pub reset_at: Option<DateTime<Utc>>,
}

impl RateLimitState {
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }

    pub fn remaining_display(&self) -> String {
        self.remaining.map_or_else(|| "?".to_string(), |v| v.to_string())
    }

    pub fn limit_display(&self) -> String {
        self.limit.map_or_else(|| "?".to_string(), |v| v.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Actor {
    #[serde(default)]
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PullRequestRef {
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
}

/// A single result item from the issue search endpoint.
///
/// Pull requests and issues share this shape; `pull_request` is only
/// present for pull requests.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchItem {
    pub number: u64,
    #[serde(default)]
    pub user: Option<Actor>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub comments: Option<u64>,
    #[serde(default)]
    pub pull_request: Option<PullRequestRef>,
}

impl SearchItem {
    /// Login of the author, or `None` for deleted accounts.
    pub fn actor_login(&self) -> Option<String> {
        self.user
            .as_ref()
            .and_then(|user| user.login.as_deref())
            .filter(|login| !login.is_empty())
            .map(str::to_string)
    }

    pub fn merged_at(&self) -> Option<DateTime<Utc>> {
        self.pull_request
            .as_ref()
            .and_then(|pr| pr.merged_at)
            .or(self.closed_at)
    }
}

/// Body of a search endpoint response.
#[derive(Debug, Deserialize)]
pub struct SearchResponse {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<SearchItem>,
}

/// One page of search results.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub items: Vec<SearchItem>,
    pub total_count: u64,
    pub has_more: bool,
    pub rate_limit: RateLimitState,
}

/// The five activity collections feeding the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    PrsOpened,
    PrsClosed,
    PrsMerged,
    IssuesOpened,
    IssuesClosed,
}

impl RecordKind {
    pub const ALL: [RecordKind; 5] = [
        RecordKind::PrsOpened,
        RecordKind::PrsClosed,
        RecordKind::PrsMerged,
        RecordKind::IssuesOpened,
        RecordKind::IssuesClosed,
    ];

    /// Search terms that select this kind, before repository scoping.
    pub fn type_terms(&self) -> &'static [&'static str] {
        match self {
            RecordKind::PrsOpened | RecordKind::PrsClosed => &["is:pr"],
            RecordKind::PrsMerged => &["is:pr", "is:merged"],
            RecordKind::IssuesOpened | RecordKind::IssuesClosed => &["is:issue"],
        }
    }

    pub fn qualifier(&self) -> TimeQualifier {
        match self {
            RecordKind::PrsOpened | RecordKind::IssuesOpened => TimeQualifier::Created,
            RecordKind::PrsClosed | RecordKind::IssuesClosed => TimeQualifier::Closed,
            RecordKind::PrsMerged => TimeQualifier::Merged,
        }
    }

    pub fn file_name(&self) -> &'static str {
        match self {
            RecordKind::PrsOpened => "prs_opened.csv",
            RecordKind::PrsClosed => "prs_closed.csv",
            RecordKind::PrsMerged => "prs_merged.csv",
            RecordKind::IssuesOpened => "issues_opened.csv",
            RecordKind::IssuesClosed => "issues_closed.csv",
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            RecordKind::PrsOpened => &["pr_number", "author", "created_at", "comments"],
            RecordKind::PrsClosed => &[
                "pr_number",
                "author",
                "created_at",
                "closed_at",
                "comments",
            ],
            RecordKind::PrsMerged => &[
                "pr_number",
                "author",
                "created_at",
                "merged_at",
                "comments",
            ],
            RecordKind::IssuesOpened => &["issue_number", "opened_by", "created_at", "comments"],
            RecordKind::IssuesClosed => &[
                "issue_number",
                "opened_by",
                "created_at",
                "closed_at",
                "comments",
            ],
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RecordKind::PrsOpened => "PRs opened",
            RecordKind::PrsClosed => "PRs closed",
            RecordKind::PrsMerged => "PRs merged",
            RecordKind::IssuesOpened => "Issues opened",
            RecordKind::IssuesClosed => "Issues closed",
        };
        f.write_str(label)
    }
}

/// Accessors the aggregation engine needs from every row type.
pub trait ActivityRow {
    fn actor(&self) -> Option<&str>;
    fn comments(&self) -> Option<u64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrOpenedRow {
    pub pr_number: u64,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub comments: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrClosedRow {
    pub pr_number: u64,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub comments: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrMergedRow {
    pub pr_number: u64,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
    pub merged_at: Option<DateTime<Utc>>,
    pub comments: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueOpenedRow {
    pub issue_number: u64,
    pub opened_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub comments: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueClosedRow {
    pub issue_number: u64,
    pub opened_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub comments: Option<u64>,
}

macro_rules! activity_row {
    ($ty:ident, $actor:ident) => {
        impl ActivityRow for $ty {
            fn actor(&self) -> Option<&str> {
                self.$actor.as_deref().filter(|login| !login.is_empty())
            }

            fn comments(&self) -> Option<u64> {
                self.comments
            }
        }
    };
}

activity_row!(PrOpenedRow, author);
activity_row!(PrClosedRow, author);
activity_row!(PrMergedRow, author);
activity_row!(IssueOpenedRow, opened_by);
activity_row!(IssueClosedRow, opened_by);

impl From<&SearchItem> for PrOpenedRow {
    fn from(item: &SearchItem) -> Self {
        Self {
            pr_number: item.number,
            author: item.actor_login(),
            created_at: item.created_at,
            comments: item.comments,
        }
    }
}

impl From<&SearchItem> for PrClosedRow {
    fn from(item: &SearchItem) -> Self {
        Self {
            pr_number: item.number,
            author: item.actor_login(),
            created_at: item.created_at,
            closed_at: item.closed_at,
            comments: item.comments,
        }
    }
}

impl From<&SearchItem> for PrMergedRow {
    fn from(item: &SearchItem) -> Self {
        Self {
            pr_number: item.number,
            author: item.actor_login(),
            created_at: item.created_at,
            merged_at: item.merged_at(),
            comments: item.comments,
        }
    }
}

impl From<&SearchItem> for IssueOpenedRow {
    fn from(item: &SearchItem) -> Self {
        Self {
            issue_number: item.number,
            opened_by: item.actor_login(),
            created_at: item.created_at,
            comments: item.comments,
        }
    }
}

impl From<&SearchItem> for IssueClosedRow {
    fn from(item: &SearchItem) -> Self {
        Self {
            issue_number: item.number,
            opened_by: item.actor_login(),
            created_at: item.created_at,
            closed_at: item.closed_at,
            comments: item.comments,
        }
    }
}

/// Normalized records of a single kind.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordSet {
    PrsOpened(Vec<PrOpenedRow>),
    PrsClosed(Vec<PrClosedRow>),
    PrsMerged(Vec<PrMergedRow>),
    IssuesOpened(Vec<IssueOpenedRow>),
    IssuesClosed(Vec<IssueClosedRow>),
}

impl RecordSet {
    pub fn from_items(kind: RecordKind, items: &[SearchItem]) -> Self {
        match kind {
            RecordKind::PrsOpened => RecordSet::PrsOpened(items.iter().map(Into::into).collect()),
            RecordKind::PrsClosed => RecordSet::PrsClosed(items.iter().map(Into::into).collect()),
            RecordKind::PrsMerged => RecordSet::PrsMerged(items.iter().map(Into::into).collect()),
            RecordKind::IssuesOpened => {
                RecordSet::IssuesOpened(items.iter().map(Into::into).collect())
            }
            RecordKind::IssuesClosed => {
                RecordSet::IssuesClosed(items.iter().map(Into::into).collect())
            }
        }
    }

    pub fn empty(kind: RecordKind) -> Self {
        Self::from_items(kind, &[])
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            RecordSet::PrsOpened(_) => RecordKind::PrsOpened,
            RecordSet::PrsClosed(_) => RecordKind::PrsClosed,
            RecordSet::PrsMerged(_) => RecordKind::PrsMerged,
            RecordSet::IssuesOpened(_) => RecordKind::IssuesOpened,
            RecordSet::IssuesClosed(_) => RecordKind::IssuesClosed,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RecordSet::PrsOpened(rows) => rows.len(),
            RecordSet::PrsClosed(rows) => rows.len(),
            RecordSet::PrsMerged(rows) => rows.len(),
            RecordSet::IssuesOpened(rows) => rows.len(),
            RecordSet::IssuesClosed(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_json(user: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "number": 42,
            "user": user,
            "created_at": "2024-01-02T03:04:05Z",
            "closed_at": "2024-01-05T00:00:00Z",
            "comments": 3,
            "pull_request": { "merged_at": "2024-01-04T12:00:00Z" }
        })
    }

    #[test]
    fn test_repo_parse() {
        let repo = Repo::parse("PostHog/posthog").unwrap();
        assert_eq!(repo.owner(), "PostHog");
        assert_eq!(repo.name(), "posthog");
        assert_eq!(repo.to_string(), "PostHog/posthog");

        assert!(matches!(Repo::parse("posthog"), Err(RepoError::Format(_))));
        assert!(matches!(Repo::parse("a/b/c"), Err(RepoError::Format(_))));
        assert!(matches!(
            Repo::parse("owner/"),
            Err(RepoError::InvalidComponent(_))
        ));
        assert!(matches!(
            Repo::parse("own er/repo"),
            Err(RepoError::InvalidComponent(_))
        ));
    }

    #[test]
    fn test_window_qualifier_and_days() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        let window = QueryWindow::new(start, end).unwrap();

        assert_eq!(window.days(), 7);
        assert_eq!(
            window.qualifier(TimeQualifier::Merged),
            "merged:2024-01-01..2024-01-07"
        );
        assert!(QueryWindow::new(end, start).is_none());
    }

    #[test]
    fn test_rate_limit_display() {
        let known = RateLimitState {
            remaining: Some(12),
            limit: Some(30),
            reset_at: None,
        };
        assert_eq!(known.remaining_display(), "12");
        assert_eq!(known.limit_display(), "30");
        assert_eq!(RateLimitState::default().remaining_display(), "?");
        assert!(!known.is_exhausted());
        assert!(!RateLimitState::default().is_exhausted());
    }

    #[test]
    fn test_search_item_with_null_user_normalizes_to_empty_actor() {
        let item: SearchItem = serde_json::from_value(item_json(serde_json::Value::Null)).unwrap();
        assert_eq!(item.actor_login(), None);

        let row = PrClosedRow::from(&item);
        assert_eq!(row.author, None);
        assert_eq!(row.actor(), None);
        assert_eq!(row.comments, Some(3));
    }

    #[test]
    fn test_search_item_tolerates_missing_optional_fields() {
        let item: SearchItem = serde_json::from_value(serde_json::json!({
            "number": 7,
            "created_at": "2024-01-02T03:04:05Z"
        }))
        .unwrap();

        let row = IssueClosedRow::from(&item);
        assert_eq!(row.issue_number, 7);
        assert_eq!(row.opened_by, None);
        assert_eq!(row.closed_at, None);
        assert_eq!(row.comments, None);
    }

    #[test]
    fn test_merged_at_prefers_pull_request_field() {
        let item: SearchItem =
            serde_json::from_value(item_json(serde_json::json!({ "login": "alice" }))).unwrap();
        let row = PrMergedRow::from(&item);

        assert_eq!(row.author.as_deref(), Some("alice"));
        assert_eq!(
            row.merged_at.unwrap().to_rfc3339(),
            "2024-01-04T12:00:00+00:00"
        );

        let mut without_pr = item.clone();
        without_pr.pull_request = None;
        assert_eq!(without_pr.merged_at(), item.closed_at);
    }

    #[test]
    fn test_record_set_from_items_keeps_order() {
        let first: SearchItem =
            serde_json::from_value(item_json(serde_json::json!({ "login": "alice" }))).unwrap();
        let mut second = first.clone();
        second.number = 43;

        let set = RecordSet::from_items(RecordKind::IssuesOpened, &[first, second]);
        assert_eq!(set.kind(), RecordKind::IssuesOpened);
        assert_eq!(set.len(), 2);
        match set {
            RecordSet::IssuesOpened(rows) => {
                assert_eq!(rows[0].issue_number, 42);
                assert_eq!(rows[1].issue_number, 43);
                assert_eq!(rows[0].opened_by.as_deref(), Some("alice"));
            }
            other => panic!("unexpected record set: {other:?}"),
        }
        assert!(RecordSet::empty(RecordKind::PrsMerged).is_empty());
    }
}
