//! Search query construction and page-by-page retrieval.
//!
//! The issue search endpoint exposes at most [`SEARCH_RESULT_CAP`] results
//! for any query string, served as [`MAX_PAGES`] pages. [`fetch_all`] walks
//! those pages and reports the declared total so callers can tell whether
//! anything was left behind.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    error::CollectError,
    types::{QueryWindow, Repo, SearchItem, SearchPage, TimeQualifier},
};

/// Hard ceiling on reachable results per query string.
pub const SEARCH_RESULT_CAP: u64 = 1000;

/// Pages past this one are never served by the endpoint.
pub const MAX_PAGES: u32 = 10;

/// Parameters of one search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParams {
    pub query: String,
    pub page: u32,
    pub per_page: u32,
}

impl SearchParams {
    /// Query-string pairs, sorted by last update so that page boundaries
    /// stay stable across a run.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        vec![
            ("q", self.query.clone()),
            ("per_page", self.per_page.to_string()),
            ("page", self.page.to_string()),
            ("sort", "updated".to_string()),
            ("order", "desc".to_string()),
        ]
    }
}

/// A source of issue search results.
///
/// Implemented by [`crate::GitHub`] for the real endpoint and by test
/// doubles elsewhere.
#[async_trait]
pub trait SearchApi {
    async fn execute(&self, params: &SearchParams) -> Result<SearchPage, CollectError>;
}

#[derive(Debug, Default)]
pub struct SearchQueryBuilder {
    terms: Vec<String>,
}

impl SearchQueryBuilder {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    pub fn repo(&mut self, repo: &Repo) -> &mut Self {
        self.terms.push(format!("repo:{repo}"));
        self
    }

    pub fn term(&mut self, term: &str) -> &mut Self {
        self.terms.push(term.to_string());
        self
    }

    pub fn terms(&mut self, terms: &[&str]) -> &mut Self {
        for term in terms {
            self.term(term);
        }
        self
    }

    pub fn window(&mut self, field: TimeQualifier, window: &QueryWindow) -> &mut Self {
        self.terms.push(window.qualifier(field));
        self
    }

    pub fn build(&self) -> String {
        self.terms.join(" ")
    }
}

/// Appends a date-range qualifier to an already built base query.
pub fn windowed_query(base_query: &str, field: TimeQualifier, window: &QueryWindow) -> String {
    let mut builder = SearchQueryBuilder::new();
    if !base_query.is_empty() {
        builder.term(base_query);
    }
    builder.window(field, window).build()
}

/// Retrieves every reachable page for `query`.
///
/// Returns the concatenated items together with the total count declared
/// by the first page. Stops on a short page or after [`MAX_PAGES`]. Any
/// error aborts the walk.
pub async fn fetch_all<S>(
    api: &S,
    query: &str,
    per_page: u32,
) -> Result<(Vec<SearchItem>, u64), CollectError>
where
    S: SearchApi + Sync + ?Sized,
{
    let mut items = Vec::new();
    let mut total_count = None;

    debug!(query, "Searching");

    for page in 1..=MAX_PAGES {
        let params = SearchParams {
            query: query.to_string(),
            page,
            per_page,
        };
        let result = api.execute(&params).await?;
        let page_len = result.items.len();

        info!(
            page,
            items = page_len,
            rate_remaining = %result.rate_limit.remaining_display(),
            rate_limit = %result.rate_limit.limit_display(),
            "Search page fetched"
        );

        total_count.get_or_insert(result.total_count);
        items.extend(result.items);

        if page_len == 0 || page_len < per_page as usize || !result.has_more {
            break;
        }
    }

    Ok((items, total_count.unwrap_or(0)))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{NaiveDate, TimeZone, Utc};

    use super::*;
    use crate::types::RateLimitState;

    struct FixedPages {
        total_count: u64,
        page_sizes: Vec<usize>,
        calls: Mutex<Vec<SearchParams>>,
    }

    impl FixedPages {
        fn new(total_count: u64, page_sizes: Vec<usize>) -> Self {
            Self {
                total_count,
                page_sizes,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn pages_requested(&self) -> Vec<u32> {
            self.calls.lock().unwrap().iter().map(|p| p.page).collect()
        }
    }

    fn item(number: u64) -> SearchItem {
        SearchItem {
            number,
            user: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            closed_at: None,
            comments: Some(0),
            pull_request: None,
        }
    }

    #[async_trait]
    impl SearchApi for FixedPages {
        async fn execute(&self, params: &SearchParams) -> Result<SearchPage, CollectError> {
            self.calls.lock().unwrap().push(params.clone());
            let size = self
                .page_sizes
                .get(params.page as usize - 1)
                .copied()
                .unwrap_or(0);
            let offset = (params.page as u64 - 1) * params.per_page as u64;
            Ok(SearchPage {
                items: (0..size as u64).map(|i| item(offset + i + 1)).collect(),
                total_count: self.total_count,
                has_more: size == params.per_page as usize,
                rate_limit: RateLimitState::default(),
            })
        }
    }

    struct Failing;

    #[async_trait]
    impl SearchApi for Failing {
        async fn execute(&self, _params: &SearchParams) -> Result<SearchPage, CollectError> {
            Err(CollectError::TransientApi {
                status: 500,
                body: "boom".to_string(),
            })
        }
    }

    #[test]
    fn test_query_builder() {
        let repo = Repo::new("PostHog", "posthog").unwrap();
        let query = SearchQueryBuilder::new()
            .repo(&repo)
            .terms(&["is:pr", "is:merged"])
            .build();
        assert_eq!(query, "repo:PostHog/posthog is:pr is:merged");
    }

    #[test]
    fn test_windowed_query() {
        let window = QueryWindow::new(
            NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
        )
        .unwrap();
        assert_eq!(
            windowed_query("repo:o/r is:issue", TimeQualifier::Closed, &window),
            "repo:o/r is:issue closed:2024-01-08..2024-01-10"
        );
    }

    #[test]
    fn test_params_pairs_fix_sort_order() {
        let params = SearchParams {
            query: "is:pr".to_string(),
            page: 3,
            per_page: 50,
        };
        let pairs = params.to_pairs();
        assert!(pairs.contains(&("sort", "updated".to_string())));
        assert!(pairs.contains(&("order", "desc".to_string())));
        assert!(pairs.contains(&("page", "3".to_string())));
        assert!(pairs.contains(&("per_page", "50".to_string())));
    }

    #[tokio::test]
    async fn test_fetch_all_stops_on_short_page() {
        let api = FixedPages::new(250, vec![100, 100, 50]);
        let (items, total) = fetch_all(&api, "is:pr", 100).await.unwrap();

        assert_eq!(total, 250);
        assert_eq!(items.len(), 250);
        assert_eq!(api.pages_requested(), vec![1, 2, 3]);
        assert_eq!(items.first().map(|i| i.number), Some(1));
        assert_eq!(items.last().map(|i| i.number), Some(250));
    }

    #[tokio::test]
    async fn test_fetch_all_never_exceeds_ten_pages() {
        let api = FixedPages::new(5000, vec![100; 20]);
        let (items, total) = fetch_all(&api, "is:pr", 100).await.unwrap();

        assert_eq!(total, 5000);
        assert_eq!(items.len(), 1000);
        assert_eq!(api.pages_requested(), (1..=10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_fetch_all_stops_on_empty_first_page() {
        let api = FixedPages::new(0, vec![]);
        let (items, total) = fetch_all(&api, "is:issue", 100).await.unwrap();

        assert!(items.is_empty());
        assert_eq!(total, 0);
        assert_eq!(api.pages_requested(), vec![1]);
    }

    #[tokio::test]
    async fn test_fetch_all_full_last_page_needs_one_more_request() {
        let api = FixedPages::new(100, vec![100]);
        let (items, total) = fetch_all(&api, "is:pr", 100).await.unwrap();

        assert_eq!(total, 100);
        assert_eq!(items.len(), 100);
        assert_eq!(api.pages_requested(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_fetch_all_propagates_errors() {
        let err = fetch_all(&Failing, "is:pr", 100).await.unwrap_err();
        assert!(matches!(err, CollectError::TransientApi { status: 500, .. }));
    }
}
