use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, HeaderMap, RETRY_AFTER};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::CollectError,
    search::{SearchApi, SearchParams},
    types::{RateLimitState, SearchPage, SearchResponse},
};

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("impactscore/", env!("CARGO_PKG_VERSION"));

/// Looks up an optional API token. Without one, requests are sent
/// unauthenticated and get the lower search quota.
pub fn get_github_token(env: impl Fn(&str) -> Option<String>) -> Option<String> {
    ["GITHUB_TOKEN", "GH_TOKEN"]
        .iter()
        .filter_map(|name| env(name))
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
}

/// Client for the issue search endpoint.
///
/// Each call is a single GET; responses are classified but never retried.
#[derive(Debug, Clone)]
pub struct GitHub {
    client: reqwest::Client,
    search_url: Url,
    token: Option<String>,
}

impl GitHub {
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, CollectError> {
        let base = if api_url.ends_with('/') {
            Url::parse(api_url)?
        } else {
            Url::parse(&format!("{api_url}/"))?
        };
        let search_url = base.join("search/issues")?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            search_url,
            token,
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    pub fn search_url(&self) -> &Url {
        &self.search_url
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Reads the `X-RateLimit-*` headers. Missing or malformed values are left
/// unset.
pub fn parse_rate_limit(headers: &HeaderMap) -> RateLimitState {
    let number = |name: &str| header_str(headers, name).and_then(|v| v.trim().parse::<u32>().ok());
    RateLimitState {
        remaining: number("x-ratelimit-remaining"),
        limit: number("x-ratelimit-limit"),
        reset_at: header_str(headers, "x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
    }
}

fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Maps a non-success response onto the error taxonomy.
///
/// A 403 is only a rate limit when the quota is spent or the response
/// carries `Retry-After`. Any other 403 is a permissions problem, even
/// though GitHub attaches `X-RateLimit-Reset` to nearly every response.
pub fn classify_failure(
    status: u16,
    rate_limit: &RateLimitState,
    retry_after: Option<u64>,
    body: String,
) -> CollectError {
    let rate_limited = |reset_at| CollectError::RateLimited {
        reset_at,
        remaining: rate_limit.remaining_display(),
        limit: rate_limit.limit_display(),
    };

    match status {
        401 => CollectError::Authentication("Check GITHUB_TOKEN".to_string()),
        403 | 429 => {
            let quota_spent = status == 429 || rate_limit.is_exhausted();
            if let Some(reset_at) = rate_limit.reset_at.filter(|_| quota_spent) {
                rate_limited(reset_at)
            } else if let Some(secs) = retry_after {
                rate_limited(Utc::now() + chrono::Duration::seconds(secs as i64))
            } else if status == 403 {
                CollectError::Authentication(
                    "access forbidden, check token scopes".to_string(),
                )
            } else {
                CollectError::TransientApi { status, body }
            }
        }
        _ => CollectError::TransientApi { status, body },
    }
}

#[async_trait]
impl SearchApi for GitHub {
    async fn execute(&self, params: &SearchParams) -> Result<SearchPage, CollectError> {
        let mut request = self
            .client
            .get(self.search_url.clone())
            .query(&params.to_pairs())
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION);

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let rate_limit = parse_rate_limit(response.headers());
        let retry_after = parse_retry_after(response.headers());

        debug!(
            status = status.as_u16(),
            page = params.page,
            rate_remaining = %rate_limit.remaining_display(),
            rate_limit = %rate_limit.limit_display(),
            "GitHub search call"
        );

        let body = response.text().await?;

        if !status.is_success() {
            warn!(
                status = status.as_u16(),
                rate_remaining = %rate_limit.remaining_display(),
                rate_limit = %rate_limit.limit_display(),
                body = %body,
                "GitHub search returned error"
            );
            return Err(classify_failure(
                status.as_u16(),
                &rate_limit,
                retry_after,
                body,
            ));
        }

        let parsed: SearchResponse = serde_json::from_str(&body)?;
        if parsed.incomplete_results {
            warn!(query = %params.query, "GitHub reported incomplete search results");
        }

        Ok(SearchPage {
            has_more: parsed.items.len() >= params.per_page as usize,
            items: parsed.items,
            total_count: parsed.total_count,
            rate_limit,
        })
    }
}
