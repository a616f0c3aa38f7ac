//! Error types for collection, storage and scoring.

use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

/// Failures raised while talking to the search endpoint or splitting
/// windows.
///
/// None of these are retried. [`CollectError::is_fatal`] tells the
/// orchestrator whether the whole collection must stop or only the
/// current run.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("GitHub API authentication failed: {0}")]
    Authentication(String),

    #[error("GitHub rate limit exceeded. Try again after {reset} ({remaining}/{limit} remaining)", reset = .reset_at.format("%Y-%m-%dT%H:%M:%SZ"))]
    RateLimited {
        reset_at: DateTime<Utc>,
        remaining: String,
        limit: String,
    },

    #[error("GitHub API error {status}: {body}")]
    TransientApi { status: u16, body: String },

    #[error(
        "Search window {day} returned {total_count} results (>= {cap}). Cannot fetch beyond {cap} via search API; reduce scope or change strategy",
        cap = crate::search::SEARCH_RESULT_CAP
    )]
    WindowUnsplittable { day: NaiveDate, total_count: u64 },

    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Failed to decode search response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid search URL: {0}")]
    Url(#[from] url::ParseError),
}

impl CollectError {
    /// Authentication and quota failures affect every run sharing the
    /// credential, so they abort the whole collection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CollectError::Authentication(_) | CollectError::RateLimited { .. }
        )
    }
}

/// Failures reading or writing the on-disk record tables.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Failures raised by the aggregation engine.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("No input data found. Run the fetch stage first")]
    NoInputData,

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let rate_limited = CollectError::RateLimited {
            reset_at: Utc::now(),
            remaining: "0".to_string(),
            limit: "60".to_string(),
        };
        assert!(rate_limited.is_fatal());
        assert!(CollectError::Authentication("bad token".to_string()).is_fatal());

        let transient = CollectError::TransientApi {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(!transient.is_fatal());

        let unsplittable = CollectError::WindowUnsplittable {
            day: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            total_count: 1200,
        };
        assert!(!unsplittable.is_fatal());
    }

    #[test]
    fn test_unsplittable_message_names_day_and_count() {
        let err = CollectError::WindowUnsplittable {
            day: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
            total_count: 1432,
        };
        let message = err.to_string();
        assert!(message.contains("2024-03-05"));
        assert!(message.contains("1432"));
        assert!(message.contains("1000"));
    }
}
