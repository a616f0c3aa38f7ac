//! impactscore: GitHub activity collection and engineer impact scoring.
//!
//! Collects pull request and issue activity for one repository through the
//! issue search endpoint, walking the date range in adaptively sized
//! windows so that no window hits the endpoint's result cap. The collected
//! tables feed a weighted per-engineer impact score.

pub mod cli;
pub mod collect;
pub mod error;
pub mod github;
pub mod pipeline;
pub mod score;
pub mod search;
pub mod sink;
pub mod types;
pub mod window;

pub use cli::{Command, FetchConfig, Invocation, ShowConfig, parse_args};
pub use collect::{CollectionReport, CollectionSpec, RunOutcome, collect_all};
pub use error::{CollectError, ScoreError, StoreError};
pub use github::GitHub;
pub use pipeline::{ScoreSummary, fetch_stage, score_stage};
pub use score::{EngineerScore, SCORES_FILE, Signal, compute_scores, read_scores};
pub use search::{SearchApi, SearchParams, SearchQueryBuilder};
pub use sink::{CsvSink, RecordSink};
pub use types::{
    ActivityRow, CollectionRequest, IssueClosedRow, IssueOpenedRow, PrClosedRow, PrMergedRow,
    PrOpenedRow, QueryWindow, RateLimitState, RecordKind, RecordSet, Repo, RepoError, SearchItem,
    SearchPage, TimeQualifier,
};
pub use window::WindowPolicy;
