//! Per-engineer impact scoring over the collected record tables.
//!
//! Each signal is counted per actor, divided by the largest value of that
//! signal across all actors (0 when the largest is 0), and combined with the
//! fixed weights in [`Signal::weight`].

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{ScoreError, StoreError},
    sink::{read_table, write_table},
    types::{
        ActivityRow, IssueClosedRow, IssueOpenedRow, PrClosedRow, PrMergedRow, PrOpenedRow,
        RecordKind,
    },
};

pub const SCORES_FILE: &str = "engineer_scores.csv";

const SCORE_COLUMNS: &[&str] = &[
    "engineer",
    "prs_opened",
    "prs_closed",
    "pr_comments",
    "prs_merged",
    "issues_opened",
    "issues_closed",
    "prs_merged_norm",
    "prs_closed_norm",
    "issues_closed_norm",
    "prs_opened_norm",
    "issues_opened_norm",
    "pr_comments_norm",
    "impact_score",
    "rank",
];

/// The weighted signals, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    PrsMerged,
    PrsClosed,
    IssuesClosed,
    PrsOpened,
    IssuesOpened,
    PrComments,
}

impl Signal {
    pub const ALL: [Signal; 6] = [
        Signal::PrsMerged,
        Signal::PrsClosed,
        Signal::IssuesClosed,
        Signal::PrsOpened,
        Signal::IssuesOpened,
        Signal::PrComments,
    ];

    pub fn weight(&self) -> f64 {
        match self {
            Signal::PrsMerged => 0.45,
            Signal::PrsClosed => 0.15,
            Signal::IssuesClosed => 0.15,
            Signal::PrsOpened => 0.10,
            Signal::IssuesOpened => 0.10,
            Signal::PrComments => 0.05,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Signal::PrsMerged => "PRs merged",
            Signal::PrsClosed => "PRs closed",
            Signal::IssuesClosed => "Issues closed (by opener)",
            Signal::PrsOpened => "PRs opened",
            Signal::IssuesOpened => "Issues opened",
            Signal::PrComments => "PR conversation comments",
        }
    }

    fn count(&self, counts: &ActorCounts) -> u64 {
        match self {
            Signal::PrsMerged => counts.prs_merged,
            Signal::PrsClosed => counts.prs_closed,
            Signal::IssuesClosed => counts.issues_closed,
            Signal::PrsOpened => counts.prs_opened,
            Signal::IssuesOpened => counts.issues_opened,
            Signal::PrComments => counts.pr_comments,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActorCounts {
    pub prs_opened: u64,
    pub prs_closed: u64,
    pub pr_comments: u64,
    pub prs_merged: u64,
    pub issues_opened: u64,
    pub issues_closed: u64,
}

/// The five record tables as read back for scoring.
#[derive(Debug, Default)]
pub struct ScoreInputs {
    pub prs_opened: Vec<PrOpenedRow>,
    pub prs_closed: Vec<PrClosedRow>,
    pub prs_merged: Vec<PrMergedRow>,
    pub issues_opened: Vec<IssueOpenedRow>,
    pub issues_closed: Vec<IssueClosedRow>,
}

impl ScoreInputs {
    /// Reads the tables from `dir`. Missing files count as empty tables.
    pub fn load(dir: &Path) -> Result<Self, StoreError> {
        let path = |kind: RecordKind| dir.join(kind.file_name());
        Ok(Self {
            prs_opened: read_table(&path(RecordKind::PrsOpened))?,
            prs_closed: read_table(&path(RecordKind::PrsClosed))?,
            prs_merged: read_table(&path(RecordKind::PrsMerged))?,
            issues_opened: read_table(&path(RecordKind::IssuesOpened))?,
            issues_closed: read_table(&path(RecordKind::IssuesClosed))?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.prs_opened.is_empty()
            && self.prs_closed.is_empty()
            && self.prs_merged.is_empty()
            && self.issues_opened.is_empty()
            && self.issues_closed.is_empty()
    }
}

/// One row of the ranked output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineerScore {
    pub engineer: String,
    pub prs_opened: u64,
    pub prs_closed: u64,
    pub pr_comments: u64,
    pub prs_merged: u64,
    pub issues_opened: u64,
    pub issues_closed: u64,
    pub prs_merged_norm: f64,
    pub prs_closed_norm: f64,
    pub issues_closed_norm: f64,
    pub prs_opened_norm: f64,
    pub issues_opened_norm: f64,
    pub pr_comments_norm: f64,
    pub impact_score: f64,
    pub rank: usize,
}

fn tally<R, F>(counts: &mut BTreeMap<String, ActorCounts>, rows: &[R], mut bump: F)
where
    R: ActivityRow,
    F: FnMut(&mut ActorCounts, &R),
{
    // Rows without an actor cannot be attributed to anyone.
    for row in rows {
        if let Some(actor) = row.actor() {
            bump(counts.entry(actor.to_string()).or_default(), row);
        }
    }
}

/// Counts every signal per actor.
///
/// Closed issues are attributed to their opener because the search
/// endpoint does not expose who closed them.
pub fn count_by_actor(inputs: &ScoreInputs) -> BTreeMap<String, ActorCounts> {
    let mut counts = BTreeMap::new();
    tally(&mut counts, &inputs.prs_opened, |c, _| c.prs_opened += 1);
    tally(&mut counts, &inputs.prs_closed, |c, row| {
        c.prs_closed += 1;
        c.pr_comments += row.comments().unwrap_or(0);
    });
    tally(&mut counts, &inputs.prs_merged, |c, _| c.prs_merged += 1);
    tally(&mut counts, &inputs.issues_opened, |c, _| c.issues_opened += 1);
    tally(&mut counts, &inputs.issues_closed, |c, _| c.issues_closed += 1);
    counts
}

fn normalize(value: u64, max: u64) -> f64 {
    if max > 0 {
        value as f64 / max as f64
    } else {
        0.0
    }
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Scores and ranks every actor found in `inputs`.
///
/// Fails with [`ScoreError::NoInputData`] when all five tables are empty so
/// that a missing fetch never produces a plausible all-zero table.
pub fn compute_scores(inputs: &ScoreInputs) -> Result<Vec<EngineerScore>, ScoreError> {
    if inputs.is_empty() {
        return Err(ScoreError::NoInputData);
    }

    let counts = count_by_actor(inputs);
    let max_of = |signal: Signal| counts.values().map(|c| signal.count(c)).max().unwrap_or(0);
    let maxima: Vec<(Signal, u64)> = Signal::ALL.iter().map(|s| (*s, max_of(*s))).collect();

    let mut scores: Vec<EngineerScore> = counts
        .iter()
        .map(|(engineer, c)| {
            let norm = |signal: Signal| {
                let max = maxima
                    .iter()
                    .find(|(s, _)| *s == signal)
                    .map_or(0, |(_, m)| *m);
                normalize(signal.count(c), max)
            };
            let impact: f64 = Signal::ALL.iter().map(|s| s.weight() * norm(*s)).sum();

            EngineerScore {
                engineer: engineer.clone(),
                prs_opened: c.prs_opened,
                prs_closed: c.prs_closed,
                pr_comments: c.pr_comments,
                prs_merged: c.prs_merged,
                issues_opened: c.issues_opened,
                issues_closed: c.issues_closed,
                prs_merged_norm: norm(Signal::PrsMerged),
                prs_closed_norm: norm(Signal::PrsClosed),
                issues_closed_norm: norm(Signal::IssuesClosed),
                prs_opened_norm: norm(Signal::PrsOpened),
                issues_opened_norm: norm(Signal::IssuesOpened),
                pr_comments_norm: norm(Signal::PrComments),
                impact_score: round4(impact),
                rank: 0,
            }
        })
        .collect();

    // Stable sort keeps ties in engineer name order.
    scores.sort_by(|a, b| b.impact_score.total_cmp(&a.impact_score));
    for (i, score) in scores.iter_mut().enumerate() {
        score.rank = i + 1;
    }

    Ok(scores)
}

pub fn write_scores(dir: &Path, scores: &[EngineerScore]) -> Result<PathBuf, StoreError> {
    let path = dir.join(SCORES_FILE);
    write_table(&path, SCORE_COLUMNS, scores)?;
    info!(path = %path.display(), engineers = scores.len(), "Wrote scores");
    Ok(path)
}

pub fn read_scores(path: &Path) -> Result<Vec<EngineerScore>, StoreError> {
    read_table(path)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::*;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn opened(n: u64, author: Option<&str>) -> PrOpenedRow {
        PrOpenedRow {
            pr_number: n,
            author: author.map(str::to_string),
            created_at: ts(),
            comments: Some(0),
        }
    }

    fn closed(n: u64, author: &str, comments: Option<u64>) -> PrClosedRow {
        PrClosedRow {
            pr_number: n,
            author: Some(author.to_string()),
            created_at: ts(),
            closed_at: Some(ts()),
            comments,
        }
    }

    fn issue_closed(n: u64, opener: Option<&str>) -> IssueClosedRow {
        IssueClosedRow {
            issue_number: n,
            opened_by: opener.map(str::to_string),
            created_at: ts(),
            closed_at: Some(ts()),
            comments: None,
        }
    }

    fn by_name<'a>(scores: &'a [EngineerScore], name: &str) -> &'a EngineerScore {
        scores.iter().find(|s| s.engineer == name).unwrap()
    }

    #[test]
    fn test_weights_sum_to_one() {
        let total: f64 = Signal::ALL.iter().map(Signal::weight).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_input_fails_loudly() {
        let err = compute_scores(&ScoreInputs::default()).unwrap_err();
        assert!(matches!(err, ScoreError::NoInputData));
        assert!(err.to_string().contains("No input data found"));
    }

    #[test]
    fn test_counts_skip_missing_actor_and_sum_comments() {
        let inputs = ScoreInputs {
            prs_opened: vec![opened(1, Some("alice")), opened(2, None), opened(3, Some(""))],
            prs_closed: vec![closed(1, "alice", Some(4)), closed(4, "alice", None)],
            issues_closed: vec![issue_closed(10, Some("bob")), issue_closed(11, None)],
            ..Default::default()
        };

        let counts = count_by_actor(&inputs);
        assert_eq!(counts.len(), 2);
        assert_eq!(counts["alice"].prs_opened, 1);
        assert_eq!(counts["alice"].prs_closed, 2);
        assert_eq!(counts["alice"].pr_comments, 4);
        assert_eq!(counts["bob"].issues_closed, 1);
    }

    #[test]
    fn test_zero_max_signal_normalizes_to_zero() {
        let inputs = ScoreInputs {
            prs_opened: vec![opened(1, Some("alice")), opened(2, Some("alice")), opened(3, Some("bob"))],
            issues_closed: vec![issue_closed(10, Some("bob"))],
            ..Default::default()
        };

        let scores = compute_scores(&inputs).unwrap();
        for score in &scores {
            assert_eq!(score.prs_merged_norm, 0.0);
            assert_eq!(score.prs_closed_norm, 0.0);
            assert!(score.impact_score.is_finite());
        }

        let alice = by_name(&scores, "alice");
        assert_eq!(alice.prs_opened_norm, 1.0);
        assert_eq!(alice.impact_score, 0.1);

        let bob = by_name(&scores, "bob");
        assert_eq!(bob.prs_opened_norm, 0.5);
        assert_eq!(bob.issues_closed_norm, 1.0);
        assert_eq!(bob.impact_score, 0.2);

        assert_eq!(scores[0].engineer, "bob");
        assert_eq!(scores[0].rank, 1);
        assert_eq!(scores[1].rank, 2);
    }

    #[test]
    fn test_weighted_score_and_rounding() {
        let inputs = ScoreInputs {
            prs_merged: vec![
                PrMergedRow {
                    pr_number: 1,
                    author: Some("carol".to_string()),
                    created_at: ts(),
                    merged_at: Some(ts()),
                    comments: Some(1),
                },
                PrMergedRow {
                    pr_number: 2,
                    author: Some("carol".to_string()),
                    created_at: ts(),
                    merged_at: Some(ts()),
                    comments: Some(1),
                },
                PrMergedRow {
                    pr_number: 3,
                    author: Some("dave".to_string()),
                    created_at: ts(),
                    merged_at: Some(ts()),
                    comments: Some(1),
                },
            ],
            prs_closed: vec![closed(5, "dave", Some(3))],
            ..Default::default()
        };

        let scores = compute_scores(&inputs).unwrap();
        let carol = by_name(&scores, "carol");
        let dave = by_name(&scores, "dave");

        assert_eq!(carol.impact_score, 0.45);
        // 0.45 * 0.5 + 0.15 * 1 + 0.05 * 1
        assert_eq!(dave.impact_score, 0.425);
        assert_eq!(carol.rank, 1);
        assert_eq!(dave.rank, 2);
    }

    #[test]
    fn test_ties_rank_by_name() {
        let inputs = ScoreInputs {
            prs_opened: vec![opened(1, Some("zed")), opened(2, Some("amy"))],
            ..Default::default()
        };
        let scores = compute_scores(&inputs).unwrap();
        let names: Vec<&str> = scores.iter().map(|s| s.engineer.as_str()).collect();
        assert_eq!(names, vec!["amy", "zed"]);
        let ranks: Vec<usize> = scores.iter().map(|s| s.rank).collect();
        assert_eq!(ranks, vec![1, 2]);
    }

    #[test]
    fn test_only_actorless_rows_yield_empty_table() {
        let inputs = ScoreInputs {
            issues_closed: vec![issue_closed(1, None)],
            ..Default::default()
        };
        assert!(compute_scores(&inputs).unwrap().is_empty());
    }

    #[test]
    fn test_scores_table_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = ScoreInputs {
            prs_opened: vec![opened(1, Some("alice"))],
            ..Default::default()
        };
        let scores = compute_scores(&inputs).unwrap();

        let path = write_scores(dir.path(), &scores).unwrap();
        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("engineer,prs_opened,prs_closed,pr_comments,prs_merged"));
        assert_eq!(read_scores(&path).unwrap(), scores);
    }

    #[test]
    fn test_load_treats_missing_tables_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = ScoreInputs::load(dir.path()).unwrap();
        assert!(inputs.is_empty());
    }
}
