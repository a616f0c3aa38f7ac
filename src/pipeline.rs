//! The fetch and score stages, wired together the way the binary runs them.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::{info, warn};

use crate::{
    collect::{CollectionReport, CollectionSpec, collect_all},
    error::ScoreError,
    score::{EngineerScore, ScoreInputs, compute_scores, write_scores},
    search::SearchApi,
    sink::RecordSink,
};

/// Collects all five record kinds and writes every completed table.
///
/// Tables from completed runs are written even when another run failed.
/// The table of every failed run is removed, so an older copy cannot be
/// scored alongside fresh data, and the stage then reports failure.
/// Authentication and rate-limit errors abort before anything is written
/// and keep their [`crate::CollectError`] type inside the returned error.
pub async fn fetch_stage<S, K>(
    api: &S,
    spec: &CollectionSpec,
    sink: &mut K,
) -> anyhow::Result<CollectionReport>
where
    S: SearchApi + Sync + ?Sized,
    K: RecordSink + ?Sized,
{
    info!(
        repo = %spec.repo,
        since = %spec.since.format("%Y-%m-%d"),
        until = %spec.until.format("%Y-%m-%d"),
        "Fetching activity"
    );

    let report = collect_all(api, spec).await?;

    for records in report.completed() {
        sink.write(records)
            .with_context(|| format!("Failed to store {}", records.kind()))?;
    }

    let mut failures = Vec::new();
    for (kind, err) in report.failures() {
        sink.invalidate(kind)
            .with_context(|| format!("Failed to discard stale {kind} table"))?;
        failures.push(format!("{kind}: {err}"));
    }
    if !failures.is_empty() {
        anyhow::bail!(
            "{} of {} collection runs failed:\n  {}",
            failures.len(),
            report.runs.len(),
            failures.join("\n  ")
        );
    }

    Ok(report)
}

/// Outcome of the score stage.
#[derive(Debug)]
pub struct ScoreSummary {
    pub path: PathBuf,
    pub scores: Vec<EngineerScore>,
}

/// Reads the record tables from `data_dir`, ranks every engineer and
/// writes the scores table next to them.
pub fn score_stage(data_dir: &Path) -> Result<ScoreSummary, ScoreError> {
    let inputs = ScoreInputs::load(data_dir)?;
    let scores = compute_scores(&inputs)?;
    if scores.is_empty() {
        warn!("Every record lacked an actor; scores table is empty");
    }
    let path = write_scores(data_dir, &scores)?;
    Ok(ScoreSummary { path, scores })
}
