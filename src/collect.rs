//! Drives one windowed search per record kind and normalizes the results.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::{
    error::CollectError,
    search::{SearchApi, SearchQueryBuilder},
    types::{CollectionRequest, RecordKind, RecordSet, Repo},
    window::{self, WindowPolicy},
};

/// Parameters shared by all five collection runs.
#[derive(Debug, Clone)]
pub struct CollectionSpec {
    pub repo: Repo,
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
    pub per_page: u32,
    pub policy: WindowPolicy,
}

impl CollectionSpec {
    pub fn base_query(&self, kind: RecordKind) -> String {
        SearchQueryBuilder::new()
            .repo(&self.repo)
            .terms(kind.type_terms())
            .build()
    }

    pub fn request(&self, kind: RecordKind) -> CollectionRequest {
        CollectionRequest {
            base_query: self.base_query(kind),
            qualifier: kind.qualifier(),
            since: self.since,
            until: self.until,
            page_size: self.per_page,
        }
    }
}

/// Result of one run. A failed run carries the error that stopped it.
#[derive(Debug)]
pub struct RunOutcome {
    pub kind: RecordKind,
    pub result: Result<RecordSet, CollectError>,
}

#[derive(Debug, Default)]
pub struct CollectionReport {
    pub runs: Vec<RunOutcome>,
}

impl CollectionReport {
    pub fn completed(&self) -> impl Iterator<Item = &RecordSet> {
        self.runs.iter().filter_map(|run| run.result.as_ref().ok())
    }

    pub fn failures(&self) -> impl Iterator<Item = (RecordKind, &CollectError)> {
        self.runs
            .iter()
            .filter_map(|run| run.result.as_ref().err().map(|err| (run.kind, err)))
    }

    pub fn is_complete(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Runs the five collections in order, one request at a time.
///
/// A failure confined to one run is recorded in the report and the
/// remaining runs proceed. Authentication and rate-limit failures stop
/// everything and are returned directly.
pub async fn collect_all<S>(api: &S, spec: &CollectionSpec) -> Result<CollectionReport, CollectError>
where
    S: SearchApi + Sync + ?Sized,
{
    let mut report = CollectionReport::default();

    for kind in RecordKind::ALL {
        let request = spec.request(kind);
        info!(kind = %kind, query = %request.base_query, qualifier = %request.qualifier, "Collecting");

        let result = match window::collect(api, &request, spec.policy).await {
            Ok(windowed) => {
                let records = RecordSet::from_items(kind, &windowed.items);
                info!(
                    kind = %kind,
                    records = records.len(),
                    windows = windowed.windows.len(),
                    halvings = windowed.halvings,
                    "Collection run complete"
                );
                Ok(records)
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                error!(kind = %kind, error = %err, "Collection run incomplete");
                Err(err)
            }
        };

        report.runs.push(RunOutcome { kind, result });
    }

    Ok(report)
}
