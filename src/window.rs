//! Adaptive date-window splitting.
//!
//! A single search query can only reach [`SEARCH_RESULT_CAP`] results, so a
//! long date range is walked as a sequence of short windows. Whenever a
//! window declares a total at or above the cap, the window size is halved
//! and the same start date is tried again, down to a single day.

use chrono::{Days, NaiveDate};
use tracing::{info, warn};

use crate::{
    error::CollectError,
    search::{SEARCH_RESULT_CAP, SearchApi, fetch_all, windowed_query},
    types::{CollectionRequest, QueryWindow, SearchItem},
};

/// Window size every run starts with.
pub const INITIAL_WINDOW_DAYS: u64 = 7;

/// What happens to the window size after a window is accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WindowPolicy {
    /// Once halved, the size stays reduced for the rest of the run.
    #[default]
    KeepShrunk,
    /// Every accepted window restores [`INITIAL_WINDOW_DAYS`].
    ResetAfterAccept,
}

/// Items gathered by one splitter run, with the windows that produced them.
#[derive(Debug, Default)]
pub struct WindowedItems {
    pub items: Vec<SearchItem>,
    pub windows: Vec<QueryWindow>,
    pub halvings: u32,
}

fn window_from(cursor: NaiveDate, days: u64, last_day: NaiveDate) -> QueryWindow {
    let end = cursor
        .checked_add_days(Days::new(days - 1))
        .map_or(last_day, |end| end.min(last_day));
    QueryWindow { start: cursor, end }
}

/// Collects every item matching `request` between its `since` and `until`
/// dates, inclusive.
///
/// Items come back oldest window first and, within a window, in endpoint
/// order. Fails with [`CollectError::WindowUnsplittable`] when a single day
/// already reaches the cap.
pub async fn collect<S>(
    api: &S,
    request: &CollectionRequest,
    policy: WindowPolicy,
) -> Result<WindowedItems, CollectError>
where
    S: SearchApi + Sync + ?Sized,
{
    let mut acc = WindowedItems::default();
    let mut window_days = INITIAL_WINDOW_DAYS;
    let mut cursor = request.since.date_naive();
    let last_day = request.until.date_naive();

    while cursor <= last_day {
        let window = window_from(cursor, window_days, last_day);
        let query = windowed_query(&request.base_query, request.qualifier, &window);
        let (items, total_count) = fetch_all(api, &query, request.page_size).await?;

        if total_count >= SEARCH_RESULT_CAP {
            if window_days == 1 {
                return Err(CollectError::WindowUnsplittable {
                    day: window.start,
                    total_count,
                });
            }
            window_days = (window_days / 2).max(1);
            acc.halvings += 1;
            warn!(
                window = %window,
                qualifier = %request.qualifier,
                total_count,
                window_days,
                "Window at search cap, narrowing"
            );
            continue;
        }

        info!(
            window = %window,
            qualifier = %request.qualifier,
            total_count,
            items = items.len(),
            "Window accepted"
        );
        acc.items.extend(items);
        acc.windows.push(window);

        if policy == WindowPolicy::ResetAfterAccept {
            window_days = INITIAL_WINDOW_DAYS;
        }

        match window.end.succ_opt() {
            Some(next) => cursor = next,
            None => break,
        }
    }

    Ok(acc)
}
