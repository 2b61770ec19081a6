//! Recent and baseline transaction windows

use chrono::{DateTime, Duration, Utc};

use crate::error::AppResult;
use crate::models::{TransactionFact, TransactionFilter};
use crate::store::TransactionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Recent window `[now - recent, now)` and the baseline that precedes it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Windows {
    pub recent: TimeRange,
    pub baseline: TimeRange,
}

impl Windows {
    pub fn resolve(now: DateTime<Utc>, recent_minutes: u32, baseline_hours: u32) -> Self {
        let recent_start = now - Duration::minutes(i64::from(recent_minutes));
        let baseline_start = now - Duration::hours(i64::from(baseline_hours));

        Self {
            recent: TimeRange { start: recent_start, end: now },
            baseline: TimeRange {
                start: baseline_start.min(recent_start),
                end: recent_start,
            },
        }
    }

    /// Recent window `[now - minutes, now)` and an equally long baseline right before it
    pub fn trailing(now: DateTime<Utc>, minutes: u32) -> Self {
        let length = Duration::minutes(i64::from(minutes));
        let recent_start = now - length;

        Self {
            recent: TimeRange { start: recent_start, end: now },
            baseline: TimeRange { start: recent_start - length, end: recent_start },
        }
    }
}

pub struct WindowData {
    pub recent: Vec<TransactionFact>,
    pub baseline: Vec<TransactionFact>,
}

pub async fn fetch(
    store: &dyn TransactionStore,
    filter: &TransactionFilter,
    windows: &Windows,
) -> AppResult<WindowData> {
    let recent = store
        .find_in_range(filter, windows.recent.start, windows.recent.end)
        .await?;
    let baseline = store
        .find_in_range(filter, windows.baseline.start, windows.baseline.end)
        .await?;

    tracing::debug!(
        "Fetched {} recent and {} baseline transactions",
        recent.len(),
        baseline.len()
    );

    Ok(WindowData { recent, baseline })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_windows_are_disjoint() {
        let now = Utc::now();
        let w = Windows::resolve(now, 60, 168);
        assert_eq!(w.recent.end, now);
        assert_eq!(w.recent.start, now - Duration::minutes(60));
        assert_eq!(w.baseline.end, w.recent.start);
        assert_eq!(w.baseline.start, now - Duration::hours(168));
    }

    #[test]
    fn test_trailing_baseline_has_same_length() {
        let now = Utc::now();
        let w = Windows::trailing(now, 30);
        assert_eq!(w.recent.start, now - Duration::minutes(30));
        assert_eq!(w.baseline.end, w.recent.start);
        assert_eq!(w.baseline.start, now - Duration::minutes(60));
    }

    #[test]
    fn test_short_baseline_collapses_to_empty() {
        let now = Utc::now();
        let w = Windows::resolve(now, 120, 1);
        assert_eq!(w.baseline.start, w.baseline.end);
    }
}
