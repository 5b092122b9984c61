//! Dashboard statistics over a bounded window of ledger entries
//!
//! Each window reads the two counters plus one metadata record per scanned id,
//! in ascending id order. A per-entry failure is logged and skipped so one bad
//! record cannot blank the dashboard. The result is a best-effort snapshot, not
//! a consistent cut of the ledger.

use diary_core::constants::{STATS_SCAN_LIMIT, TIMELINE_BUCKETS};
use diary_core::{Address, DateBucket, DateHistogram, EntryId, UnlockState};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::Ledger;

/// Range of entry ids to scan: `start .. start + limit`
///
/// `limit` is clamped to `1..=STATS_SCAN_LIMIT` so every window makes
/// progress and stays within the read budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanWindow {
    pub start: EntryId,
    pub limit: u64,
}

impl Default for ScanWindow {
    fn default() -> Self {
        Self {
            start: 0,
            limit: STATS_SCAN_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    /// Ledger-wide total, independent of the scan window
    pub total_entries: u64,
    pub user_entries: u64,
    pub locked_entries: u64,
    pub unlocked_entries: u64,
    pub public_entries: u64,
    pub private_entries: u64,
    pub never_unlock_entries: u64,
    pub entries_by_date: Vec<DateBucket>,
    pub unlock_timeline: Vec<DateBucket>,
    pub scanned_entries: u64,
    pub skipped_entries: u64,
    /// Where the next window starts, if entries remain
    pub next_cursor: Option<EntryId>,
}

/// Statistics over the first window of entries
pub async fn compute_stats<L: Ledger>(
    ledger: &L,
    user: Option<Address>,
    now: u64,
) -> Result<DashboardStats> {
    compute_stats_window(ledger, user, ScanWindow::default(), now).await
}

pub async fn compute_stats_window<L: Ledger>(
    ledger: &L,
    user: Option<Address>,
    window: ScanWindow,
    now: u64,
) -> Result<DashboardStats> {
    let total = ledger.entry_count().await?;
    let user_entries = match user {
        Some(user) => ledger.user_entry_count(user).await?,
        None => 0,
    };

    let limit = window.limit.clamp(1, STATS_SCAN_LIMIT);
    let start = window.start.min(total);
    let end = start.saturating_add(limit).min(total);

    let mut stats = DashboardStats {
        total_entries: total,
        user_entries,
        next_cursor: (end < total).then_some(end),
        ..Default::default()
    };
    let mut by_date = DateHistogram::new();
    let mut timeline = DateHistogram::new();

    for id in start..end {
        let meta = match ledger.entry_metadata(id).await {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(entry_id = id, error = %e, "Skipping entry in stats scan");
                stats.skipped_entries += 1;
                continue;
            }
        };
        stats.scanned_entries += 1;

        if let Err(e) = by_date.record(meta.created_at) {
            tracing::warn!(entry_id = id, error = %e, "Unbucketable creation time");
        }

        match meta.unlock_state(now) {
            UnlockState::NeverUnlock => {
                stats.locked_entries += 1;
                stats.never_unlock_entries += 1;
            }
            UnlockState::Locked => {
                stats.locked_entries += 1;
                if let Err(e) = timeline.record(meta.unlock_timestamp) {
                    tracing::warn!(entry_id = id, error = %e, "Unbucketable unlock time");
                }
            }
            UnlockState::Unlocked => stats.unlocked_entries += 1,
        }

        if meta.is_public {
            stats.public_entries += 1;
        } else {
            stats.private_entries += 1;
        }
    }

    stats.entries_by_date = by_date.latest(TIMELINE_BUCKETS);
    stats.unlock_timeline = timeline.earliest(TIMELINE_BUCKETS);

    tracing::debug!(
        total,
        scanned = stats.scanned_entries,
        skipped = stats.skipped_entries,
        next_cursor = ?stats.next_cursor,
        "Computed dashboard stats"
    );

    Ok(stats)
}
