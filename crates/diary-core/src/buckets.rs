//! Day bucketing for dashboard timelines
//!
//! Timestamps are bucketed by UTC calendar day and keyed as `YYYY-MM-DD`, so
//! lexicographic order on keys is chronological order.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Day key (`YYYY-MM-DD`, UTC) for a unix timestamp in seconds
pub fn day_key(timestamp: u64) -> Result<String, CoreError> {
    let secs = i64::try_from(timestamp).map_err(|_| CoreError::InvalidTimestamp(timestamp))?;
    let datetime =
        DateTime::from_timestamp(secs, 0).ok_or(CoreError::InvalidTimestamp(timestamp))?;
    Ok(datetime.format("%Y-%m-%d").to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateBucket {
    pub date: String,
    pub count: u64,
}

/// Sorted day -> count accumulator
#[derive(Debug, Clone, Default)]
pub struct DateHistogram {
    counts: BTreeMap<String, u64>,
}

impl DateHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one event on the day of `timestamp`
    pub fn record(&mut self, timestamp: u64) -> Result<(), CoreError> {
        let key = day_key(timestamp)?;
        *self.counts.entry(key).or_insert(0) += 1;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// All buckets, ascending by date
    pub fn into_buckets(self) -> Vec<DateBucket> {
        self.counts
            .into_iter()
            .map(|(date, count)| DateBucket { date, count })
            .collect()
    }

    /// The `n` most recent buckets, ascending by date
    pub fn latest(self, n: usize) -> Vec<DateBucket> {
        let mut buckets = self.into_buckets();
        let skip = buckets.len().saturating_sub(n);
        buckets.drain(..skip);
        buckets
    }

    /// The `n` earliest buckets, ascending by date
    pub fn earliest(self, n: usize) -> Vec<DateBucket> {
        let mut buckets = self.into_buckets();
        buckets.truncate(n);
        buckets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: u64 = 86_400;
    // 2024-01-01T00:00:00Z
    const JAN_1: u64 = 1_704_067_200;

    #[test]
    fn test_day_key() {
        assert_eq!(day_key(JAN_1).unwrap(), "2024-01-01");
        assert_eq!(day_key(JAN_1 + DAY - 1).unwrap(), "2024-01-01");
        assert_eq!(day_key(JAN_1 + DAY).unwrap(), "2024-01-02");
        assert_eq!(day_key(0).unwrap(), "1970-01-01");
    }

    #[test]
    fn test_day_key_out_of_range() {
        assert!(matches!(
            day_key(u64::MAX),
            Err(CoreError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_histogram_sorted_and_counted() {
        let mut hist = DateHistogram::new();
        for ts in [JAN_1 + 2 * DAY, JAN_1, JAN_1 + 10, JAN_1 + DAY] {
            hist.record(ts).unwrap();
        }

        let buckets = hist.into_buckets();
        let dates: Vec<_> = buckets.iter().map(|b| b.date.as_str()).collect();
        assert_eq!(dates, ["2024-01-01", "2024-01-02", "2024-01-03"]);
        assert_eq!(buckets[0].count, 2);
    }

    #[test]
    fn test_latest_and_earliest() {
        let mut a = DateHistogram::new();
        for d in 0..20 {
            a.record(JAN_1 + d * DAY).unwrap();
        }
        let b = a.clone();

        let latest = a.latest(14);
        assert_eq!(latest.len(), 14);
        assert_eq!(latest.first().unwrap().date, "2024-01-07");
        assert_eq!(latest.last().unwrap().date, "2024-01-20");

        let earliest = b.earliest(14);
        assert_eq!(earliest.len(), 14);
        assert_eq!(earliest.first().unwrap().date, "2024-01-01");
        assert_eq!(earliest.last().unwrap().date, "2024-01-14");
    }

    #[test]
    fn test_truncation_with_fewer_buckets() {
        let mut hist = DateHistogram::new();
        hist.record(JAN_1).unwrap();
        assert_eq!(hist.clone().latest(14).len(), 1);
        assert_eq!(hist.earliest(14).len(), 1);
    }
}
