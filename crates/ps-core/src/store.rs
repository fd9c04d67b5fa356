//! Sorted mapping from a time value to the series active at that time,
//! used for time-varying/multi-frame data sets.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::series::Series;

/// `f64` key with a total order, so times can index a `BTreeMap`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TimeKey(f64);

impl Eq for TimeKey {}

impl PartialOrd for TimeKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Time-indexed series store. No interpolation is performed: a lookup at a
/// time with no exact entry yields nothing.
#[derive(Default)]
pub struct TimeSeriesStore {
    by_time: BTreeMap<TimeKey, Vec<Arc<dyn Series>>>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a series to the list at `time`, creating the entry on first
    /// use.
    pub fn add_series(&mut self, time: f64, series: Arc<dyn Series>) {
        self.by_time.entry(TimeKey(time)).or_default().push(series);
    }

    /// Remove one series (by pointer identity) from the list at `time`.
    /// The time entry disappears entirely when its list empties. Unknown
    /// times and absent series are tolerated; returns whether anything was
    /// removed.
    pub fn remove_series(&mut self, time: f64, series: &Arc<dyn Series>) -> bool {
        let key = TimeKey(time);
        let Some(list) = self.by_time.get_mut(&key) else {
            return false;
        };
        let before = list.len();
        list.retain(|s| !Arc::ptr_eq(s, series));
        let removed = list.len() != before;
        if list.is_empty() {
            self.by_time.remove(&key);
        }
        removed
    }

    /// The series registered at exactly `time`. Empty, never a sentinel,
    /// for unknown times.
    pub fn series_at_time(&self, time: f64) -> Vec<Arc<dyn Series>> {
        self.by_time
            .get(&TimeKey(time))
            .cloned()
            .unwrap_or_default()
    }

    /// All known times in ascending order.
    pub fn times(&self) -> Vec<f64> {
        self.by_time.keys().map(|key| key.0).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_time.is_empty()
    }
}
