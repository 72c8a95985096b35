//! Latency and response-time recording on HDR histograms.
//!
//! Two logical recorders exist per engine (latency and response time), plus
//! a lazily populated per-path response-time map. Each [`Recorder`] tracks
//! values from 1 microsecond to 60 seconds with 3 significant digits and
//! keeps two windows: the run total and the current interval, so periodic
//! snapshot consumers see only the samples recorded since the last tick.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use hdrhistogram::Histogram;

/// Histogram range: 1 microsecond to 60 seconds.
const LOWEST_MICROS: u64 = 1;
const HIGHEST_MICROS: u64 = 60_000_000;
const SIGNIFICANT_DIGITS: u8 = 3;

fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(LOWEST_MICROS, HIGHEST_MICROS, SIGNIFICANT_DIGITS)
        .expect("histogram bounds are static")
}

/// Summary of recorded values, all in microseconds.
#[derive(Debug, Clone)]
pub struct Summary {
    pub count: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
    pub stddev: f64,
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub p99_9: u64,
}

impl Summary {
    /// Build a summary from a histogram. Returns `None` when empty.
    pub fn from_histogram(histogram: &Histogram<u64>) -> Option<Self> {
        if histogram.is_empty() {
            return None;
        }

        Some(Self {
            count: histogram.len(),
            min: histogram.min(),
            max: histogram.max(),
            mean: histogram.mean(),
            stddev: histogram.stdev(),
            p50: histogram.value_at_quantile(0.50),
            p90: histogram.value_at_quantile(0.90),
            p99: histogram.value_at_quantile(0.99),
            p99_9: histogram.value_at_quantile(0.999),
        })
    }

    /// Format as a human-readable string, values in milliseconds.
    pub fn format(&self) -> String {
        format!(
            "count={}, min={:.2}ms, max={:.2}ms, mean={:.2}ms, stddev={:.2}ms, p50={:.2}ms, p90={:.2}ms, p99={:.2}ms, p99.9={:.2}ms",
            self.count,
            self.min as f64 / 1000.0,
            self.max as f64 / 1000.0,
            self.mean / 1000.0,
            self.stddev / 1000.0,
            self.p50 as f64 / 1000.0,
            self.p90 as f64 / 1000.0,
            self.p99 as f64 / 1000.0,
            self.p99_9 as f64 / 1000.0,
        )
    }
}

/// Thread-safe recorder over an HDR histogram pair.
///
/// `total` accumulates for the whole run; `interval` holds only the samples
/// since the last [`interval_snapshot`](Recorder::interval_snapshot).
/// Values are recorded in nanoseconds and stored in microseconds.
pub struct Recorder {
    total: Mutex<Histogram<u64>>,
    interval: Mutex<Histogram<u64>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self {
            total: Mutex::new(new_histogram()),
            interval: Mutex::new(new_histogram()),
        }
    }

    /// Record one sample. Values are clamped to the histogram range.
    pub fn record_nanos(&self, nanos: u64) {
        let micros = (nanos / 1_000).clamp(LOWEST_MICROS, HIGHEST_MICROS);
        self.total.lock().unwrap().saturating_record(micros);
        self.interval.lock().unwrap().saturating_record(micros);
    }

    /// Take the interval histogram and reset the window.
    ///
    /// The clone and clear happen under one lock, so no sample is lost or
    /// double-reported across consecutive snapshots.
    pub fn interval_snapshot(&self) -> Histogram<u64> {
        let mut interval = self.interval.lock().unwrap();
        let snapshot = interval.clone();
        interval.clear();
        snapshot
    }

    /// Summary over the whole run so far. `None` when nothing was recorded.
    pub fn summary(&self) -> Option<Summary> {
        Summary::from_histogram(&self.total.lock().unwrap())
    }

    /// Number of samples recorded over the whole run.
    pub fn count(&self) -> u64 {
        self.total.lock().unwrap().len()
    }

    /// Clear both windows.
    pub fn reset(&self) {
        self.total.lock().unwrap().clear();
        self.interval.lock().unwrap().clear();
    }
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-path response-time recorders, keyed lazily on first observation.
///
/// Keys are never removed during a run. Insertion is check-then-put with
/// last-write-wins; recording happens outside the map lock.
pub struct PathRecorders {
    map: Mutex<HashMap<String, Arc<Recorder>>>,
}

impl PathRecorders {
    pub fn new() -> Self {
        Self {
            map: Mutex::new(HashMap::new()),
        }
    }

    /// Get or create the recorder for a path.
    pub fn recorder(&self, path: &str) -> Arc<Recorder> {
        let mut map = self.map.lock().unwrap();
        if let Some(recorder) = map.get(path) {
            return recorder.clone();
        }
        let recorder = Arc::new(Recorder::new());
        map.insert(path.to_string(), recorder.clone());
        recorder
    }

    pub fn record_nanos(&self, path: &str, nanos: u64) {
        let recorder = self.recorder(path);
        recorder.record_nanos(nanos);
    }

    /// Summaries for every path with at least one sample.
    pub fn summaries(&self) -> Vec<(String, Summary)> {
        let map = self.map.lock().unwrap();
        let mut results: Vec<_> = map
            .iter()
            .filter_map(|(path, recorder)| recorder.summary().map(|s| (path.clone(), s)))
            .collect();
        results.sort_by(|a, b| a.0.cmp(&b.0));
        results
    }

    pub fn len(&self) -> usize {
        self.map.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.lock().unwrap().is_empty()
    }

    /// Drop all paths and their samples.
    pub fn reset(&self) {
        self.map.lock().unwrap().clear();
    }
}

impl Default for PathRecorders {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recorder_summary_basic() {
        let recorder = Recorder::new();

        // 10ms, 20ms, 30ms, 40ms, 50ms
        for i in 1..=5u64 {
            recorder.record_nanos(i * 10_000_000);
        }

        let summary = recorder.summary().expect("should have samples");
        assert_eq!(summary.count, 5);
        assert_eq!(summary.min, 10_000);

        // HDR histogram bucketing rounds values slightly
        let expected_max = 50_000;
        assert!(
            summary.max >= expected_max && summary.max <= expected_max + 100,
            "max should be ~{} but was {}",
            expected_max,
            summary.max
        );
    }

    #[test]
    fn recorder_empty_has_no_summary() {
        let recorder = Recorder::new();
        assert!(recorder.summary().is_none());
        assert_eq!(recorder.count(), 0);
    }

    #[test]
    fn values_below_a_microsecond_clamp_to_one() {
        let recorder = Recorder::new();
        recorder.record_nanos(500);

        let summary = recorder.summary().unwrap();
        assert_eq!(summary.min, 1);
    }

    #[test]
    fn interval_snapshot_resets_window_but_not_total() {
        let recorder = Recorder::new();
        recorder.record_nanos(5_000_000);
        recorder.record_nanos(7_000_000);

        let first = recorder.interval_snapshot();
        assert_eq!(first.len(), 2);

        // Window is now empty, total still holds everything
        let second = recorder.interval_snapshot();
        assert_eq!(second.len(), 0);
        assert_eq!(recorder.count(), 2);

        recorder.record_nanos(9_000_000);
        let third = recorder.interval_snapshot();
        assert_eq!(third.len(), 1);
        assert_eq!(recorder.count(), 3);
    }

    #[test]
    fn recorder_reset_clears_both_windows() {
        let recorder = Recorder::new();
        recorder.record_nanos(1_000_000);
        recorder.reset();

        assert!(recorder.summary().is_none());
        assert_eq!(recorder.interval_snapshot().len(), 0);
    }

    #[test]
    fn path_recorders_are_created_lazily() {
        let paths = PathRecorders::new();
        assert!(paths.is_empty());

        paths.record_nanos("/index", 2_000_000);
        paths.record_nanos("/index", 4_000_000);
        paths.record_nanos("/style.css", 1_000_000);

        assert_eq!(paths.len(), 2);

        let summaries = paths.summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].0, "/index");
        assert_eq!(summaries[0].1.count, 2);
        assert_eq!(summaries[1].0, "/style.css");
        assert_eq!(summaries[1].1.count, 1);
    }

    #[test]
    fn summary_format_contains_percentiles() {
        let recorder = Recorder::new();
        recorder.record_nanos(100_000_000);

        let formatted = recorder.summary().unwrap().format();
        assert!(formatted.contains("count=1"));
        assert!(formatted.contains("p99"));
        assert!(formatted.contains("stddev"));
    }
}
