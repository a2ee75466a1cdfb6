// Traffic Meter: cumulative byte counters plus a bounded trailing window of
// per-second buckets, for the `/data` diagnostic command.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::time::now_ms;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    in_bytes: u64,
    out_bytes: u64,
}

struct Inner {
    total_in: u64,
    total_out: u64,
    buckets: BTreeMap<i64, Bucket>,
}

/// A process-global byte counter. Writes are coalesced into per-second
/// buckets; buckets older than `window_seconds` are pruned on every write.
pub struct TrafficMeter {
    window_seconds: u64,
    inner: Mutex<Inner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrafficSummary {
    pub total_in: u64,
    pub total_out: u64,
    pub window_in: Option<u64>,
    pub window_out: Option<u64>,
}

impl TrafficMeter {
    pub fn new(window_seconds: u64) -> Self {
        Self {
            window_seconds,
            inner: Mutex::new(Inner {
                total_in: 0,
                total_out: 0,
                buckets: BTreeMap::new(),
            }),
        }
    }

    /// Record `bytes` transferred in `direction`, attributed to the current second.
    pub fn record(&self, direction: Direction, bytes: usize) {
        let second = now_ms() / 1000;
        let mut inner = self.inner.lock().expect("traffic meter lock poisoned");
        match direction {
            Direction::In => inner.total_in += bytes as u64,
            Direction::Out => inner.total_out += bytes as u64,
        }
        let bucket = inner.buckets.entry(second).or_default();
        match direction {
            Direction::In => bucket.in_bytes += bytes as u64,
            Direction::Out => bucket.out_bytes += bytes as u64,
        }
        let cutoff = second - self.window_seconds as i64;
        inner.buckets.retain(|&key, _| key >= cutoff);
    }

    /// Summarize throughput. With `window_seconds = None`, only cumulative
    /// totals are returned. With `Some(w)`, `w` is clamped to the meter's
    /// configured window before summing matching buckets.
    pub fn summarize(&self, window_seconds: Option<u64>) -> TrafficSummary {
        let second = now_ms() / 1000;
        let inner = self.inner.lock().expect("traffic meter lock poisoned");
        let (window_in, window_out) = match window_seconds {
            None => (None, None),
            Some(w) => {
                let clamped = w.min(self.window_seconds);
                let cutoff = second - clamped as i64;
                let (mut wi, mut wo) = (0u64, 0u64);
                for (_, bucket) in inner.buckets.range(cutoff..) {
                    wi += bucket.in_bytes;
                    wo += bucket.out_bytes;
                }
                (Some(wi), Some(wo))
            }
        };
        TrafficSummary {
            total_in: inner.total_in,
            total_out: inner.total_out,
            window_in,
            window_out,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_with_no_window_returns_totals_only() {
        let meter = TrafficMeter::new(900);
        meter.record(Direction::In, 100);
        meter.record(Direction::Out, 50);
        let summary = meter.summarize(None);
        assert_eq!(summary.total_in, 100);
        assert_eq!(summary.total_out, 50);
        assert_eq!(summary.window_in, None);
        assert_eq!(summary.window_out, None);
    }

    #[test]
    fn window_larger_than_configured_is_capped() {
        let meter = TrafficMeter::new(900);
        meter.record(Direction::In, 10);
        let summary = meter.summarize(Some(10_000));
        assert_eq!(summary.window_in, Some(10));
    }

    #[test]
    fn totals_accumulate_across_many_records() {
        let meter = TrafficMeter::new(900);
        for _ in 0..5 {
            meter.record(Direction::In, 20);
        }
        assert_eq!(meter.summarize(None).total_in, 100);
    }
}
