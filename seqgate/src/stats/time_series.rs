//! Counter rings: plain request counts per minute.

use super::{RequestCounter, SeriesDescriptor, SERIES_INTERVALS};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Shared rotation bookkeeping for one series.
///
/// Only the index and the minute count are load-bearing for readers; slot
/// contents are relaxed and tolerant of boundary races.
pub(crate) struct Rotation {
    looped: AtomicBool,
    /// Includes the minute currently accumulating; starts at 1.
    total_minutes: AtomicU64,
    current_index: AtomicU64,
}

impl Rotation {
    pub(crate) fn new() -> Self {
        Self {
            looped: AtomicBool::new(false),
            total_minutes: AtomicU64::new(1),
            current_index: AtomicU64::new(0),
        }
    }

    pub(crate) fn index(&self) -> usize {
        self.current_index.load(Ordering::Relaxed) as usize
    }

    pub(crate) fn looped(&self) -> bool {
        self.looped.load(Ordering::Relaxed)
    }

    pub(crate) fn total_minutes(&self) -> u64 {
        self.total_minutes.load(Ordering::Relaxed)
    }

    /// Advances to the next minute slot; returns the new index.
    pub(crate) fn advance(&self) -> usize {
        let new_index = (self.index() + 1) % SERIES_INTERVALS;
        self.current_index.store(new_index as u64, Ordering::Relaxed);
        self.total_minutes.fetch_add(1, Ordering::Relaxed);
        if new_index == 0 {
            self.looped.store(true, Ordering::Relaxed);
        }
        new_index
    }

    pub(crate) fn reset(&self) {
        self.current_index.store(0, Ordering::Relaxed);
        self.total_minutes.store(1, Ordering::Relaxed);
        self.looped.store(false, Ordering::Relaxed);
    }
}

/// One counter array plus its grand total.
pub(crate) struct CounterRing {
    values: Box<[AtomicU64]>,
    total: AtomicU64,
}

impl CounterRing {
    pub(crate) fn new() -> Self {
        let values: Vec<AtomicU64> = (0..SERIES_INTERVALS).map(|_| AtomicU64::new(0)).collect();
        Self {
            values: values.into_boxed_slice(),
            total: AtomicU64::new(0),
        }
    }

    pub(crate) fn bump(&self, index: usize) {
        self.values[index].fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn value(&self, index: usize) -> u64 {
        self.values[index].load(Ordering::Relaxed)
    }

    pub(crate) fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub(crate) fn clear_slot(&self, index: usize) {
        self.values[index].store(0, Ordering::Relaxed);
    }

    pub(crate) fn reset(&self) {
        for value in self.values.iter() {
            value.store(0, Ordering::Relaxed);
        }
        self.total.store(0, Ordering::Relaxed);
    }
}

/// Serializes one counter ring, walking backwards from the minute before
/// `current_index` and aggregating per the descriptor. When `looped`, the
/// wrap segment excludes the current and the following (oldest) minute so
/// half-written slots never reach a client.
pub(crate) fn serialize_counter_ring(
    ring: &CounterRing,
    descriptor: SeriesDescriptor<'_>,
    mut looped: bool,
    current_index: usize,
    total_minutes: u64,
) -> Value {
    let mut out = Map::new();
    if current_index == 0 && !looped {
        // Nothing rotated in yet.
        return Value::Object(out);
    }

    let mut series: Vec<Value> = Vec::new();
    let mut raw_index = if current_index == 0 {
        looped = false; // the single pass below already covers the array
        SERIES_INTERVALS - 1
    } else {
        current_index - 1
    };

    let mut max_per_minute = 0u64;
    let mut total_requests = 0u64;
    let mut total_minutes_walked = 0u64;
    let mut bucket_minutes = 0usize;
    let mut bucket_requests = 0u64;
    let mut output_index = 0usize;
    let mut range_index = 0usize;
    let (mut minutes_per_bucket, mut last_seq_index) =
        descriptor.first().copied().unwrap_or((1, usize::MAX));

    let mut step = |raw_index: usize,
                    series: &mut Vec<Value>,
                    bucket_minutes: &mut usize,
                    bucket_requests: &mut u64| {
        let requests = ring.value(raw_index);
        total_minutes_walked += 1;
        max_per_minute = max_per_minute.max(requests);
        total_requests += requests;
        *bucket_minutes += 1;
        *bucket_requests += requests;
        if *bucket_minutes >= minutes_per_bucket {
            series.push(bucket_rate(*bucket_requests, *bucket_minutes));
            *bucket_minutes = 0;
            *bucket_requests = 0;
        }
        output_index += 1;
        if output_index > last_seq_index {
            range_index += 1;
            match descriptor.get(range_index) {
                Some(&(minutes, last)) => {
                    minutes_per_bucket = minutes;
                    last_seq_index = last;
                }
                None => last_seq_index = usize::MAX,
            }
        }
    };

    loop {
        step(raw_index, &mut series, &mut bucket_minutes, &mut bucket_requests);
        if raw_index == 0 {
            break;
        }
        raw_index -= 1;
    }

    if looped {
        let mut raw_index = SERIES_INTERVALS - 1;
        while raw_index > current_index + 1 {
            step(raw_index, &mut series, &mut bucket_minutes, &mut bucket_requests);
            raw_index -= 1;
        }
    }

    if bucket_minutes > 0 {
        series.push(bucket_rate(bucket_requests, bucket_minutes));
    }

    let grand_total = ring.total();
    let rest_avg = if looped {
        let last_minute_index = (current_index + 1) % SERIES_INTERVALS;
        let rest_requests = grand_total
            .saturating_sub(ring.value(last_minute_index))
            .saturating_sub(ring.value(current_index));
        // Just after the wrap the subtraction would briefly go negative;
        // clamp and report zero until a full window exists again.
        let rest_minutes = total_minutes.saturating_sub(SERIES_INTERVALS as u64 + 2);
        if rest_minutes > 0 {
            rest_requests as f64 / (rest_minutes as f64 * 60.0)
        } else {
            0.0
        }
    } else {
        0.0
    };

    out.insert("RestAvgReqPerSec".to_string(), json_f64(rest_avg));
    out.insert("TotalRequests".to_string(), Value::from(total_requests));
    out.insert(
        "MaxReqPerSec".to_string(),
        json_f64(max_per_minute as f64 / 60.0),
    );
    out.insert(
        "AvgReqPerSec".to_string(),
        json_f64(total_requests as f64 / (total_minutes_walked as f64 * 60.0)),
    );
    out.insert("time_series".to_string(), Value::Array(series));
    out.insert("GrandTotalRequests".to_string(), Value::from(grand_total));
    Value::Object(out)
}

fn bucket_rate(requests: u64, minutes: usize) -> Value {
    json_f64(requests as f64 / (minutes as f64 * 60.0))
}

fn json_f64(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Counts how often a processor did something for a request, per minute.
pub struct ProcessorTimeSeries {
    requests: CounterRing,
    rotation: Rotation,
}

impl ProcessorTimeSeries {
    pub fn new() -> Self {
        Self {
            requests: CounterRing::new(),
            rotation: Rotation::new(),
        }
    }

    pub fn add(&self) {
        self.requests.bump(self.rotation.index());
    }

    pub fn rotate(&self) {
        let new_index = self.rotation.advance();
        self.requests.clear_slot(new_index);
    }

    pub fn reset(&self) {
        self.requests.reset();
        self.rotation.reset();
    }

    /// One consistent `(looped, current_index)` observation for callers
    /// aggregating several series; rotation is near-synchronous across
    /// them, so any one series' pair works for all.
    pub fn loop_and_index(&self) -> (bool, usize) {
        (self.rotation.looped(), self.rotation.index())
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.total()
    }

    pub fn serialize(
        &self,
        descriptor: SeriesDescriptor<'_>,
        looped: bool,
        current_index: usize,
    ) -> Value {
        let mut out = Map::new();
        out.insert(
            "Requests".to_string(),
            serialize_counter_ring(
                &self.requests,
                descriptor,
                looped,
                current_index,
                self.rotation.total_minutes(),
            ),
        );
        Value::Object(out)
    }
}

impl Default for ProcessorTimeSeries {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-minute request/error/warning/not-found counters for one source.
pub struct RequestTimeSeries {
    requests: CounterRing,
    errors: CounterRing,
    warnings: CounterRing,
    not_found: CounterRing,
    rotation: Rotation,
}

impl RequestTimeSeries {
    pub fn new() -> Self {
        Self {
            requests: CounterRing::new(),
            errors: CounterRing::new(),
            warnings: CounterRing::new(),
            not_found: CounterRing::new(),
            rotation: Rotation::new(),
        }
    }

    pub fn add(&self, counter: RequestCounter) {
        let index = self.rotation.index();
        match counter {
            RequestCounter::Request => self.requests.bump(index),
            RequestCounter::Error => self.errors.bump(index),
            RequestCounter::Warning => self.warnings.bump(index),
            RequestCounter::NotFound => self.not_found.bump(index),
        }
    }

    pub fn rotate(&self) {
        let new_index = self.rotation.advance();
        self.requests.clear_slot(new_index);
        self.errors.clear_slot(new_index);
        self.warnings.clear_slot(new_index);
        self.not_found.clear_slot(new_index);
    }

    pub fn reset(&self) {
        self.requests.reset();
        self.errors.reset();
        self.warnings.reset();
        self.not_found.reset();
        self.rotation.reset();
    }

    pub fn loop_and_index(&self) -> (bool, usize) {
        (self.rotation.looped(), self.rotation.index())
    }

    pub fn total_requests(&self) -> u64 {
        self.requests.total()
    }

    /// Sums one minute across the four counters into the caller's totals;
    /// used when several series are merged into one view.
    pub fn append_minute(
        &self,
        index: usize,
        requests: &mut u64,
        errors: &mut u64,
        warnings: &mut u64,
        not_found: &mut u64,
    ) {
        *requests += self.requests.value(index);
        *errors += self.errors.value(index);
        *warnings += self.warnings.value(index);
        *not_found += self.not_found.value(index);
    }

    pub fn serialize(
        &self,
        descriptor: SeriesDescriptor<'_>,
        looped: bool,
        current_index: usize,
    ) -> Value {
        let total_minutes = self.rotation.total_minutes();
        let mut out = Map::new();
        for (key, ring) in [
            ("Requests", &self.requests),
            ("Errors", &self.errors),
            ("Warnings", &self.warnings),
            ("NotFound", &self.not_found),
        ] {
            out.insert(
                key.to_string(),
                serialize_counter_ring(ring, descriptor, looped, current_index, total_minutes),
            );
        }
        Value::Object(out)
    }
}

impl Default for RequestTimeSeries {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_lands_in_current_minute() {
        let series = RequestTimeSeries::new();
        series.add(RequestCounter::Request);
        series.add(RequestCounter::Request);
        series.add(RequestCounter::NotFound);
        assert_eq!(series.requests.value(0), 2);
        assert_eq!(series.not_found.value(0), 1);
        assert_eq!(series.total_requests(), 2);
    }

    #[test]
    fn test_rotate_clears_the_new_slot_only() {
        let series = RequestTimeSeries::new();
        series.add(RequestCounter::Request);
        series.rotate();
        assert_eq!(series.loop_and_index(), (false, 1));
        assert_eq!(series.requests.value(0), 1);
        assert_eq!(series.requests.value(1), 0);
        series.add(RequestCounter::Request);
        assert_eq!(series.requests.value(1), 1);
    }

    #[test]
    fn test_totals_dominate_slot_sums() {
        // Grand total >= sum of slots (equal without racing writers).
        let series = RequestTimeSeries::new();
        for _ in 0..10 {
            series.add(RequestCounter::Request);
            series.rotate();
        }
        let sum: u64 = (0..SERIES_INTERVALS).map(|i| series.requests.value(i)).sum();
        assert!(series.total_requests() >= sum);
        assert_eq!(series.total_requests(), 10);
    }

    #[test]
    fn test_serialize_is_empty_before_first_rotation() {
        let series = RequestTimeSeries::new();
        series.add(RequestCounter::Request);
        let (looped, index) = series.loop_and_index();
        let value = series.serialize(&[(1, usize::MAX)], looped, index);
        assert_eq!(value["Requests"], serde_json::json!({}));
    }

    #[test]
    fn test_serialize_excludes_the_accumulating_minute() {
        let series = RequestTimeSeries::new();
        for _ in 0..180 {
            series.add(RequestCounter::Request);
        }
        series.rotate();
        series.add(RequestCounter::Request); // current minute, not serialized
        let (looped, index) = series.loop_and_index();
        let value = series.serialize(&[(1, usize::MAX)], looped, index);
        let requests = &value["Requests"];
        assert_eq!(requests["TotalRequests"], 180);
        assert_eq!(requests["GrandTotalRequests"], 181);
        assert_eq!(requests["MaxReqPerSec"], 3.0);
        let ts = requests["time_series"].as_array().unwrap();
        assert_eq!(ts[0], 3.0);
    }

    #[test]
    fn test_descriptor_buckets_aggregate_minutes() {
        let series = ProcessorTimeSeries::new();
        // Three one-minute slots holding 60, 120, 180 requests, oldest last.
        for count in [60u64, 120, 180] {
            for _ in 0..count {
                series.add();
            }
            series.rotate();
        }
        let (looped, index) = series.loop_and_index();
        // First output minute alone, then the remaining two as one bucket.
        let value = series.serialize(&[(1, 0), (2, usize::MAX)], looped, index);
        let ts = value["Requests"]["time_series"].as_array().unwrap();
        // Newest first: the 180 minute, then (120 + 60) / 2 minutes.
        assert_eq!(ts[0], 3.0);
        assert_eq!(ts[1], 1.5);
    }

    #[test]
    fn test_rest_average_is_clamped_right_after_wrap() {
        let series = ProcessorTimeSeries::new();
        for _ in 0..=SERIES_INTERVALS {
            series.rotate();
        }
        let (looped, index) = series.loop_and_index();
        assert!(looped);
        assert_eq!(index, 1);
        // total_minutes == SERIES_INTERVALS + 2, so the rest window is empty
        // and the denominator clamps to zero instead of underflowing.
        let value = series.serialize(&[(60, usize::MAX)], looped, index);
        assert_eq!(value["Requests"]["RestAvgReqPerSec"], 0.0);
    }
}
