//! Momentary-value rings: per-minute averages of a sampled gauge.
//!
//! Unlike the counter rings, the inputs here are point-in-time samples
//! (active connection counts and the like) taken every few seconds. Samples
//! accumulate into a `(sum, count)` pair; rotation writes the minute's
//! average into the ring and resets the pair.

use super::{SeriesDescriptor, SERIES_INTERVALS};
use crate::stats::time_series::Rotation;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

fn load_f64(cell: &AtomicU64) -> f64 {
    f64::from_bits(cell.load(Ordering::Relaxed))
}

fn store_f64(cell: &AtomicU64, value: f64) {
    cell.store(value.to_bits(), Ordering::Relaxed);
}

/// Ring of per-minute averages of a momentary value.
pub struct MomentarySeries {
    accumulated: AtomicU64,
    accumulated_count: AtomicU64,
    /// f64 bit patterns; written only by the rotation tick.
    values: Box<[AtomicU64]>,
    total_values: AtomicU64,
    max_value: AtomicU64,
    rotation: Rotation,
}

impl MomentarySeries {
    pub fn new() -> Self {
        let values: Vec<AtomicU64> = (0..SERIES_INTERVALS).map(|_| AtomicU64::new(0)).collect();
        Self {
            accumulated: AtomicU64::new(0),
            accumulated_count: AtomicU64::new(0),
            values: values.into_boxed_slice(),
            total_values: AtomicU64::new(0),
            max_value: AtomicU64::new(0),
            rotation: Rotation::new(),
        }
    }

    /// Feeds one sample into the accumulating minute.
    pub fn add(&self, value: u64) {
        self.accumulated.fetch_add(value, Ordering::Relaxed);
        self.accumulated_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Closes the accumulating minute: stores its average, updates the
    /// running total and maximum, then advances the ring.
    pub fn rotate(&self) {
        let sum = self.accumulated.swap(0, Ordering::Relaxed);
        let count = self.accumulated_count.swap(0, Ordering::Relaxed);
        let average = if count > 0 { sum as f64 / count as f64 } else { 0.0 };

        let current = self.rotation.index();
        store_f64(&self.values[current], average);
        store_f64(&self.total_values, load_f64(&self.total_values) + average);
        if average > load_f64(&self.max_value) {
            store_f64(&self.max_value, average);
        }

        let new_index = self.rotation.advance();
        store_f64(&self.values[new_index], 0.0);
    }

    pub fn reset(&self) {
        for value in self.values.iter() {
            value.store(0, Ordering::Relaxed);
        }
        self.accumulated.store(0, Ordering::Relaxed);
        self.accumulated_count.store(0, Ordering::Relaxed);
        self.total_values.store(0, Ordering::Relaxed);
        self.max_value.store(0, Ordering::Relaxed);
        self.rotation.reset();
    }

    pub fn loop_and_index(&self) -> (bool, usize) {
        (self.rotation.looped(), self.rotation.index())
    }

    pub fn serialize(
        &self,
        descriptor: SeriesDescriptor<'_>,
        looped: bool,
        current_index: usize,
    ) -> Value {
        let mut out = Map::new();
        out.insert(
            "AverageValues".to_string(),
            self.serialize_values(descriptor, looped, current_index),
        );
        Value::Object(out)
    }

    fn serialize_values(
        &self,
        descriptor: SeriesDescriptor<'_>,
        mut looped: bool,
        current_index: usize,
    ) -> Value {
        let mut out = Map::new();
        if current_index == 0 && !looped {
            return Value::Object(out);
        }

        let mut series: Vec<Value> = Vec::new();
        let mut raw_index = if current_index == 0 {
            looped = false;
            SERIES_INTERVALS - 1
        } else {
            current_index - 1
        };

        let mut total_processed = 0.0f64;
        let mut bucket_minutes = 0usize;
        let mut bucket_values = 0.0f64;
        let mut output_index = 0usize;
        let mut range_index = 0usize;
        let (mut minutes_per_bucket, mut last_seq_index) =
            descriptor.first().copied().unwrap_or((1, usize::MAX));

        let mut step = |raw_index: usize, series: &mut Vec<Value>| {
            let value = load_f64(&self.values[raw_index]);
            total_processed += value;
            bucket_minutes += 1;
            bucket_values += value;
            if bucket_minutes >= minutes_per_bucket {
                series.push(json_f64(bucket_values / bucket_minutes as f64));
                bucket_minutes = 0;
                bucket_values = 0.0;
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
            step(raw_index, &mut series);
            if raw_index == 0 {
                break;
            }
            raw_index -= 1;
        }

        if looped {
            let mut raw_index = SERIES_INTERVALS - 1;
            while raw_index > current_index + 1 {
                step(raw_index, &mut series);
                raw_index -= 1;
            }
        }

        if bucket_minutes > 0 {
            series.push(json_f64(bucket_values / bucket_minutes as f64));
        }

        let total_values = load_f64(&self.total_values);
        let total_minutes = self.rotation.total_minutes();
        let rest_average = if looped {
            let rest_minutes = total_minutes.saturating_sub(SERIES_INTERVALS as u64 + 2);
            let rest_values =
                (total_values - total_processed - load_f64(&self.values[current_index])).max(0.0);
            if rest_minutes > 0 {
                rest_values / rest_minutes as f64
            } else {
                0.0
            }
        } else {
            0.0
        };

        out.insert("RestAverageValue".to_string(), json_f64(rest_average));
        out.insert("Max".to_string(), json_f64(load_f64(&self.max_value)));
        let average = if total_minutes <= 1 {
            // The very first minute is still accumulating.
            0.0
        } else {
            total_values / (total_minutes - 1) as f64
        };
        out.insert("Avg".to_string(), json_f64(average));
        out.insert("time_series".to_string(), Value::Array(series));
        Value::Object(out)
    }
}

impl Default for MomentarySeries {
    fn default() -> Self {
        Self::new()
    }
}

fn json_f64(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_stores_the_minute_average() {
        let series = MomentarySeries::new();
        series.add(10);
        series.add(20);
        series.rotate();
        assert_eq!(load_f64(&series.values[0]), 15.0);
        assert_eq!(load_f64(&series.total_values), 15.0);
        assert_eq!(load_f64(&series.max_value), 15.0);
    }

    #[test]
    fn test_minute_without_samples_averages_to_zero() {
        let series = MomentarySeries::new();
        series.rotate();
        assert_eq!(load_f64(&series.values[0]), 0.0);
    }

    #[test]
    fn test_serialize_reports_max_and_overall_average() {
        let series = MomentarySeries::new();
        series.add(10);
        series.add(20);
        series.rotate();
        series.add(30);
        series.rotate();
        let (looped, index) = series.loop_and_index();
        let value = series.serialize(&[(1, usize::MAX)], looped, index);
        let averages = &value["AverageValues"];
        assert_eq!(averages["Max"], 30.0);
        // Two closed minutes: (15 + 30) / 2.
        assert_eq!(averages["Avg"], 22.5);
        let ts = averages["time_series"].as_array().unwrap();
        assert_eq!(ts[0], 30.0);
        assert_eq!(ts[1], 15.0);
    }

    #[test]
    fn test_serialize_is_empty_before_first_rotation() {
        let series = MomentarySeries::new();
        series.add(5);
        let (looped, index) = series.loop_and_index();
        let value = series.serialize(&[(1, usize::MAX)], looped, index);
        assert_eq!(value["AverageValues"], serde_json::json!({}));
    }
}
