//! Highest-sat-wins deduplication of annotation rows.

use super::AnnotRecord;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Per-request aggregator for one named-annotation fan-out.
///
/// Rows are stored as they stream in, tagged with their originating sat;
/// nothing is released until every participating sat has signalled EOF, at
/// which point [`drain`](Self::drain) yields each annotation once.
pub struct AnnotFilter {
    /// Sats this request fans out to; EOF bookkeeping runs against it.
    participating: HashSet<i32>,
    finished: HashSet<i32>,
    /// annotation name → (sat it came from, the row). BTreeMap keeps the
    /// drain order deterministic.
    best: BTreeMap<String, (i32, AnnotRecord)>,
}

impl AnnotFilter {
    pub fn new(participating_sats: impl IntoIterator<Item = i32>) -> Self {
        Self {
            participating: participating_sats.into_iter().collect(),
            finished: HashSet::new(),
            best: BTreeMap::new(),
        }
    }

    /// Records one row from `sat`; a row for the same annotation from a
    /// higher sat displaces a lower one, never the other way around.
    pub fn store(&mut self, sat: i32, record: AnnotRecord) {
        match self.best.get(&record.annot_name) {
            Some((existing_sat, _)) if *existing_sat >= sat => {
                debug!(
                    annot = %record.annot_name,
                    kept_sat = existing_sat,
                    dropped_sat = sat,
                    "dropping duplicate annotation from lower sat"
                );
            }
            _ => {
                self.best.insert(record.annot_name.clone(), (sat, record));
            }
        }
    }

    /// Marks `sat` as fully streamed; returns true once every
    /// participating sat is done and the filter is ready to flush.
    pub fn eof(&mut self, sat: i32) -> bool {
        if self.participating.contains(&sat) {
            self.finished.insert(sat);
        }
        self.is_ready()
    }

    /// True when every participating sat has reached EOF.
    pub fn is_ready(&self) -> bool {
        self.finished.len() == self.participating.len()
    }

    /// Releases the deduplicated annotations in name order.
    ///
    /// Calling before every sat reached EOF yields nothing; rows stay put
    /// for the eventual flush.
    pub fn drain(&mut self) -> Vec<(i32, AnnotRecord)> {
        if !self.is_ready() {
            return Vec::new();
        }
        std::mem::take(&mut self.best).into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nothing_is_released_before_all_eofs() {
        let mut filter = AnnotFilter::new([23, 24]);
        filter.store(23, AnnotRecord::new("NA000000001.1", 10));
        assert!(!filter.eof(23));
        assert!(filter.drain().is_empty());
        assert!(filter.eof(24));
        assert_eq!(filter.drain().len(), 1);
    }

    #[test]
    fn test_duplicate_prefers_highest_sat() {
        let mut filter = AnnotFilter::new([23, 24]);
        filter.store(23, AnnotRecord::new("NA000000001.1", 10));
        filter.store(24, AnnotRecord::new("NA000000001.1", 77));
        filter.eof(23);
        filter.eof(24);
        let released = filter.drain();
        assert_eq!(released.len(), 1);
        assert_eq!(released[0].0, 24);
        assert_eq!(released[0].1.sat_key, 77);
    }

    #[test]
    fn test_higher_sat_wins_regardless_of_arrival_order() {
        let mut filter = AnnotFilter::new([23, 24]);
        filter.store(24, AnnotRecord::new("NA000000001.1", 77));
        filter.store(23, AnnotRecord::new("NA000000001.1", 10));
        filter.eof(23);
        filter.eof(24);
        assert_eq!(filter.drain()[0].0, 24);
    }

    #[test]
    fn test_lower_sat_only_annotations_survive() {
        let mut filter = AnnotFilter::new([23, 24]);
        filter.store(23, AnnotRecord::new("NA000000002.1", 11));
        filter.store(24, AnnotRecord::new("NA000000001.1", 77));
        filter.eof(23);
        filter.eof(24);
        let released = filter.drain();
        assert_eq!(released.len(), 2);
        // Name-ordered drain.
        assert_eq!(released[0].1.annot_name, "NA000000001.1");
        assert_eq!(released[1].1.annot_name, "NA000000002.1");
        assert_eq!(released[1].0, 23);
    }

    #[test]
    fn test_drain_is_single_shot() {
        let mut filter = AnnotFilter::new([23]);
        filter.store(23, AnnotRecord::new("NA000000001.1", 10));
        filter.eof(23);
        assert_eq!(filter.drain().len(), 1);
        assert!(filter.drain().is_empty());
    }

    #[test]
    fn test_eof_from_unknown_sat_is_ignored() {
        let mut filter = AnnotFilter::new([23, 24]);
        assert!(!filter.eof(99));
        assert!(!filter.is_ready());
    }
}
