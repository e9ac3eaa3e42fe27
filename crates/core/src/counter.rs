//! Live vehicle tallies per line category and vehicle type.
//!
//! Counts move only through [`VehicleCounter::increment`] and
//! [`VehicleCounter::decrement`], which the diff manager calls exactly once
//! per marker creation and removal. The bucket a marker was counted in is
//! recorded at increment time and reused at decrement time, even if the
//! vehicle's classification changed in between.

use std::collections::{BTreeMap, HashMap};

use livemap_transit::{RouteCategory, VehicleType};
use serde::Serialize;

use crate::marker::MarkerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CountKey {
    pub category: RouteCategory,
    pub vehicle_type: VehicleType,
}

impl CountKey {
    pub fn new(category: RouteCategory, vehicle_type: VehicleType) -> Self {
        Self {
            category,
            vehicle_type,
        }
    }
}

/// One line of the tally table
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TallyRow {
    pub category: RouteCategory,
    pub vehicle_type: VehicleType,
    pub count: usize,
}

#[derive(Clone, Debug, Default)]
pub struct VehicleCounter {
    recorded: HashMap<MarkerId, CountKey>,
    counts: BTreeMap<CountKey, usize>,
}

impl VehicleCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `id` under `key`. Returns `false` (and changes nothing) if the id
    /// is already counted.
    pub fn increment(&mut self, id: &MarkerId, key: CountKey) -> bool {
        if self.recorded.contains_key(id) {
            return false;
        }
        self.recorded.insert(id.clone(), key);
        *self.counts.entry(key).or_insert(0) += 1;
        true
    }

    /// Uncount `id` from the bucket it was counted in
    pub fn decrement(&mut self, id: &MarkerId) -> Option<CountKey> {
        let key = self.recorded.remove(id)?;
        if let Some(count) = self.counts.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&key);
            }
        }
        Some(key)
    }

    pub fn recorded_key(&self, id: &MarkerId) -> Option<CountKey> {
        self.recorded.get(id).copied()
    }

    pub fn get(&self, key: CountKey) -> usize {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.recorded.len()
    }

    pub fn by_category(&self) -> BTreeMap<RouteCategory, usize> {
        let mut totals = BTreeMap::new();
        for (key, count) in &self.counts {
            *totals.entry(key.category).or_insert(0) += count;
        }
        totals
    }

    pub fn by_vehicle_type(&self) -> BTreeMap<VehicleType, usize> {
        let mut totals = BTreeMap::new();
        for (key, count) in &self.counts {
            *totals.entry(key.vehicle_type).or_insert(0) += count;
        }
        totals
    }

    /// Non-zero tallies ordered by category then vehicle type
    pub fn rows(&self) -> Vec<TallyRow> {
        self.counts
            .iter()
            .map(|(key, count)| TallyRow {
                category: key.category,
                vehicle_type: key.vehicle_type,
                count: *count,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.recorded.clear();
        self.counts.clear();
    }
}
