//! Marker diffing: converge the drawn markers onto a fresh feature list.
//!
//! Every refresh goes through [`MarkerDiffManager::apply`]. Existing markers
//! are updated in place and keep their [`MarkerHandle`], missing ones are
//! created, and ids absent from the new list are removed from every layer.
//! That last step is the only way a marker ever disappears.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use livemap_transit::spatial::queries::is_valid_point;
use livemap_transit::VehicleFeature;
use tracing::{debug, warn};

use crate::counter::VehicleCounter;
use crate::layers::{LayerGroupRouter, LayerKey};
use crate::map::{MapSurface, MarkerHandle};
use crate::marker::{render_popup, MarkerDescriptor, MarkerFactory, MarkerId, PopupContent, PopupOptions};

/// The live state of one drawn marker
#[derive(Clone, Debug)]
pub struct MarkerRecord {
    pub handle: MarkerHandle,
    pub layer: LayerKey,
    pub descriptor: MarkerDescriptor,
    /// Snapshot of the feature the marker was last drawn from
    pub feature: VehicleFeature,
    /// Diff cycle that last touched this marker
    pub last_seen: u64,
}

/// What one [`MarkerDiffManager::apply`] pass did
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
}

impl DiffReport {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0
    }
}

pub struct MarkerDiffManager<S: MapSurface> {
    surface: S,
    factory: MarkerFactory,
    router: LayerGroupRouter,
    records: HashMap<MarkerId, MarkerRecord>,
    counter: VehicleCounter,
    cycle: u64,
}

impl<S: MapSurface> MarkerDiffManager<S> {
    pub fn new(surface: S) -> Self {
        Self::with_parts(surface, MarkerFactory::default(), LayerGroupRouter::default())
    }

    pub fn with_parts(surface: S, factory: MarkerFactory, router: LayerGroupRouter) -> Self {
        Self {
            surface,
            factory,
            router,
            records: HashMap::new(),
            counter: VehicleCounter::new(),
            cycle: 0,
        }
    }

    /// Reconcile the drawn markers against `features`.
    ///
    /// A feature with an unusable position is skipped, but its id still
    /// counts as present, so an existing marker for it stays where it was.
    /// When an id appears more than once the last occurrence wins.
    pub fn apply(&mut self, features: &[VehicleFeature]) -> DiffReport {
        self.apply_retaining(features, &[])
    }

    /// [`apply`](Self::apply), treating the `retained` ids as present too.
    /// Their markers are neither updated nor removed this cycle.
    pub fn apply_retaining(&mut self, features: &[VehicleFeature], retained: &[MarkerId]) -> DiffReport {
        self.cycle += 1;
        let mut report = DiffReport::default();

        let next_ids: HashSet<&MarkerId> = features
            .iter()
            .map(|f| &f.id)
            .chain(retained.iter())
            .collect();

        let mut latest: HashMap<&MarkerId, &VehicleFeature> = HashMap::with_capacity(features.len());
        let mut order = Vec::with_capacity(features.len());
        for feature in features {
            if latest.insert(&feature.id, feature).is_none() {
                order.push(&feature.id);
            } else {
                debug!("duplicate feature id {} in payload, keeping the last one", feature.id);
            }
        }

        for id in order {
            let feature = latest[id];
            if !is_valid_point(feature.position) {
                debug!(
                    "skipping feature {}: invalid position ({}, {})",
                    feature.id,
                    feature.position.x(),
                    feature.position.y()
                );
                report.skipped += 1;
                continue;
            }

            let descriptor = self.factory.build(feature);
            let layer = self.router.route(&descriptor);

            match self.records.get_mut(id) {
                Some(record) => {
                    if record.layer != layer {
                        self.surface.move_marker(record.handle, record.layer, layer);
                        record.layer = layer;
                    }
                    // Only a change of kind touches the tally; a category change
                    // keeps the bucket recorded at increment
                    match (record.descriptor.count_key(), descriptor.count_key()) {
                        (Some(_), None) => {
                            self.counter.decrement(id);
                        }
                        (None, Some(key)) => {
                            self.counter.increment(id, key);
                        }
                        _ => {}
                    }
                    self.surface.update_marker(record.handle, &descriptor);
                    record.descriptor = descriptor;
                    record.feature = feature.clone();
                    record.last_seen = self.cycle;
                    report.updated += 1;
                }
                None => {
                    let handle = self.surface.add_marker(layer, &descriptor);
                    if let Some(key) = descriptor.count_key() {
                        self.counter.increment(id, key);
                    }
                    self.records.insert(
                        (*id).clone(),
                        MarkerRecord {
                            handle,
                            layer,
                            descriptor,
                            feature: feature.clone(),
                            last_seen: self.cycle,
                        },
                    );
                    report.created += 1;
                }
            }
        }

        let stale: Vec<MarkerId> = self
            .records
            .keys()
            .filter(|id| !next_ids.contains(id))
            .cloned()
            .collect();
        for id in stale {
            self.remove(&id);
            report.removed += 1;
        }

        if self.counter.total() != self.live_vehicle_count() {
            warn!(
                "vehicle tally drifted: counted {}, drawn {}",
                self.counter.total(),
                self.live_vehicle_count()
            );
        }

        debug!(
            "diff cycle {}: {} created, {} updated, {} removed, {} skipped",
            self.cycle, report.created, report.updated, report.removed, report.skipped
        );
        report
    }

    fn remove(&mut self, id: &MarkerId) {
        if let Some(record) = self.records.remove(id) {
            self.surface.remove_marker(record.handle);
            self.counter.decrement(id);
        }
    }

    /// Remove every marker
    pub fn clear(&mut self) {
        let ids: Vec<MarkerId> = self.records.keys().cloned().collect();
        for id in ids {
            self.remove(&id);
        }
        self.counter.clear();
    }

    pub fn record(&self, id: &MarkerId) -> Option<&MarkerRecord> {
        self.records.get(id)
    }

    pub fn records(&self) -> impl Iterator<Item = &MarkerRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Popup for `id`, computed now from the last feature snapshot
    pub fn popup_for(
        &self,
        id: &MarkerId,
        options: &PopupOptions,
        now: DateTime<Utc>,
    ) -> Option<PopupContent> {
        self.records
            .get(id)
            .map(|record| render_popup(&record.feature, options, now))
    }

    pub fn counter(&self) -> &VehicleCounter {
        &self.counter
    }

    pub fn router(&self) -> &LayerGroupRouter {
        &self.router
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    fn live_vehicle_count(&self) -> usize {
        self.records
            .values()
            .filter(|r| r.descriptor.count_key().is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::InMemorySurface;
    use geo::Point;
    use livemap_transit::{FeatureKind, RouteCategory, VehicleType};

    fn vehicle(id: &str, route: &str, lon: f64, lat: f64) -> VehicleFeature {
        VehicleFeature::new(id, route, Point::new(lon, lat))
    }

    fn station(id: &str, lon: f64, lat: f64) -> VehicleFeature {
        let mut feature = VehicleFeature::new(id, "Red", Point::new(lon, lat));
        feature.kind = FeatureKind::Station;
        feature
    }

    fn handle_of(manager: &MarkerDiffManager<InMemorySurface>, id: &str) -> MarkerHandle {
        manager.record(&MarkerId::new(id)).unwrap().handle
    }

    fn assert_counts_consistent(manager: &MarkerDiffManager<InMemorySurface>) {
        let sum: usize = manager.counter().rows().iter().map(|r| r.count).sum();
        let live = manager
            .records()
            .filter(|r| r.descriptor.kind != FeatureKind::Station)
            .count();
        assert_eq!(sum, live);
    }

    #[test]
    fn test_diff_keeps_removes_and_creates() {
        let mut manager = MarkerDiffManager::new(InMemorySurface::new());

        let a = vec![
            vehicle("1", "Red", -71.06, 42.35),
            vehicle("2", "Orange", -71.07, 42.34),
            vehicle("3", "39", -71.10, 42.33),
        ];
        let report = manager.apply(&a);
        assert_eq!(report.created, 3);
        let kept = handle_of(&manager, "1");
        let gone = handle_of(&manager, "2");

        let b = vec![
            vehicle("1", "Red", -71.061, 42.351),
            vehicle("3", "39", -71.101, 42.331),
            vehicle("4", "CR-Fitchburg", -71.2, 42.4),
        ];
        let report = manager.apply(&b);
        assert_eq!(
            report,
            DiffReport {
                created: 1,
                updated: 2,
                removed: 1,
                skipped: 0
            }
        );

        // A ∩ B: same marker, moved in place
        assert_eq!(handle_of(&manager, "1"), kept);
        let surface = manager.surface();
        assert_eq!(
            surface.marker(kept).map(|m| m.position),
            Some(Point::new(-71.061, 42.351))
        );

        // A \ B: gone from every layer
        assert!(surface.marker(gone).is_none());
        assert!(surface.layers_of(gone).is_empty());

        // B \ A: new, in exactly one layer
        let created = handle_of(&manager, "4");
        assert_eq!(surface.layers_of(created), vec![LayerKey::CommuterRail]);

        assert_eq!(surface.stats().added, 4);
        assert_eq!(surface.stats().removed, 1);
        assert_counts_consistent(&manager);
    }

    #[test]
    fn test_counts_follow_creation_and_removal() {
        let mut manager = MarkerDiffManager::new(InMemorySurface::new());

        manager.apply(&[
            vehicle("1", "Red", -71.06, 42.35),
            vehicle("2", "Red", -71.06, 42.36),
            station("place-pktrm", -71.062, 42.356),
        ]);
        assert_eq!(manager.counter().total(), 2);
        assert_eq!(manager.len(), 3);
        assert_counts_consistent(&manager);

        manager.apply(&[vehicle("2", "Red", -71.06, 42.37)]);
        assert_eq!(manager.counter().total(), 1);
        assert_counts_consistent(&manager);

        manager.apply(&[]);
        assert!(manager.is_empty());
        assert_eq!(manager.counter().total(), 0);
        assert!(manager.surface().is_empty());
    }

    #[test]
    fn test_category_change_moves_layer_and_keeps_count_bucket() {
        let mut manager = MarkerDiffManager::new(InMemorySurface::new());
        manager.apply(&[vehicle("1", "Green-B", -71.1, 42.35)]);
        let handle = handle_of(&manager, "1");

        manager.apply(&[vehicle("1", "Green-C", -71.1, 42.35)]);
        assert_eq!(handle_of(&manager, "1"), handle);

        manager.apply(&[vehicle("1", "Orange", -71.07, 42.34)]);
        assert_eq!(handle_of(&manager, "1"), handle);
        assert_eq!(manager.surface().layers_of(handle), vec![LayerKey::Orange]);
        assert_eq!(manager.surface().stats().moved, 1);

        // The tally still holds the bucket recorded at creation
        let key = manager.counter().recorded_key(&MarkerId::new("1")).unwrap();
        assert_eq!(key.category, RouteCategory::Green);
        assert_eq!(key.vehicle_type, VehicleType::LightRail);

        manager.apply(&[]);
        assert_eq!(manager.counter().total(), 0);
        assert!(manager.counter().rows().is_empty());
    }

    #[test]
    fn test_invalid_position_is_skipped_without_removal() {
        let mut manager = MarkerDiffManager::new(InMemorySurface::new());
        manager.apply(&[vehicle("1", "Red", -71.06, 42.35)]);
        let handle = handle_of(&manager, "1");

        let report = manager.apply(&[
            vehicle("1", "Red", f64::NAN, 42.35),
            vehicle("2", "Blue", -71.03, 42.37),
            vehicle("3", "Blue", -200.0, 42.37),
        ]);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.created, 1);
        assert_eq!(report.removed, 0);

        assert_eq!(handle_of(&manager, "1"), handle);
        assert_eq!(
            manager.surface().marker(handle).map(|m| m.position),
            Some(Point::new(-71.06, 42.35))
        );
        assert!(manager.record(&MarkerId::new("3")).is_none());
        assert_counts_consistent(&manager);
    }

    #[test]
    fn test_kind_change_in_place_keeps_counts_consistent() {
        let mut manager = MarkerDiffManager::new(InMemorySurface::new());

        manager.apply(&[station("x", -71.06, 42.35)]);
        assert_eq!(manager.counter().total(), 0);
        let handle = handle_of(&manager, "x");

        manager.apply(&[vehicle("x", "Red", -71.06, 42.35)]);
        assert_eq!(handle_of(&manager, "x"), handle);
        assert_eq!(manager.counter().total(), 1);
        assert_counts_consistent(&manager);

        manager.apply(&[station("x", -71.06, 42.35)]);
        assert_eq!(manager.counter().total(), 0);
        assert_counts_consistent(&manager);

        manager.apply(&[]);
        assert_eq!(manager.counter().total(), 0);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_duplicate_ids_last_wins() {
        let mut manager = MarkerDiffManager::new(InMemorySurface::new());
        let report = manager.apply(&[
            vehicle("1", "Red", -71.06, 42.35),
            vehicle("1", "Red", -71.06, 42.39),
        ]);
        assert_eq!(report.created, 1);
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.counter().total(), 1);

        let record = manager.record(&MarkerId::new("1")).unwrap();
        assert_eq!(record.feature.position, Point::new(-71.06, 42.39));
    }

    #[test]
    fn test_popup_reads_latest_snapshot() {
        let mut manager = MarkerDiffManager::new(InMemorySurface::new());
        let mut feature = vehicle("1", "Red", -71.06, 42.35);
        feature.properties.headsign = Some("Ashmont".into());
        manager.apply(std::slice::from_ref(&feature));

        feature.properties.headsign = Some("Braintree".into());
        manager.apply(&[feature]);

        let popup = manager
            .popup_for(&MarkerId::new("1"), &PopupOptions::default(), Utc::now())
            .unwrap();
        assert_eq!(popup.title, "Red Line to Braintree");
        assert!(manager
            .popup_for(&MarkerId::new("missing"), &PopupOptions::default(), Utc::now())
            .is_none());
    }

    #[test]
    fn test_many_cycles_stay_consistent() {
        let mut manager = MarkerDiffManager::new(InMemorySurface::new());
        let routes = ["Red", "Orange", "39", "CR-Worcester", "Green-E", "Boat-F1"];

        for cycle in 0..20usize {
            let features: Vec<_> = (0..12usize)
                .filter(|i| (i + cycle) % 3 != 0)
                .map(|i| {
                    vehicle(
                        &format!("v{i}"),
                        routes[(i + cycle / 5) % routes.len()],
                        -71.0 - i as f64 * 0.01,
                        42.3 + cycle as f64 * 0.001,
                    )
                })
                .collect();
            manager.apply(&features);
            assert_eq!(manager.len(), features.len());
            assert_eq!(manager.surface().len(), features.len());
            assert_counts_consistent(&manager);
        }
    }
}
