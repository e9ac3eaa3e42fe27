//! One live map: shapes, drawn markers, tallies and the tracked vehicle.
//!
//! A [`LiveMap`] is the explicit context every refresh goes through. Several
//! can exist side by side, each with its own surface.

use chrono::{DateTime, Utc};
use geo::Point;
use livemap_transit::{
    snap_vehicle, ShapeCatalog, SnapOutcome, SnapRequest, VehicleCollection, VehicleFeature,
};
use tracing::{debug, info};

use crate::counter::VehicleCounter;
use crate::diff::{DiffReport, MarkerDiffManager};
use crate::layers::{LayerKey, LayerVisibility};
use crate::map::MapSurface;
use crate::marker::{MarkerId, PopupContent, PopupOptions};

/// Result of one [`LiveMap::render`] pass
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub diff: DiffReport,
    /// Vehicles moved onto a route shape
    pub snapped: usize,
    /// Of those, vehicles also pushed forward by a train length
    pub offset: usize,
    /// Features the parser already dropped
    pub rejected: usize,
}

pub struct LiveMap<S: MapSurface> {
    shapes: Option<ShapeCatalog>,
    diff: MarkerDiffManager<S>,
    popup_options: PopupOptions,
    tracked: Option<MarkerId>,
    visibility: LayerVisibility,
}

impl<S: MapSurface> LiveMap<S> {
    pub fn new(surface: S) -> Self {
        Self::with_manager(MarkerDiffManager::new(surface))
    }

    pub fn with_manager(diff: MarkerDiffManager<S>) -> Self {
        Self {
            shapes: None,
            diff,
            popup_options: PopupOptions::default(),
            tracked: None,
            visibility: LayerVisibility::default(),
        }
    }

    /// Install route shapes. Until this is called vehicles render at their
    /// reported positions.
    pub fn set_shapes(&mut self, shapes: ShapeCatalog) {
        info!("loaded shapes for {} routes", shapes.len());
        self.shapes = Some(shapes);
    }

    pub fn has_shapes(&self) -> bool {
        self.shapes.is_some()
    }

    /// Snap, diff and draw one payload
    pub fn render(&mut self, collection: &VehicleCollection) -> RenderReport {
        let mut report = RenderReport {
            rejected: collection.skipped,
            ..RenderReport::default()
        };

        let placed: Vec<VehicleFeature> = collection
            .features
            .iter()
            .map(|feature| {
                let (placed, outcome) = self.place(feature);
                match outcome {
                    Some(SnapOutcome::Snapped { .. }) => report.snapped += 1,
                    Some(SnapOutcome::SnappedWithOffset { .. }) => {
                        report.snapped += 1;
                        report.offset += 1;
                    }
                    _ => {}
                }
                placed
            })
            .collect();

        report.diff = self.diff.apply_retaining(&placed, &collection.rejected);

        if let Some(id) = &self.tracked {
            if self.diff.record(id).is_none() {
                info!("tracked vehicle {id} is gone, no longer tracking");
                self.tracked = None;
            }
        }

        report
    }

    fn place(&self, feature: &VehicleFeature) -> (VehicleFeature, Option<SnapOutcome>) {
        let Some(shapes) = &self.shapes else {
            return (feature.clone(), None);
        };
        if feature.is_station() {
            return (feature.clone(), None);
        }

        let result = snap_vehicle(
            &SnapRequest::for_feature(feature),
            shapes.shapes_for(&feature.route),
        );
        if let SnapOutcome::Unsnapped(reason) = result.outcome {
            debug!("vehicle {} not snapped: {reason:?}", feature.id);
        }
        (feature.clone().with_position(result.point), Some(result.outcome))
    }

    /// Follow a vehicle by id. Returns `false` if no such marker is drawn.
    pub fn track(&mut self, id: impl Into<MarkerId>) -> bool {
        let id = id.into();
        if self.diff.record(&id).is_none() {
            return false;
        }
        self.tracked = Some(id);
        true
    }

    pub fn untrack(&mut self) {
        self.tracked = None;
    }

    pub fn tracked(&self) -> Option<&MarkerId> {
        self.tracked.as_ref()
    }

    /// Where the tracked vehicle is drawn right now
    pub fn tracked_position(&self) -> Option<Point> {
        let id = self.tracked.as_ref()?;
        self.diff.record(id).map(|record| record.descriptor.position)
    }

    pub fn set_layer_visible(&mut self, layer: LayerKey, visible: bool) {
        self.visibility.set(layer, visible);
        self.diff.surface_mut().set_layer_visible(layer, visible);
    }

    /// Apply saved visibility flags to the surface
    pub fn restore_visibility(&mut self, visibility: LayerVisibility) {
        for layer in visibility.hidden() {
            self.diff.surface_mut().set_layer_visible(layer, false);
        }
        self.visibility = visibility;
    }

    pub fn visibility(&self) -> &LayerVisibility {
        &self.visibility
    }

    pub fn popup_options(&self) -> &PopupOptions {
        &self.popup_options
    }

    /// Change popup toggles. Takes effect the next time a popup opens.
    pub fn set_popup_options(&mut self, options: PopupOptions) {
        self.popup_options = options;
    }

    pub fn popup(&self, id: &MarkerId, now: DateTime<Utc>) -> Option<PopupContent> {
        self.diff.popup_for(id, &self.popup_options, now)
    }

    pub fn tallies(&self) -> &VehicleCounter {
        self.diff.counter()
    }

    pub fn markers(&self) -> &MarkerDiffManager<S> {
        &self.diff
    }

    pub fn surface(&self) -> &S {
        self.diff.surface()
    }
}
