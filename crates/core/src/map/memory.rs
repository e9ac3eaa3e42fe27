use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::layers::LayerKey;
use crate::map::{MapSurface, MarkerHandle};
use crate::marker::MarkerDescriptor;

/// Operation counters, for asserting on churn
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SurfaceStats {
    pub added: usize,
    pub updated: usize,
    pub moved: usize,
    pub removed: usize,
}

/// A map surface that keeps everything in memory.
///
/// Used headless (the command line tool exports it as GeoJSON) and in tests.
#[derive(Debug, Default)]
pub struct InMemorySurface {
    next_handle: u64,
    markers: HashMap<MarkerHandle, MarkerDescriptor>,
    layers: BTreeMap<LayerKey, BTreeSet<MarkerHandle>>,
    hidden: BTreeSet<LayerKey>,
    stats: SurfaceStats,
}

impl InMemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<&MarkerDescriptor> {
        self.markers.get(&handle)
    }

    pub fn markers(&self) -> impl Iterator<Item = (MarkerHandle, &MarkerDescriptor)> {
        self.markers.iter().map(|(h, m)| (*h, m))
    }

    pub fn layer(&self, layer: LayerKey) -> impl Iterator<Item = MarkerHandle> + '_ {
        self.layers.get(&layer).into_iter().flatten().copied()
    }

    /// Layers that currently contain `handle`
    pub fn layers_of(&self, handle: MarkerHandle) -> Vec<LayerKey> {
        self.layers
            .iter()
            .filter(|(_, handles)| handles.contains(&handle))
            .map(|(layer, _)| *layer)
            .collect()
    }

    pub fn is_layer_visible(&self, layer: LayerKey) -> bool {
        !self.hidden.contains(&layer)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn stats(&self) -> SurfaceStats {
        self.stats
    }
}

impl MapSurface for InMemorySurface {
    fn add_marker(&mut self, layer: LayerKey, marker: &MarkerDescriptor) -> MarkerHandle {
        self.next_handle += 1;
        let handle = MarkerHandle(self.next_handle);
        self.markers.insert(handle, marker.clone());
        self.layers.entry(layer).or_default().insert(handle);
        self.stats.added += 1;
        handle
    }

    fn update_marker(&mut self, handle: MarkerHandle, marker: &MarkerDescriptor) {
        if let Some(existing) = self.markers.get_mut(&handle) {
            *existing = marker.clone();
            self.stats.updated += 1;
        }
    }

    fn move_marker(&mut self, handle: MarkerHandle, from: LayerKey, to: LayerKey) {
        if let Some(handles) = self.layers.get_mut(&from) {
            handles.remove(&handle);
        }
        self.layers.entry(to).or_default().insert(handle);
        self.stats.moved += 1;
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        if self.markers.remove(&handle).is_some() {
            self.stats.removed += 1;
        }
        for handles in self.layers.values_mut() {
            handles.remove(&handle);
        }
    }

    fn set_layer_visible(&mut self, layer: LayerKey, visible: bool) {
        if visible {
            self.hidden.remove(&layer);
        } else {
            self.hidden.insert(layer);
        }
    }
}
