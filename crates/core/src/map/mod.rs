//! The map a live view draws into.
//!
//! [`MapSurface`] is the seam between the headless orchestration in this
//! crate and whatever actually renders markers. Implementations own the
//! drawn objects; callers only hold [`MarkerHandle`]s.

pub mod memory;

use crate::layers::LayerKey;
use crate::marker::MarkerDescriptor;

pub use memory::InMemorySurface;

/// Opaque reference to a drawn marker. A handle stays the same for the whole
/// life of the marker, across any number of in-place updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerHandle(pub u64);

pub trait MapSurface {
    /// Draw a new marker in `layer`
    fn add_marker(&mut self, layer: LayerKey, marker: &MarkerDescriptor) -> MarkerHandle;

    /// Update position, icon and title of an existing marker in place.
    /// Open popups and cluster membership must survive.
    fn update_marker(&mut self, handle: MarkerHandle, marker: &MarkerDescriptor);

    /// Move a marker between layer groups without recreating it
    fn move_marker(&mut self, handle: MarkerHandle, from: LayerKey, to: LayerKey);

    /// Remove a marker from every layer group it is in
    fn remove_marker(&mut self, handle: MarkerHandle);

    fn set_layer_visible(&mut self, layer: LayerKey, visible: bool);
}
