//! # livemap-core
//!
//! Headless engine of a live transit map: builds markers from vehicle
//! features, keeps them in sync with a polling/streaming feed, routes them
//! into layer groups and keeps per-line tallies.
//!
//! The drawing backend sits behind [`map::MapSurface`]; everything else is
//! plain data and can run (and be tested) without one.

pub mod alerts;
pub mod aux_geometry;
pub mod config;
pub mod counter;
pub mod diff;
pub mod error;
pub mod layers;
pub mod live;
pub mod live_map;
pub mod map;
pub mod marker;

// Re-export transit from the transit crate
pub use livemap_transit as transit;

pub use error::{ErrorCategory, LiveMapError, Result};
pub use live_map::{LiveMap, RenderReport};
