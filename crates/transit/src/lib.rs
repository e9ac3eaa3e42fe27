//! # livemap-transit
//!
//! Data model and geometry for a live transit map.
//!
//! ## Features
//!
//! - **Vehicle features**: Parse `/vehicles` GeoJSON into typed vehicles and stations
//! - **Route categories**: One classification function for every "what line is this" question
//! - **Route shapes**: Per-route polylines loaded once per session
//! - **Snapping**: Project reported positions onto the nearest route shape
//!
//! ## Example
//!
//! ```
//! use livemap_transit::prelude::*;
//! use geo::{LineString, Point};
//!
//! let shapes = ShapeCatalog::from_shapes(vec![RouteShape::new(
//!     "red-1",
//!     "Red",
//!     LineString::from(vec![(-71.06, 42.30), (-71.06, 42.40)]),
//! )]);
//!
//! // A Red Line train reported a few meters east of the track
//! let train = VehicleFeature::new("R-1", "Red", Point::new(-71.0598, 42.35));
//!
//! let result = snap_vehicle(&SnapRequest::for_feature(&train), shapes.shapes_for(&train.route));
//! assert!(result.is_snapped());
//! assert!((result.point.x() - -71.06).abs() < 1e-9);
//! ```

pub mod identifiers;
pub mod models;
pub mod spatial;

// Re-exports for convenience
pub mod prelude {
    pub use crate::identifiers::*;
    pub use crate::models::{
        feature::*,
        shape::{RouteShape, ShapeCatalog},
        types::*,
    };
    pub use crate::spatial::{
        haversine_distance, snap_vehicle, SkipReason, SnapOutcome, SnapRequest, SnapResult,
    };
}

pub use prelude::*;
