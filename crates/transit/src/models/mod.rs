//! Transit data models and types.

pub mod feature;
pub mod shape;
pub mod types;

// Re-exports for convenience
pub use feature::{FeatureKind, VehicleCollection, VehicleFeature, VehicleProperties};
pub use shape::{RouteShape, ShapeCatalog};
pub use types::{
    DirectionId, Result, RouteCategory, RouteType, SnapClass, TransitError, VehicleStatus,
    VehicleType,
};
