//! Spatial queries and vehicle-to-route snapping.

pub mod queries;
pub mod snap;

pub use queries::{
    clean_line, haversine_distance, is_valid_coordinate, is_valid_point, line_length,
    nearest_point_on_line, offset_along, point_along, project_onto_line, simplify_line,
    LineProjection,
};
pub use snap::{
    filter_by_direction, snap_vehicle, SkipReason, SnapOutcome, SnapRequest, SnapResult,
    TRAIN_LENGTH_METERS,
};
