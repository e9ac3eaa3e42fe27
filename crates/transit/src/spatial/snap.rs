//! Vehicle-to-route snapping.
//!
//! Reported GPS positions drift off the track. Before a vehicle is drawn its
//! position is projected onto the nearest candidate shape of its route, if
//! that shape is close enough for the vehicle's class. Inbound commuter rail
//! trains are pushed forward by one train length so the marker sits on the
//! locomotive, which leads inbound trains from the far end.
//!
//! [`snap_vehicle`] is a pure function. A shape that cannot be used (too few
//! valid points, non-finite math) is skipped; the worst case is the input
//! position returned unchanged.

use geo::{LineString, Point};
use tracing::debug;

use crate::models::feature::VehicleFeature;
use crate::models::shape::RouteShape;
use crate::models::types::*;
use crate::spatial::queries::{
    clean_line, is_valid_point, offset_along, project_onto_line, simplify_line, LineProjection,
};

/// Approximate length of a commuter rail consist
pub const TRAIN_LENGTH_METERS: f64 = 200.0;

/// No vehicle is ever moved further than this, whatever its class
pub const MAX_SNAP_DISTANCE_METERS: f64 = 100.0;

pub const SIMPLIFY_TOLERANCE_DEGREES: f64 = 1e-4;
pub const MAX_SHAPE_POINTS: usize = 500;

/// Everything the snapper needs to know about one vehicle
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapRequest {
    pub position: Point,
    pub category: RouteCategory,
    pub direction: Option<DirectionId>,
    pub status: VehicleStatus,
}

impl SnapRequest {
    pub fn for_feature(feature: &VehicleFeature) -> Self {
        Self {
            position: feature.position,
            category: feature.category,
            direction: feature.direction(),
            status: feature.status(),
        }
    }
}

/// Why a vehicle kept its reported position
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SkipReason {
    InvalidInput,
    /// Category has no reliable shapes (intercity rail)
    UnreliableShapes,
    /// Stopped vehicles render where they report
    StoppedAtStation,
    /// No usable shape for the route
    NoShapes,
    BeyondThreshold { distance_m: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SnapOutcome {
    Unsnapped(SkipReason),
    Snapped { distance_m: f64 },
    SnappedWithOffset { distance_m: f64, offset_m: f64 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SnapResult {
    pub point: Point,
    pub outcome: SnapOutcome,
}

impl SnapResult {
    fn unchanged(point: Point, reason: SkipReason) -> Self {
        Self {
            point,
            outcome: SnapOutcome::Unsnapped(reason),
        }
    }

    pub fn is_snapped(&self) -> bool {
        !matches!(self.outcome, SnapOutcome::Unsnapped(_))
    }
}

/// Coarse direction filter.
///
/// Rail shape lists hold outbound variants first and inbound variants
/// second, so outbound vehicles look at the first half and inbound vehicles
/// at the second. This is an approximation, not a direction model.
pub fn filter_by_direction(
    shapes: &[RouteShape],
    category: RouteCategory,
    direction: Option<DirectionId>,
) -> &[RouteShape] {
    if !category.is_bidirectional_rail() || shapes.len() < 2 {
        return shapes;
    }

    let mid = shapes.len().div_ceil(2);
    match direction {
        Some(DirectionId::Outbound) => &shapes[..mid],
        Some(DirectionId::Inbound) => &shapes[mid..],
        None => shapes,
    }
}

/// Clean and simplify a shape for projection
fn prepare_line(shape: &RouteShape) -> Option<LineString> {
    let cleaned = clean_line(&shape.line)?;
    let simplified = simplify_line(&cleaned, SIMPLIFY_TOLERANCE_DEGREES, MAX_SHAPE_POINTS);
    (simplified.0.len() >= 2).then_some(simplified)
}

/// Compute the position to render a vehicle at.
pub fn snap_vehicle(request: &SnapRequest, shapes: &[RouteShape]) -> SnapResult {
    let position = request.position;

    if !is_valid_point(position) {
        return SnapResult::unchanged(position, SkipReason::InvalidInput);
    }

    let Some(class) = request.category.snap_class() else {
        return SnapResult::unchanged(position, SkipReason::UnreliableShapes);
    };

    if request.status == VehicleStatus::StoppedAt {
        return SnapResult::unchanged(position, SkipReason::StoppedAtStation);
    }

    let candidates = filter_by_direction(shapes, request.category, request.direction);

    let mut best: Option<(LineProjection, LineString)> = None;
    for shape in candidates {
        let Some(line) = prepare_line(shape) else {
            debug!("shape {} has no usable geometry, skipping", shape.id);
            continue;
        };

        let Some(projection) = project_onto_line(position, &line) else {
            continue;
        };

        if !projection.distance_m.is_finite() {
            debug!("projection onto shape {} is not finite, skipping", shape.id);
            continue;
        }

        if best
            .as_ref()
            .is_none_or(|(b, _)| projection.distance_m < b.distance_m)
        {
            best = Some((projection, line));
        }
    }

    let Some((projection, line)) = best else {
        return SnapResult::unchanged(position, SkipReason::NoShapes);
    };

    let threshold = class.threshold_meters().min(MAX_SNAP_DISTANCE_METERS);
    if projection.distance_m > threshold {
        return SnapResult::unchanged(
            position,
            SkipReason::BeyondThreshold {
                distance_m: projection.distance_m,
            },
        );
    }

    let offset_inbound = request.category == RouteCategory::CommuterRail
        && request.direction == Some(DirectionId::Inbound);

    if offset_inbound {
        if let Some((point, offset_m)) = offset_along(&line, &projection, TRAIN_LENGTH_METERS) {
            return SnapResult {
                point,
                outcome: SnapOutcome::SnappedWithOffset {
                    distance_m: projection.distance_m,
                    offset_m,
                },
            };
        }
    }

    SnapResult {
        point: projection.point,
        outcome: SnapOutcome::Snapped {
            distance_m: projection.distance_m,
        },
    }
}
