//! Route polylines used for snapping.
//!
//! Shapes are loaded once per session from `/shapes` and never mutated. A
//! logical route usually owns several shapes (direction and branch
//! variants); their order is kept exactly as served because the direction
//! heuristic in [`crate::spatial::snap`] relies on it.

use std::collections::HashMap;

use geo::{Coord, LineString};
use geojson::{feature::Id, GeoJson, Value};
use tracing::debug;

use crate::identifiers::*;
use crate::models::types::*;

#[derive(Clone, Debug, PartialEq)]
pub struct RouteShape {
    pub id: ShapeIdentifier,
    pub route_id: RouteIdentifier,
    pub line: LineString,
}

impl RouteShape {
    pub fn new(id: impl Into<ShapeIdentifier>, route_id: impl Into<RouteIdentifier>, line: LineString) -> Self {
        Self {
            id: id.into(),
            route_id: route_id.into(),
            line,
        }
    }
}

/// All route shapes for a session, keyed by route
#[derive(Clone, Debug, Default)]
pub struct ShapeCatalog {
    shapes: HashMap<RouteIdentifier, Vec<RouteShape>>,
    len: usize,
}

impl ShapeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_shapes(shapes: impl IntoIterator<Item = RouteShape>) -> Self {
        let mut catalog = Self::new();
        for shape in shapes {
            catalog.insert(shape);
        }
        catalog
    }

    /// Parse a `/shapes` GeoJSON payload.
    ///
    /// `LineString` features become one shape; each member of a
    /// `MultiLineString` becomes its own shape. Features without a route or
    /// with another geometry type are skipped.
    pub fn from_geojson(payload: &str) -> Result<Self> {
        let geojson: GeoJson = payload
            .parse()
            .map_err(|e: geojson::Error| TransitError::SerializationError(e.to_string()))?;

        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(_) => {
                return Err(TransitError::InvalidData(
                    "expected a FeatureCollection of route shapes".into(),
                ))
            }
        };

        let mut catalog = Self::new();
        let mut skipped = 0usize;

        for (index, feature) in features.iter().enumerate() {
            let route = feature
                .property("route")
                .or_else(|| feature.property("route_id"))
                .and_then(|v| v.as_str());

            let Some(route) = route.filter(|r| !r.is_empty()) else {
                skipped += 1;
                continue;
            };

            let base_id = match &feature.id {
                Some(Id::String(s)) => s.clone(),
                Some(Id::Number(n)) => n.to_string(),
                None => feature
                    .property("shape_id")
                    .and_then(|v| v.as_str())
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("{route}-{index}")),
            };

            let lines = match feature.geometry.as_ref().map(|g| &g.value) {
                Some(Value::LineString(coords)) => vec![to_line_string(coords)],
                Some(Value::MultiLineString(parts)) => {
                    parts.iter().map(|coords| to_line_string(coords)).collect()
                }
                _ => {
                    skipped += 1;
                    continue;
                }
            };

            let multi = lines.len() > 1;
            for (part, line) in lines.into_iter().enumerate() {
                let id = if multi {
                    format!("{base_id}#{part}")
                } else {
                    base_id.clone()
                };
                catalog.insert(RouteShape::new(id, route, line));
            }
        }

        if skipped > 0 {
            debug!("skipped {skipped} shape features without a route or line geometry");
        }

        Ok(catalog)
    }

    pub fn insert(&mut self, shape: RouteShape) {
        self.shapes
            .entry(shape.route_id.clone())
            .or_default()
            .push(shape);
        self.len += 1;
    }

    /// Shapes for a route, in load order (empty if unknown)
    pub fn shapes_for(&self, route: &RouteIdentifier) -> &[RouteShape] {
        self.shapes.get(route).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, route: &RouteIdentifier) -> Result<&[RouteShape]> {
        self.shapes
            .get(route)
            .map(Vec::as_slice)
            .ok_or_else(|| TransitError::ShapeNotFound(route.to_string()))
    }

    /// Route identifiers with at least one shape, sorted
    pub fn routes(&self) -> Vec<&RouteIdentifier> {
        let mut routes: Vec<_> = self.shapes.keys().collect();
        routes.sort();
        routes
    }

    /// Total number of shapes
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// Short positions are kept as NaN so the snapper drops them with the other
// invalid coordinates.
fn to_line_string(coords: &[Vec<f64>]) -> LineString {
    LineString::new(
        coords
            .iter()
            .map(|c| match c.as_slice() {
                [x, y, ..] => Coord { x: *x, y: *y },
                _ => Coord {
                    x: f64::NAN,
                    y: f64::NAN,
                },
            })
            .collect(),
    )
}
