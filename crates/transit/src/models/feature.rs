//! Live vehicle observations parsed from the `/vehicles` GeoJSON payload.
//!
//! A payload is a GeoJSON `FeatureCollection` of `Point` features. Most are
//! vehicles; stations ride along in the same collection and are marked with
//! `"marker-symbol": "building"`.
//!
//! Parsing never fails because of a single bad feature. A feature whose point
//! is out of range is kept as is and left for the consumer to skip. Entries
//! with no point geometry, or properties that do not deserialize, are dropped
//! and counted, and their ids are kept in [`VehicleCollection::rejected`].

use chrono::{DateTime, FixedOffset};
use geo::Point;
use geojson::{feature::Id, GeoJson, Value};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::identifiers::*;
use crate::models::types::*;

/// Properties carried by a vehicle (or station) feature
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleProperties {
    #[serde(deserialize_with = "lenient_route")]
    pub route: String,
    #[serde(alias = "current_status", deserialize_with = "lenient_status")]
    pub status: VehicleStatus,
    pub direction_id: Option<u8>,
    /// Miles per hour
    pub speed: Option<f64>,
    /// Degrees clockwise from north
    pub bearing: Option<f64>,
    pub occupancy_status: Option<String>,
    pub occupancy_percentage: Option<u8>,
    pub stop: Option<String>,
    /// `[lat, lng]` of the stop the status refers to
    pub stop_coordinates: Option<[f64; 2]>,
    pub eta: Option<String>,
    pub headsign: Option<String>,
    pub label: Option<String>,
    pub route_type: Option<u16>,
    pub update_time: Option<String>,
    #[serde(rename = "marker-symbol")]
    pub marker_symbol: Option<String>,
    #[serde(rename = "marker-color")]
    pub marker_color: Option<String>,
    /// Some feeds put the vehicle id in the properties instead of the feature
    pub id: Option<serde_json::Value>,
}

/// Route ids arrive as strings, bare numbers or `null`
fn lenient_route<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Anything that is not a known status string reads as in transit
fn lenient_status<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<VehicleStatus, D::Error> {
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => VehicleStatus::from(s),
        _ => VehicleStatus::default(),
    })
}

impl VehicleProperties {
    pub fn direction(&self) -> Option<DirectionId> {
        self.direction_id.and_then(|d| DirectionId::try_from(d).ok())
    }

    pub fn route_type(&self) -> Option<RouteType> {
        self.route_type.and_then(RouteType::from_gtfs)
    }

    pub fn eta_time(&self) -> Option<DateTime<FixedOffset>> {
        self.eta
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    }

    pub fn updated_at(&self) -> Option<DateTime<FixedOffset>> {
        self.update_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Vehicle,
    Station,
}

/// One live vehicle (or station) observation
#[derive(Clone, Debug, PartialEq)]
pub struct VehicleFeature {
    pub id: VehicleIdentifier,
    pub kind: FeatureKind,
    /// Longitude/latitude (WGS84)
    pub position: Point,
    pub route: RouteIdentifier,
    pub category: RouteCategory,
    pub properties: VehicleProperties,
}

impl VehicleFeature {
    /// Build a vehicle feature directly (tests, synthetic data)
    pub fn new(id: impl Into<VehicleIdentifier>, route: &str, position: Point) -> Self {
        Self {
            id: id.into(),
            kind: FeatureKind::Vehicle,
            position,
            route: RouteIdentifier::new(route),
            category: RouteCategory::classify(route),
            properties: VehicleProperties {
                route: route.to_owned(),
                ..VehicleProperties::default()
            },
        }
    }

    pub fn with_status(mut self, status: VehicleStatus) -> Self {
        self.properties.status = status;
        self
    }

    pub fn with_direction(mut self, direction: DirectionId) -> Self {
        self.properties.direction_id = Some(direction.into());
        self
    }

    pub fn with_position(mut self, position: Point) -> Self {
        self.position = position;
        self
    }

    pub fn is_station(&self) -> bool {
        self.kind == FeatureKind::Station
    }

    pub fn status(&self) -> VehicleStatus {
        self.properties.status
    }

    pub fn direction(&self) -> Option<DirectionId> {
        self.properties.direction()
    }

    pub fn vehicle_type(&self) -> VehicleType {
        VehicleType::resolve(self.properties.route_type(), self.category)
    }
}

impl TryFrom<&geojson::Feature> for VehicleFeature {
    type Error = TransitError;

    fn try_from(feature: &geojson::Feature) -> Result<Self> {
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| TransitError::InvalidData("feature has no geometry".into()))?;

        let position = match &geometry.value {
            Value::Point(coords) if coords.len() >= 2 => Point::new(coords[0], coords[1]),
            Value::Point(_) => {
                return Err(TransitError::InvalidData("point has fewer than 2 ordinates".into()))
            }
            _ => return Err(TransitError::InvalidData("geometry is not a point".into())),
        };

        let properties: VehicleProperties = match &feature.properties {
            Some(props) => serde_json::from_value(serde_json::Value::Object(props.clone()))?,
            None => VehicleProperties::default(),
        };

        let kind = if properties.marker_symbol.as_deref() == Some("building") {
            FeatureKind::Station
        } else {
            FeatureKind::Vehicle
        };

        let id = feature
            .id
            .as_ref()
            .map(|id| match id {
                Id::String(s) => VehicleIdentifier::new(s),
                Id::Number(n) => VehicleIdentifier::new(n.to_string()),
            })
            .or_else(|| properties.id.as_ref().and_then(json_id))
            .unwrap_or_else(|| {
                VehicleIdentifier::derived(&properties.route, position.x(), position.y())
            });

        Ok(Self {
            id,
            kind,
            position,
            route: RouteIdentifier::new(&properties.route),
            category: RouteCategory::classify(&properties.route),
            properties,
        })
    }
}

/// The id a feed entry names for itself, without parsing anything else
fn declared_id(feature: &geojson::Feature) -> Option<VehicleIdentifier> {
    match &feature.id {
        Some(Id::String(s)) => Some(VehicleIdentifier::new(s)),
        Some(Id::Number(n)) => Some(VehicleIdentifier::new(n.to_string())),
        None => feature.property("id").and_then(json_id),
    }
}

fn json_id(value: &serde_json::Value) -> Option<VehicleIdentifier> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(VehicleIdentifier::new(s)),
        serde_json::Value::Number(n) => Some(VehicleIdentifier::new(n.to_string())),
        _ => None,
    }
}

/// All features of one fetch or stream cycle
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VehicleCollection {
    pub features: Vec<VehicleFeature>,
    /// Entries dropped while parsing
    pub skipped: usize,
    /// Ids of dropped entries that named one. A consumer should treat them
    /// as still present rather than as gone.
    pub rejected: Vec<VehicleIdentifier>,
}

impl VehicleCollection {
    pub fn new(features: Vec<VehicleFeature>) -> Self {
        Self {
            features,
            skipped: 0,
            rejected: Vec::new(),
        }
    }

    /// Parse a `/vehicles` payload.
    ///
    /// Only a payload that is not GeoJSON at all is an error. A bare
    /// `Feature` is accepted as a collection of one.
    pub fn from_geojson(payload: &str) -> Result<Self> {
        let geojson: GeoJson = payload
            .parse()
            .map_err(|e: geojson::Error| TransitError::SerializationError(e.to_string()))?;

        let features = match geojson {
            GeoJson::FeatureCollection(fc) => fc.features,
            GeoJson::Feature(f) => vec![f],
            GeoJson::Geometry(_) => {
                return Err(TransitError::InvalidData(
                    "expected a FeatureCollection, got a bare geometry".into(),
                ))
            }
        };

        let mut collection = Self::default();
        for feature in &features {
            match VehicleFeature::try_from(feature) {
                Ok(vehicle) => collection.features.push(vehicle),
                Err(e) => {
                    debug!("skipping feature {:?}: {e}", feature.id);
                    collection.skipped += 1;
                    collection.rejected.extend(declared_id(feature));
                }
            }
        }

        Ok(collection)
    }

    pub fn vehicles(&self) -> impl Iterator<Item = &VehicleFeature> {
        self.features.iter().filter(|f| !f.is_station())
    }

    pub fn stations(&self) -> impl Iterator<Item = &VehicleFeature> {
        self.features.iter().filter(|f| f.is_station())
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
