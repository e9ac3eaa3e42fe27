//! Core data types and enums for transit data.

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Enums
// ============================================================================

/// GTFS route types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RouteType {
    Tram = 0,
    Subway = 1,
    Rail = 2,
    Bus = 3,
    Ferry = 4,
    CableTram = 5,
    AerialLift = 6,
    Funicular = 7,
}

impl RouteType {
    pub fn from_gtfs(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Tram),
            1 => Some(Self::Subway),
            2 => Some(Self::Rail),
            3 => Some(Self::Bus),
            4 => Some(Self::Ferry),
            5 => Some(Self::CableTram),
            6 => Some(Self::AerialLift),
            7 => Some(Self::Funicular),
            _ => None,
        }
    }
}

/// Trip direction (0 = outbound, 1 = inbound per GTFS)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum DirectionId {
    Outbound = 0,
    Inbound = 1,
}

impl TryFrom<u8> for DirectionId {
    type Error = TransitError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Outbound),
            1 => Ok(Self::Inbound),
            other => Err(TransitError::InvalidData(format!(
                "direction_id must be 0 or 1, got {other}"
            ))),
        }
    }
}

impl From<DirectionId> for u8 {
    fn from(value: DirectionId) -> Self {
        value as u8
    }
}

/// Line category a route belongs to.
///
/// Every consumer that needs to know "what kind of line is this" (icon,
/// layer group, count bucket, snap threshold) goes through
/// [`RouteCategory::classify`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteCategory {
    Red,
    Mattapan,
    Orange,
    Blue,
    Green,
    Silver,
    CommuterRail,
    Bus,
    Ferry,
    InterCity,
}

const SILVER_LINE_ROUTES: [&str; 6] = ["741", "742", "743", "746", "749", "751"];

impl RouteCategory {
    pub const ALL: [RouteCategory; 10] = [
        Self::Red,
        Self::Mattapan,
        Self::Orange,
        Self::Blue,
        Self::Green,
        Self::Silver,
        Self::CommuterRail,
        Self::Bus,
        Self::Ferry,
        Self::InterCity,
    ];

    /// Classify a route identifier into its line category.
    pub fn classify(route: &str) -> Self {
        let lower = route.to_ascii_lowercase();

        if lower.starts_with("amtrak") || lower.starts_with("acela") {
            Self::InterCity
        } else if route.starts_with("CR-") {
            Self::CommuterRail
        } else if route.starts_with("Boat-") {
            Self::Ferry
        } else if route.starts_with("Green") {
            Self::Green
        } else if route == "Red" || route.starts_with("Red-") {
            Self::Red
        } else if route.starts_with("Mattapan") {
            Self::Mattapan
        } else if route == "Orange" || route.starts_with("Orange-") {
            Self::Orange
        } else if route == "Blue" || route.starts_with("Blue-") {
            Self::Blue
        } else if SILVER_LINE_ROUTES.contains(&route) || route.starts_with("SL") {
            Self::Silver
        } else {
            Self::Bus
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Red => "Red Line",
            Self::Mattapan => "Mattapan Trolley",
            Self::Orange => "Orange Line",
            Self::Blue => "Blue Line",
            Self::Green => "Green Line",
            Self::Silver => "Silver Line",
            Self::CommuterRail => "Commuter Rail",
            Self::Bus => "Bus",
            Self::Ferry => "Ferry",
            Self::InterCity => "Amtrak",
        }
    }

    /// Canonical line color as RGB hex (no leading `#`)
    pub fn color_hex(&self) -> &'static str {
        match self {
            Self::Red | Self::Mattapan => "DA291C",
            Self::Orange => "ED8B00",
            Self::Blue => "003DA5",
            Self::Green => "00843D",
            Self::Silver => "7C878E",
            Self::CommuterRail => "80276C",
            Self::Bus => "FFC72C",
            Self::Ferry => "008EAA",
            Self::InterCity => "18498C",
        }
    }

    /// Snap thresholds for this category, or `None` when the category has no
    /// reliable shape data and must never be snapped.
    pub fn snap_class(&self) -> Option<SnapClass> {
        match self {
            Self::Red | Self::Mattapan | Self::Orange | Self::Blue | Self::Green => {
                Some(SnapClass::RapidTransit)
            }
            Self::CommuterRail => Some(SnapClass::CommuterRail),
            Self::Silver | Self::Bus | Self::Ferry => Some(SnapClass::Surface),
            Self::InterCity => None,
        }
    }

    /// Rail lines whose shape list holds both directions, outbound first.
    pub fn is_bidirectional_rail(&self) -> bool {
        matches!(
            self,
            Self::Red | Self::Mattapan | Self::Orange | Self::Blue | Self::Green | Self::CommuterRail
        )
    }

    /// Vehicle type implied by the category alone
    pub fn default_vehicle_type(&self) -> VehicleType {
        match self {
            Self::Red | Self::Orange | Self::Blue => VehicleType::HeavyRail,
            Self::Green | Self::Mattapan => VehicleType::LightRail,
            Self::Silver | Self::Bus => VehicleType::Bus,
            Self::CommuterRail => VehicleType::CommuterRail,
            Self::Ferry => VehicleType::Ferry,
            Self::InterCity => VehicleType::InterCity,
        }
    }
}

impl fmt::Display for RouteCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Snapping tolerance classes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SnapClass {
    /// Light and heavy rail
    RapidTransit,
    CommuterRail,
    /// Buses and everything else on the street grid
    Surface,
}

impl SnapClass {
    pub fn threshold_meters(&self) -> f64 {
        match self {
            Self::RapidTransit => 50.0,
            Self::CommuterRail => 75.0,
            Self::Surface => 25.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    LightRail,
    HeavyRail,
    CommuterRail,
    Bus,
    Ferry,
    InterCity,
}

impl VehicleType {
    /// Vehicle type from an explicit GTFS route type, falling back to the
    /// category when the payload has none.
    pub fn resolve(route_type: Option<RouteType>, category: RouteCategory) -> Self {
        match route_type {
            Some(RouteType::Tram | RouteType::CableTram) => Self::LightRail,
            Some(RouteType::Subway) => Self::HeavyRail,
            Some(RouteType::Rail) if category == RouteCategory::InterCity => Self::InterCity,
            Some(RouteType::Rail) => Self::CommuterRail,
            Some(RouteType::Bus) => Self::Bus,
            Some(RouteType::Ferry) => Self::Ferry,
            Some(RouteType::AerialLift | RouteType::Funicular) | None => {
                category.default_vehicle_type()
            }
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::LightRail => "Light Rail",
            Self::HeavyRail => "Heavy Rail",
            Self::CommuterRail => "Commuter Rail",
            Self::Bus => "Bus",
            Self::Ferry => "Ferry",
            Self::InterCity => "Intercity Rail",
        }
    }
}

/// Where a vehicle is relative to its next stop
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VehicleStatus {
    #[default]
    InTransitTo,
    IncomingAt,
    StoppedAt,
}

impl VehicleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InTransitTo => "IN_TRANSIT_TO",
            Self::IncomingAt => "INCOMING_AT",
            Self::StoppedAt => "STOPPED_AT",
        }
    }
}

impl From<String> for VehicleStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "INCOMING_AT" => Self::IncomingAt,
            "STOPPED_AT" => Self::StoppedAt,
            _ => Self::InTransitTo,
        }
    }
}

impl From<VehicleStatus> for String {
    fn from(value: VehicleStatus) -> Self {
        value.as_str().to_owned()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum TransitError {
    #[error("Invalid coordinate: ({lon}, {lat})")]
    InvalidCoordinate { lon: f64, lat: f64 },

    #[error("Shape not found for route: {0}")]
    ShapeNotFound(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for TransitError {
    fn from(e: serde_json::Error) -> Self {
        Self::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TransitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_type_from_gtfs() {
        assert_eq!(RouteType::from_gtfs(1), Some(RouteType::Subway));
        assert_eq!(RouteType::from_gtfs(3), Some(RouteType::Bus));
        assert_eq!(RouteType::from_gtfs(99), None);
    }

    #[test]
    fn test_classify_routes() {
        assert_eq!(RouteCategory::classify("Red"), RouteCategory::Red);
        assert_eq!(RouteCategory::classify("Mattapan"), RouteCategory::Mattapan);
        assert_eq!(RouteCategory::classify("Green-E"), RouteCategory::Green);
        assert_eq!(RouteCategory::classify("CR-Worcester"), RouteCategory::CommuterRail);
        assert_eq!(RouteCategory::classify("Boat-F1"), RouteCategory::Ferry);
        assert_eq!(RouteCategory::classify("742"), RouteCategory::Silver);
        assert_eq!(RouteCategory::classify("Amtrak-Downeaster"), RouteCategory::InterCity);
        assert_eq!(RouteCategory::classify("39"), RouteCategory::Bus);
        assert_eq!(RouteCategory::classify("Redline Shuttle"), RouteCategory::Bus);
    }

    #[test]
    fn test_snap_class_thresholds() {
        assert_eq!(
            RouteCategory::Red.snap_class().map(|c| c.threshold_meters()),
            Some(50.0)
        );
        assert_eq!(
            RouteCategory::CommuterRail.snap_class().map(|c| c.threshold_meters()),
            Some(75.0)
        );
        assert_eq!(
            RouteCategory::Bus.snap_class().map(|c| c.threshold_meters()),
            Some(25.0)
        );
        assert_eq!(RouteCategory::InterCity.snap_class(), None);
    }

    #[test]
    fn test_vehicle_type_resolution() {
        assert_eq!(
            VehicleType::resolve(None, RouteCategory::Green),
            VehicleType::LightRail
        );
        assert_eq!(
            VehicleType::resolve(Some(RouteType::Bus), RouteCategory::Red),
            VehicleType::Bus
        );
        assert_eq!(
            VehicleType::resolve(Some(RouteType::Rail), RouteCategory::InterCity),
            VehicleType::InterCity
        );
    }

    #[test]
    fn test_vehicle_status_serde() {
        let status: VehicleStatus = serde_json::from_str("\"STOPPED_AT\"").unwrap();
        assert_eq!(status, VehicleStatus::StoppedAt);

        let unknown: VehicleStatus = serde_json::from_str("\"SOMETHING_ELSE\"").unwrap();
        assert_eq!(unknown, VehicleStatus::InTransitTo);

        assert_eq!(
            serde_json::to_string(&VehicleStatus::IncomingAt).unwrap(),
            "\"INCOMING_AT\""
        );
    }

    #[test]
    fn test_direction_id_serde() {
        let dir: DirectionId = serde_json::from_str("1").unwrap();
        assert_eq!(dir, DirectionId::Inbound);
        assert!(serde_json::from_str::<DirectionId>("7").is_err());
    }
}
