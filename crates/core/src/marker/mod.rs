//! Marker factory: turns a vehicle feature into a map marker description.
//!
//! A [`MarkerDescriptor`] is everything a map backend needs to draw one
//! marker. It is rebuilt from the feature on every refresh; the popup is not
//! part of it (see [`popup`]), because popup content depends on session
//! toggles and is computed when the popup opens.

pub mod popup;

use geo::Point;
use livemap_transit::{
    FeatureKind, RouteCategory, VehicleFeature, VehicleIdentifier, VehicleStatus, VehicleType,
};
use palette::Srgb;

use crate::counter::CountKey;

pub use popup::{PopupContent, PopupOptions, SpeedUnit, render_popup};

/// Markers are keyed by the id of the feature they draw
pub type MarkerId = VehicleIdentifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IconGlyph {
    Station,
    Train,
    Tram,
    Bus,
    Ferry,
    /// Moving vehicle with a known heading
    Arrow,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IconDescriptor {
    pub glyph: IconGlyph,
    pub color: Srgb<u8>,
    pub size_px: u16,
    /// Degrees clockwise from north, for arrows
    pub rotation_deg: Option<f64>,
    pub label: Option<String>,
}

impl IconDescriptor {
    pub fn color_hex(&self) -> String {
        format!(
            "#{:02X}{:02X}{:02X}",
            self.color.red, self.color.green, self.color.blue
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MarkerDescriptor {
    pub id: MarkerId,
    pub kind: FeatureKind,
    pub position: Point,
    pub icon: IconDescriptor,
    pub category: RouteCategory,
    pub vehicle_type: VehicleType,
    pub z_index: i32,
    /// Hover text
    pub title: String,
}

impl MarkerDescriptor {
    /// Bucket this marker counts toward. Stations are not counted.
    pub fn count_key(&self) -> Option<CountKey> {
        match self.kind {
            FeatureKind::Station => None,
            FeatureKind::Vehicle => Some(CountKey::new(self.category, self.vehicle_type)),
        }
    }
}

/// Builds marker descriptors with a fixed icon sizing
#[derive(Clone, Debug)]
pub struct MarkerFactory {
    pub vehicle_size_px: u16,
    pub station_size_px: u16,
}

impl Default for MarkerFactory {
    fn default() -> Self {
        Self {
            vehicle_size_px: 24,
            station_size_px: 14,
        }
    }
}

impl MarkerFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(&self, feature: &VehicleFeature) -> MarkerDescriptor {
        let category = feature.category;
        let vehicle_type = feature.vehicle_type();
        let props = &feature.properties;

        let (glyph, rotation_deg) = match feature.kind {
            FeatureKind::Station => (IconGlyph::Station, None),
            FeatureKind::Vehicle => match props.bearing {
                Some(bearing)
                    if bearing.is_finite() && feature.status() != VehicleStatus::StoppedAt =>
                {
                    (IconGlyph::Arrow, Some(bearing.rem_euclid(360.0)))
                }
                _ => (glyph_for(vehicle_type), None),
            },
        };

        let size_px = match feature.kind {
            FeatureKind::Station => self.station_size_px,
            FeatureKind::Vehicle => self.vehicle_size_px,
        };

        // Bus icons carry the route number; rail icons are identified by color
        let label = match (feature.kind, category) {
            (FeatureKind::Vehicle, RouteCategory::Bus | RouteCategory::Silver) => {
                Some(feature.route.to_string())
            }
            _ => None,
        };

        MarkerDescriptor {
            id: feature.id.clone(),
            kind: feature.kind,
            position: feature.position,
            icon: IconDescriptor {
                glyph,
                color: category_color(category),
                size_px,
                rotation_deg,
                label,
            },
            category,
            vehicle_type,
            z_index: z_index(feature.kind, vehicle_type),
            title: title(feature),
        }
    }
}

fn glyph_for(vehicle_type: VehicleType) -> IconGlyph {
    match vehicle_type {
        VehicleType::LightRail => IconGlyph::Tram,
        VehicleType::HeavyRail | VehicleType::CommuterRail | VehicleType::InterCity => {
            IconGlyph::Train
        }
        VehicleType::Bus => IconGlyph::Bus,
        VehicleType::Ferry => IconGlyph::Ferry,
    }
}

fn z_index(kind: FeatureKind, vehicle_type: VehicleType) -> i32 {
    match (kind, vehicle_type) {
        (FeatureKind::Station, _) => 0,
        (_, VehicleType::Bus) => 100,
        (_, VehicleType::Ferry) => 150,
        (_, VehicleType::LightRail | VehicleType::HeavyRail) => 200,
        (_, VehicleType::CommuterRail | VehicleType::InterCity) => 250,
    }
}

/// Line color for a category
pub fn category_color(category: RouteCategory) -> Srgb<u8> {
    // The category table only holds valid hex, so the fallback is unreachable
    category
        .color_hex()
        .parse::<Srgb<u8>>()
        .unwrap_or(Srgb::new(0x80, 0x80, 0x80))
}

fn title(feature: &VehicleFeature) -> String {
    let props = &feature.properties;
    match feature.kind {
        FeatureKind::Station => props
            .stop
            .clone()
            .or_else(|| props.label.clone())
            .unwrap_or_else(|| feature.id.to_string()),
        FeatureKind::Vehicle => match (&props.label, &props.headsign) {
            (Some(label), Some(headsign)) => format!("{label} to {headsign}"),
            (None, Some(headsign)) => format!("{} to {headsign}", feature.category),
            (Some(label), None) => label.clone(),
            (None, None) => format!("{} {}", feature.category, feature.route),
        },
    }
}
