//! Layer groups: named buckets of overlays toggled together.
//!
//! Every marker lands in exactly one group, chosen from its route category
//! (stations get their own group). Route shapes share the group of their
//! line so hiding a line hides its track too.

use std::collections::{BTreeMap, HashSet};

use livemap_transit::{FeatureKind, RouteCategory, RouteIdentifier};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, IntoEnumIterator};

use crate::marker::MarkerDescriptor;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, EnumIter, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LayerKey {
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
    Stations,
}

impl From<RouteCategory> for LayerKey {
    fn from(category: RouteCategory) -> Self {
        match category {
            RouteCategory::Red => Self::Red,
            RouteCategory::Mattapan => Self::Mattapan,
            RouteCategory::Orange => Self::Orange,
            RouteCategory::Blue => Self::Blue,
            RouteCategory::Green => Self::Green,
            RouteCategory::Silver => Self::Silver,
            RouteCategory::CommuterRail => Self::CommuterRail,
            RouteCategory::Bus => Self::Bus,
            RouteCategory::Ferry => Self::Ferry,
            RouteCategory::InterCity => Self::InterCity,
        }
    }
}

/// Assigns markers and shapes to layer groups
#[derive(Clone, Debug)]
pub struct LayerGroupRouter {
    clustered: HashSet<LayerKey>,
}

impl Default for LayerGroupRouter {
    fn default() -> Self {
        Self {
            clustered: HashSet::from([LayerKey::Bus, LayerKey::Stations]),
        }
    }
}

impl LayerGroupRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clustered(clustered: impl IntoIterator<Item = LayerKey>) -> Self {
        Self {
            clustered: clustered.into_iter().collect(),
        }
    }

    pub fn route(&self, marker: &MarkerDescriptor) -> LayerKey {
        match marker.kind {
            FeatureKind::Station => LayerKey::Stations,
            FeatureKind::Vehicle => marker.category.into(),
        }
    }

    pub fn route_shape(&self, route: &RouteIdentifier) -> LayerKey {
        RouteCategory::classify(route.as_str()).into()
    }

    pub fn is_clustered(&self, layer: LayerKey) -> bool {
        self.clustered.contains(&layer)
    }
}

/// Per-layer on/off flags. Layers not mentioned are visible.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayerVisibility(BTreeMap<LayerKey, bool>);

impl LayerVisibility {
    pub fn is_visible(&self, layer: LayerKey) -> bool {
        self.0.get(&layer).copied().unwrap_or(true)
    }

    pub fn set(&mut self, layer: LayerKey, visible: bool) {
        self.0.insert(layer, visible);
    }

    pub fn hidden(&self) -> impl Iterator<Item = LayerKey> + '_ {
        LayerKey::iter().filter(|layer| !self.is_visible(*layer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marker::MarkerFactory;
    use geo::Point;
    use livemap_transit::VehicleFeature;

    #[test]
    fn test_route_markers() {
        let router = LayerGroupRouter::new();
        let factory = MarkerFactory::new();

        let bus = factory.build(&VehicleFeature::new("1", "39", Point::new(-71.1, 42.3)));
        assert_eq!(router.route(&bus), LayerKey::Bus);
        assert!(router.is_clustered(LayerKey::Bus));

        let train = factory.build(&VehicleFeature::new("2", "CR-Haverhill", Point::new(-71.1, 42.4)));
        assert_eq!(router.route(&train), LayerKey::CommuterRail);
        assert!(!router.is_clustered(LayerKey::CommuterRail));

        let mut station = VehicleFeature::new("place-sstat", "Red", Point::new(-71.055, 42.352));
        station.kind = FeatureKind::Station;
        assert_eq!(router.route(&factory.build(&station)), LayerKey::Stations);
    }

    #[test]
    fn test_route_shapes() {
        let router = LayerGroupRouter::new();
        assert_eq!(router.route_shape(&RouteIdentifier::new("Green-D")), LayerKey::Green);
    }

    #[test]
    fn test_visibility_round_trip() {
        let mut visibility = LayerVisibility::default();
        assert!(visibility.is_visible(LayerKey::Ferry));

        visibility.set(LayerKey::Ferry, false);
        visibility.set(LayerKey::Bus, true);

        let json = serde_json::to_string(&visibility).unwrap();
        assert_eq!(json, r#"{"bus":true,"ferry":false}"#);

        let restored: LayerVisibility = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.hidden().collect::<Vec<_>>(), vec![LayerKey::Ferry]);
        assert_eq!(LayerKey::CommuterRail.as_ref(), "commuter_rail");
    }
}
