//! Type-safe, efficient identifiers for transit entities.
//!
//! All identifiers use Arc<str> for cheap cloning and minimal memory overhead.
//! They serialize as plain strings.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

macro_rules! impl_identifier {
    ($name:ident) => {
        #[derive(Clone, Debug)]
        pub struct $name(Arc<str>);

        impl $name {
            pub fn new(s: impl AsRef<str>) -> Self {
                Self(s.as_ref().into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.0.hash(state);
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.0.cmp(&other.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self::new(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.0)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Ok(Self::new(s))
            }
        }
    };
}

impl_identifier!(VehicleIdentifier);
impl_identifier!(RouteIdentifier);
impl_identifier!(StopIdentifier);
impl_identifier!(ShapeIdentifier);
impl_identifier!(AlertIdentifier);

impl VehicleIdentifier {
    /// Identifier for a feed entry that carries no id of its own.
    ///
    /// Built from the route and the rounded position, so it changes whenever
    /// the vehicle moves. Such vehicles churn (remove + add) across refreshes.
    pub fn derived(route: &str, lon: f64, lat: f64) -> Self {
        Self::new(format!("{route}:{lon:.5},{lat:.5}"))
    }
}

impl RouteIdentifier {
    /// Whether this identifier is empty (payload omitted the route)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_equality() {
        let id1 = VehicleIdentifier::new("y1234");
        let id2 = VehicleIdentifier::new("y1234");
        let id3 = id1.clone();

        assert_eq!(id1, id2);
        assert_eq!(id1, id3);
        assert!(Arc::ptr_eq(&id1.0, &id3.0)); // Clone shares Arc
    }

    #[test]
    fn test_identifier_hash() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(StopIdentifier::new("place-pktrm"), 42);

        assert_eq!(map.get(&StopIdentifier::new("place-pktrm")), Some(&42));
    }

    #[test]
    fn test_identifier_display() {
        let id = RouteIdentifier::new("Red");
        assert_eq!(format!("{}", id), "Red");
    }

    #[test]
    fn test_identifier_serde() {
        let id: ShapeIdentifier = serde_json::from_str("\"canonical-931_0009\"").unwrap();
        assert_eq!(id.as_str(), "canonical-931_0009");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"canonical-931_0009\"");
    }

    #[test]
    fn test_derived_vehicle_id_tracks_position() {
        let a = VehicleIdentifier::derived("77", -71.12345, 42.39876);
        let b = VehicleIdentifier::derived("77", -71.12345, 42.39876);
        let moved = VehicleIdentifier::derived("77", -71.12400, 42.39876);

        assert_eq!(a, b);
        assert_ne!(a, moved);
        assert_eq!(a.as_str(), "77:-71.12345,42.39876");
    }
}
