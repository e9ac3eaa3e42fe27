use anyhow::{Context, Result};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use livemap_core::map::memory::InMemorySurface;
use livemap_core::marker::MarkerDescriptor;
use std::path::Path;

/// Convert one rendered marker to a GeoJSON Feature
fn marker_to_feature(marker: &MarkerDescriptor, layers: &[String], visible: bool) -> Feature {
    let mut properties = serde_json::Map::new();
    properties.insert("id".to_string(), serde_json::json!(marker.id.as_str()));
    properties.insert("kind".to_string(), serde_json::json!(format!("{:?}", marker.kind).to_lowercase()));
    properties.insert("category".to_string(), serde_json::json!(marker.category.display_name()));
    properties.insert("vehicle_type".to_string(), serde_json::json!(marker.vehicle_type.display_name()));
    properties.insert("layers".to_string(), serde_json::json!(layers));
    properties.insert("visible".to_string(), serde_json::json!(visible));
    properties.insert("title".to_string(), serde_json::json!(marker.title));
    properties.insert("marker-color".to_string(), serde_json::json!(marker.icon.color_hex()));
    properties.insert(
        "glyph".to_string(),
        serde_json::json!(format!("{:?}", marker.icon.glyph).to_lowercase()),
    );
    properties.insert("size_px".to_string(), serde_json::json!(marker.icon.size_px));
    properties.insert("z_index".to_string(), serde_json::json!(marker.z_index));
    if let Some(rotation) = marker.icon.rotation_deg {
        properties.insert("rotation".to_string(), serde_json::json!(rotation));
    }
    if let Some(label) = &marker.icon.label {
        properties.insert("label".to_string(), serde_json::json!(label));
    }

    Feature {
        bbox: None,
        geometry: Some(Geometry::new(Value::Point(vec![
            marker.position.x(),
            marker.position.y(),
        ]))),
        id: Some(geojson::feature::Id::String(marker.id.to_string())),
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Everything on the surface, ordered by marker id
pub fn surface_to_collection(surface: &InMemorySurface) -> FeatureCollection {
    let mut markers: Vec<_> = surface.markers().collect();
    markers.sort_by(|(_, a), (_, b)| a.id.cmp(&b.id));

    let features = markers
        .into_iter()
        .map(|(handle, marker)| {
            let layers = surface.layers_of(handle);
            let visible = layers.iter().any(|layer| surface.is_layer_visible(*layer));
            let names: Vec<String> = layers.iter().map(|layer| layer.as_ref().to_string()).collect();
            marker_to_feature(marker, &names, visible)
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// Write a marker snapshot to a GeoJSON file
pub fn write_snapshot_geojson(collection: FeatureCollection, output_path: &Path) -> Result<()> {
    tracing::debug!(
        "Writing {} markers to {}",
        collection.features.len(),
        output_path.display()
    );

    let geojson = GeoJson::from(collection);
    let json_string = serde_json::to_string_pretty(&geojson)
        .context("Failed to serialize GeoJSON")?;

    if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(output_path, json_string)
        .with_context(|| format!("Failed to write GeoJSON to {}", output_path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Point;
    use livemap_core::layers::LayerKey;
    use livemap_core::map::MapSurface;
    use livemap_core::marker::MarkerFactory;
    use livemap_core::transit::VehicleFeature;

    fn surface() -> InMemorySurface {
        let factory = MarkerFactory::new();
        let mut surface = InMemorySurface::new();

        let red = factory.build(&VehicleFeature::new("R-1", "Red", Point::new(-71.06, 42.35)));
        let bus = factory.build(&VehicleFeature::new("y1713", "39", Point::new(-71.1, 42.33)));
        surface.add_marker(LayerKey::Bus, &bus);
        surface.add_marker(LayerKey::Red, &red);
        surface.set_layer_visible(LayerKey::Bus, false);
        surface
    }

    #[test]
    fn test_surface_to_collection() {
        let collection = surface_to_collection(&surface());
        assert_eq!(collection.features.len(), 2);

        let red = &collection.features[0];
        assert_eq!(red.property("id").and_then(|v| v.as_str()), Some("R-1"));
        assert_eq!(red.property("visible"), Some(&serde_json::json!(true)));
        assert_eq!(red.property("layers"), Some(&serde_json::json!(["red"])));
        match &red.geometry.as_ref().unwrap().value {
            Value::Point(p) => assert_eq!(p, &vec![-71.06, 42.35]),
            other => panic!("Expected Point value, got {other:?}"),
        }

        let bus = &collection.features[1];
        assert_eq!(bus.property("id").and_then(|v| v.as_str()), Some("y1713"));
        assert_eq!(bus.property("visible"), Some(&serde_json::json!(false)));
    }

    #[test]
    fn test_write_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("markers.geojson");
        write_snapshot_geojson(surface_to_collection(&surface()), &path).unwrap();

        let written: GeoJson = std::fs::read_to_string(&path).unwrap().parse().unwrap();
        match written {
            GeoJson::FeatureCollection(fc) => assert_eq!(fc.features.len(), 2),
            _ => panic!("Expected FeatureCollection"),
        }
    }
}
