//! Optional third-party overlay geometry.
//!
//! An open-data GeoJSON source is fetched off the render path, trimmed to a
//! bounding box, cleaned of bad coordinates and cached on disk for a day.
//! Users who opt out of third-party data never trigger a request.

use std::path::PathBuf;
use std::time::Duration;

use geo::Coord;
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use livemap_transit::spatial::is_valid_coordinate;
use livemap_transit::TransitError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{LiveMapError, Result};
use crate::live::DiskCache;

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
pub const CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const MAX_CACHED_BYTES: usize = 2 * 1024 * 1024;

const CACHE_KEY: &str = "aux-geometry";

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    /// Greater Boston, out to the commuter rail termini
    pub const BOSTON: Self = Self {
        min_lon: -71.9,
        min_lat: 41.6,
        max_lon: -70.5,
        max_lat: 42.9,
    };

    pub fn contains(&self, coord: Coord) -> bool {
        (self.min_lon..=self.max_lon).contains(&coord.x)
            && (self.min_lat..=self.max_lat).contains(&coord.y)
    }
}

fn to_coord(position: &[f64]) -> Option<Coord> {
    match position {
        [x, y, ..] => Some(Coord { x: *x, y: *y }),
        _ => None,
    }
}

fn keep_position(position: &[f64]) -> bool {
    to_coord(position).is_some_and(is_valid_coordinate)
}

fn clean_positions(positions: Vec<Vec<f64>>, min_len: usize) -> Option<Vec<Vec<f64>>> {
    let cleaned: Vec<Vec<f64>> = positions.into_iter().filter(|p| keep_position(p)).collect();
    (cleaned.len() >= min_len).then_some(cleaned)
}

fn clean_polygon(rings: Vec<Vec<Vec<f64>>>) -> Option<Vec<Vec<Vec<f64>>>> {
    let rings: Vec<_> = rings
        .into_iter()
        .filter_map(|ring| clean_positions(ring, 4))
        .collect();
    (!rings.is_empty()).then_some(rings)
}

/// Drop bad coordinates. `None` when nothing usable is left.
fn clean_value(value: Value) -> Option<Value> {
    match value {
        Value::Point(p) => keep_position(&p).then_some(Value::Point(p)),
        Value::MultiPoint(points) => clean_positions(points, 1).map(Value::MultiPoint),
        Value::LineString(line) => clean_positions(line, 2).map(Value::LineString),
        Value::MultiLineString(lines) => {
            let lines: Vec<_> = lines
                .into_iter()
                .filter_map(|line| clean_positions(line, 2))
                .collect();
            (!lines.is_empty()).then_some(Value::MultiLineString(lines))
        }
        Value::Polygon(rings) => clean_polygon(rings).map(Value::Polygon),
        Value::MultiPolygon(polygons) => {
            let polygons: Vec<_> = polygons.into_iter().filter_map(clean_polygon).collect();
            (!polygons.is_empty()).then_some(Value::MultiPolygon(polygons))
        }
        Value::GeometryCollection(_) => None,
    }
}

fn any_position(value: &Value, mut f: impl FnMut(&[f64]) -> bool) -> bool {
    match value {
        Value::Point(p) => f(p.as_slice()),
        Value::MultiPoint(ps) | Value::LineString(ps) => ps.iter().any(|p| f(p.as_slice())),
        Value::MultiLineString(lines) | Value::Polygon(lines) => {
            lines.iter().flatten().any(|p| f(p.as_slice()))
        }
        Value::MultiPolygon(polygons) => polygons
            .iter()
            .flatten()
            .flatten()
            .any(|p| f(p.as_slice())),
        Value::GeometryCollection(_) => false,
    }
}

/// Keep features that have usable geometry touching `bbox`. Returns the
/// kept collection and the number of features dropped.
pub fn sanitize(collection: FeatureCollection, bbox: &BoundingBox) -> (FeatureCollection, usize) {
    let total = collection.features.len();
    let features: Vec<Feature> = collection
        .features
        .into_iter()
        .filter_map(|mut feature| {
            let geometry = feature.geometry.take()?;
            let value = clean_value(geometry.value)?;
            let inside = any_position(&value, |p| to_coord(p).is_some_and(|c| bbox.contains(c)));
            if !inside {
                return None;
            }
            feature.geometry = Some(Geometry::new(value));
            Some(feature)
        })
        .collect();

    let dropped = total - features.len();
    (
        FeatureCollection {
            bbox: None,
            features,
            foreign_members: None,
        },
        dropped,
    )
}

pub struct AuxGeometryLoader {
    url: String,
    bbox: BoundingBox,
    cache: DiskCache,
    client: reqwest::Client,
}

impl AuxGeometryLoader {
    pub fn new(url: impl Into<String>, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            bbox: BoundingBox::BOSTON,
            cache: DiskCache::new(cache_dir, CACHE_TTL, MAX_CACHED_BYTES),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_bbox(mut self, bbox: BoundingBox) -> Self {
        self.bbox = bbox;
        self
    }

    /// Cached copy, if one is still fresh
    pub fn cached(&self) -> Option<FeatureCollection> {
        self.cache.get(CACHE_KEY)
    }

    /// Load the overlay. `Ok(None)` when the user opted out.
    pub async fn load(&self, opt_out: bool) -> Result<Option<FeatureCollection>> {
        if opt_out {
            debug!("third-party data opted out, skipping {}", self.url);
            return Ok(None);
        }

        if let Some(cached) = self.cached() {
            debug!("auxiliary geometry served from cache");
            return Ok(Some(cached));
        }

        let body = self.fetch().await?;
        let collection = match body.parse::<GeoJson>() {
            Ok(GeoJson::FeatureCollection(fc)) => fc,
            Ok(_) => {
                return Err(TransitError::InvalidData(format!(
                    "{} is not a FeatureCollection",
                    self.url
                ))
                .into())
            }
            Err(e) => {
                return Err(TransitError::SerializationError(format!("{}: {e}", self.url)).into())
            }
        };

        let (collection, dropped) = sanitize(collection, &self.bbox);
        info!(
            "auxiliary geometry: kept {} features, dropped {dropped}",
            collection.features.len()
        );

        if let Err(e) = self.cache.put(CACHE_KEY, &collection) {
            warn!("not caching auxiliary geometry: {e}");
        }
        Ok(Some(collection))
    }

    async fn fetch(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.url)
            .timeout(FETCH_TIMEOUT)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(LiveMapError::Status {
                status: response.status().as_u16(),
                url: self.url.clone(),
            });
        }
        Ok(response.text().await?)
    }

    /// Load on a background task. Failures are logged and yield `None`.
    pub fn spawn(self, opt_out: bool) -> JoinHandle<Option<FeatureCollection>> {
        tokio::spawn(async move {
            match self.load(opt_out).await {
                Ok(collection) => collection,
                Err(e) => {
                    warn!("auxiliary geometry unavailable: {e}");
                    None
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "inside"},
             "geometry": {"type": "Point", "coordinates": [-71.06, 42.36]}},
            {"type": "Feature", "properties": {"name": "outside"},
             "geometry": {"type": "Point", "coordinates": [-73.99, 40.73]}},
            {"type": "Feature", "properties": {"name": "broken"},
             "geometry": {"type": "Point", "coordinates": [-71.06, 142.0]}},
            {"type": "Feature", "properties": {"name": "path"},
             "geometry": {"type": "LineString",
                          "coordinates": [[-71.1, 42.3], [500.0, 42.3], [-71.0, 42.4]]}},
            {"type": "Feature", "properties": {"name": "stub"},
             "geometry": {"type": "LineString", "coordinates": [[-71.1, 42.3], [-999.0, 0.0]]}},
            {"type": "Feature", "properties": {"name": "empty"}, "geometry": null}
        ]
    }"#;

    fn source() -> FeatureCollection {
        match SOURCE.parse::<GeoJson>().unwrap() {
            GeoJson::FeatureCollection(fc) => fc,
            _ => unreachable!(),
        }
    }

    fn names(collection: &FeatureCollection) -> Vec<String> {
        collection
            .features
            .iter()
            .filter_map(|f| f.property("name").and_then(|v| v.as_str()).map(str::to_owned))
            .collect()
    }

    #[test]
    fn test_sanitize() {
        let (kept, dropped) = sanitize(source(), &BoundingBox::BOSTON);
        assert_eq!(names(&kept), vec!["inside", "path"]);
        assert_eq!(dropped, 4);

        let path = kept.features[1].geometry.as_ref().unwrap();
        match &path.value {
            Value::LineString(line) => assert_eq!(line.len(), 2),
            other => panic!("unexpected geometry {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_opt_out_skips_everything() {
        let dir = tempfile::tempdir().unwrap();
        // Unroutable: a request would fail the test
        let loader = AuxGeometryLoader::new("http://127.0.0.1:9/none.geojson", dir.path());
        assert_eq!(loader.load(true).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cached_copy_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let loader = AuxGeometryLoader::new("http://127.0.0.1:9/none.geojson", dir.path());

        let (kept, _) = sanitize(source(), &BoundingBox::BOSTON);
        loader.cache.put(CACHE_KEY, &kept).unwrap();

        let loaded = loader.load(false).await.unwrap().unwrap();
        assert_eq!(names(&loaded), vec!["inside", "path"]);
    }

    #[test]
    fn test_bbox() {
        assert!(BoundingBox::BOSTON.contains(Coord { x: -71.06, y: 42.36 }));
        assert!(!BoundingBox::BOSTON.contains(Coord { x: -71.06, y: 40.0 }));
    }
}
