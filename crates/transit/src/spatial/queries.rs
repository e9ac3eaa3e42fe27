//! Spatial query utilities for distance calculations.
//!
//! Uses Haversine formula for accurate distances on Earth's surface.
//! Distances along a polyline are summed per segment, and positions
//! within a segment are located and interpolated linearly in degrees.

use geo::{
    Closest, Coord, HaversineClosestPoint, HaversineDistance, HaversineLength, Line,
    LineInterpolatePoint, LineLocatePoint, LineString, Point,
};

/// Calculate Haversine distance between two points in meters
pub fn haversine_distance(p1: Point, p2: Point) -> f64 {
    p1.haversine_distance(&p2)
}

/// Finite, latitude within [-90, 90], longitude within [-180, 180]
pub fn is_valid_coordinate(coord: Coord) -> bool {
    coord.x.is_finite()
        && coord.y.is_finite()
        && (-90.0..=90.0).contains(&coord.y)
        && (-180.0..=180.0).contains(&coord.x)
}

pub fn is_valid_point(point: Point) -> bool {
    is_valid_coordinate(point.0)
}

/// Drop invalid coordinates. Returns `None` if fewer than 2 remain.
pub fn clean_line(line: &LineString) -> Option<LineString> {
    let coords: Vec<Coord> = line
        .coords()
        .copied()
        .filter(|c| is_valid_coordinate(*c))
        .collect();

    (coords.len() >= 2).then(|| LineString::new(coords))
}

/// Drop consecutive near-duplicate points, then downsample with a uniform
/// stride so that at most `max_points` remain. The first and last points
/// always survive.
pub fn simplify_line(line: &LineString, tolerance_deg: f64, max_points: usize) -> LineString {
    let mut deduped: Vec<Coord> = Vec::with_capacity(line.0.len());
    for coord in line.coords() {
        match deduped.last() {
            Some(last)
                if (coord.x - last.x).abs() < tolerance_deg
                    && (coord.y - last.y).abs() < tolerance_deg => {}
            _ => deduped.push(*coord),
        }
    }

    let n = deduped.len();
    let max_points = max_points.max(2);
    if n <= max_points {
        return LineString::new(deduped);
    }

    let stride = (n - 1).div_ceil(max_points - 1);
    let mut sampled: Vec<Coord> = deduped.iter().step_by(stride).copied().collect();
    if (n - 1) % stride != 0 {
        sampled.push(deduped[n - 1]);
    }

    LineString::new(sampled)
}

/// Where a point projects onto a polyline
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineProjection {
    /// Nearest point on the line
    pub point: Point,
    /// Haversine distance from the query point to `point`, in meters
    pub distance_m: f64,
    /// Index of the segment holding `point`
    pub segment: usize,
    /// Meters along the line from its first coordinate to `point`
    pub along_m: f64,
}

/// Project `point` onto `line`, returning the nearest point on it.
///
/// Each segment is searched with the great-circle closest point; the
/// fraction along the winning segment comes from [`LineLocatePoint`].
/// Returns `None` for lines with fewer than 2 coordinates.
pub fn project_onto_line(point: Point, line: &LineString) -> Option<LineProjection> {
    if line.0.len() < 2 {
        return None;
    }

    let mut best: Option<(usize, Point, f64)> = None;

    for (index, segment) in line.lines().enumerate() {
        let closest = match segment.haversine_closest_point(&point) {
            Closest::Intersection(p) | Closest::SinglePoint(p) => p,
            Closest::Indeterminate => continue,
        };
        let distance = haversine_distance(point, closest);
        if !distance.is_finite() {
            continue;
        }

        if best.is_none_or(|(_, _, best_distance)| distance < best_distance) {
            best = Some((index, closest, distance));
        }
    }

    let (segment, closest, distance_m) = best?;
    let lines: Vec<Line> = line.lines().collect();
    let fraction = lines[segment]
        .line_locate_point(&closest)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);

    let along_m = LineString::new(line.0[..=segment].to_vec()).haversine_length()
        + fraction * lines[segment].haversine_length();

    Some(LineProjection {
        point: closest,
        distance_m,
        segment,
        along_m,
    })
}

/// Nearest point on `line` and its distance in meters
pub fn nearest_point_on_line(point: Point, line: &LineString) -> Option<(Point, f64)> {
    project_onto_line(point, line).map(|p| (p.point, p.distance_m))
}

/// Total Haversine length of a polyline in meters
pub fn line_length(line: &LineString) -> f64 {
    line.haversine_length()
}

/// Point `meters` along the line from its start, clamped to `[0, length]`.
pub fn point_along(line: &LineString, meters: f64) -> Option<Point> {
    let first = *line.0.first()?;
    if meters <= 0.0 || line.0.len() < 2 {
        return Some(first.into());
    }

    let mut remaining = meters;
    for segment in line.lines() {
        let length = segment.haversine_length();
        if remaining <= length {
            let t = if length == 0.0 { 0.0 } else { remaining / length };
            return segment.line_interpolate_point(t);
        }
        remaining -= length;
    }

    line.0.last().map(|c| (*c).into())
}

/// Move a projected point `meters` further along the line, clamped to the
/// line's end. Returns the new point and the distance actually moved.
pub fn offset_along(line: &LineString, from: &LineProjection, meters: f64) -> Option<(Point, f64)> {
    let total = line_length(line);
    let target = (from.along_m + meters).clamp(0.0, total);
    let point = point_along(line, target)?;
    Some((point, target - from.along_m))
}

/// Convert meters to degrees at equator (for bounding box queries)
pub fn meters_to_degrees_approx(meters: f64) -> f64 {
    meters / 111_320.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn north_south_line() -> LineString {
        LineString::from(vec![(-71.06, 42.30), (-71.06, 42.35), (-71.06, 42.40)])
    }

    #[test]
    fn test_haversine_distance() {
        // Distance from NYC to LA is approximately 3,936 km
        let nyc = Point::new(-74.0060, 40.7128);
        let la = Point::new(-118.2437, 34.0522);

        let dist = haversine_distance(nyc, la);
        assert!((dist - 3_936_000.0).abs() < 50_000.0); // Within 50km
    }

    #[test]
    fn test_coordinate_validation() {
        assert!(is_valid_coordinate(Coord { x: -71.0, y: 42.0 }));
        assert!(is_valid_coordinate(Coord { x: 180.0, y: -90.0 }));
        assert!(!is_valid_coordinate(Coord { x: -181.0, y: 42.0 }));
        assert!(!is_valid_coordinate(Coord { x: -71.0, y: 91.0 }));
        assert!(!is_valid_coordinate(Coord { x: f64::NAN, y: 42.0 }));
        assert!(!is_valid_coordinate(Coord { x: -71.0, y: f64::INFINITY }));
    }

    #[test]
    fn test_clean_line() {
        let line = LineString::from(vec![(-71.0, 42.0), (f64::NAN, 42.1), (-71.0, 95.0), (-71.0, 42.2)]);
        let cleaned = clean_line(&line).unwrap();
        assert_eq!(cleaned.0.len(), 2);

        let degenerate = LineString::from(vec![(-71.0, 42.0), (f64::NAN, 42.1)]);
        assert!(clean_line(&degenerate).is_none());
    }

    #[test]
    fn test_simplify_drops_near_duplicates() {
        let line = LineString::from(vec![
            (-71.0, 42.0),
            (-71.00001, 42.00001),
            (-71.0, 42.001),
            (-71.0, 42.00102),
        ]);

        let simplified = simplify_line(&line, 1e-4, 500);
        assert_eq!(simplified.0.len(), 2);
    }

    #[test]
    fn test_simplify_downsamples() {
        let coords: Vec<(f64, f64)> = (0..2000).map(|i| (-71.0, 42.0 + i as f64 * 0.001)).collect();
        let line = LineString::from(coords);

        let simplified = simplify_line(&line, 1e-4, 500);
        assert!(simplified.0.len() <= 500);
        assert_eq!(simplified.0.first(), line.0.first());
        assert_eq!(simplified.0.last(), line.0.last());
    }

    #[test]
    fn test_project_onto_line() {
        let line = north_south_line();
        // ~30m east of the line
        let point = Point::new(-71.06 + meters_to_degrees_approx(30.0) / 42.33f64.to_radians().cos(), 42.33);

        let projection = project_onto_line(point, &line).unwrap();
        assert_abs_diff_eq!(projection.point.x(), -71.06, epsilon = 1e-9);
        assert_abs_diff_eq!(projection.point.y(), 42.33, epsilon = 1e-7);
        assert_abs_diff_eq!(projection.distance_m, 30.0, epsilon = 0.5);
        assert_eq!(projection.segment, 0);

        let expected_along = haversine_distance(Point::new(-71.06, 42.30), projection.point);
        assert_abs_diff_eq!(projection.along_m, expected_along, epsilon = 0.01);
    }

    #[test]
    fn test_projection_picks_later_segment() {
        // An L: north along the meridian, then east along the parallel
        let line = LineString::from(vec![(-71.06, 42.30), (-71.06, 42.35), (-71.00, 42.35)]);
        let first_leg = haversine_distance(Point::new(-71.06, 42.30), Point::new(-71.06, 42.35));

        let projection = project_onto_line(Point::new(-71.03, 42.3502), &line).unwrap();
        assert_eq!(projection.segment, 1);
        assert_abs_diff_eq!(projection.point.x(), -71.03, epsilon = 1e-5);
        assert!(projection.distance_m < 30.0);

        let second_leg = haversine_distance(Point::new(-71.06, 42.35), projection.point);
        assert_abs_diff_eq!(projection.along_m, first_leg + second_leg, epsilon = 0.5);

        let back = point_along(&line, projection.along_m).unwrap();
        // The great circle bows a little north of the parallel
        assert!(haversine_distance(back, projection.point) < 1.0);

        let east_leg = haversine_distance(Point::new(-71.06, 42.35), Point::new(-71.00, 42.35));
        assert_abs_diff_eq!(line_length(&line), first_leg + east_leg, epsilon = 1e-6);
    }

    #[test]
    fn test_degenerate_lines() {
        assert!(project_onto_line(Point::new(-71.0, 42.0), &LineString::from(vec![(-71.0, 42.0)])).is_none());
        assert_eq!(point_along(&LineString::new(vec![]), 10.0), None);

        // Repeated vertex: zero-length segment must not poison the search
        let line = LineString::from(vec![(-71.06, 42.30), (-71.06, 42.30), (-71.06, 42.31)]);
        let projection = project_onto_line(Point::new(-71.06, 42.305), &line).unwrap();
        assert_abs_diff_eq!(projection.point.y(), 42.305, epsilon = 1e-7);
        assert_abs_diff_eq!(projection.along_m, line_length(&line) / 2.0, epsilon = 0.5);
    }

    #[test]
    fn test_project_past_end_clamps() {
        let line = north_south_line();
        let (point, distance) = nearest_point_on_line(Point::new(-71.06, 42.5), &line).unwrap();
        assert_abs_diff_eq!(point.y(), 42.40, epsilon = 1e-9);
        assert!(distance > 11_000.0);
    }

    #[test]
    fn test_point_along_and_offset() {
        let line = north_south_line();
        let total = line_length(&line);

        let start = project_onto_line(Point::new(-71.06, 42.32), &line).unwrap();
        let (moved, applied) = offset_along(&line, &start, 200.0).unwrap();
        assert_abs_diff_eq!(applied, 200.0, epsilon = 1e-6);

        let after = project_onto_line(moved, &line).unwrap();
        assert_abs_diff_eq!(after.along_m - start.along_m, 200.0, epsilon = 0.5);

        // Near the end the offset is clamped to the line length
        let near_end = project_onto_line(Point::new(-71.06, 42.3995), &line).unwrap();
        let (end, applied) = offset_along(&line, &near_end, 200.0).unwrap();
        assert!(applied < 200.0);
        assert_abs_diff_eq!(near_end.along_m + applied, total, epsilon = 1e-6);
        assert_abs_diff_eq!(end.y(), 42.40, epsilon = 1e-9);
    }
}
