//! Popup content for a marker.
//!
//! [`render_popup`] is a pure function of the feature, the session toggles
//! and the current time. Nothing is cached on the marker, so flipping a
//! toggle shows up the next time a popup opens without touching the map.

use chrono::{DateTime, Utc};
use livemap_transit::{DirectionId, FeatureKind, VehicleFeature, VehicleStatus};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedUnit {
    #[default]
    Mph,
    Kmh,
}

/// Session-scoped popup toggles
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupOptions {
    /// Show ids, direction and feed timestamps
    pub detailed: bool,
    pub speed_unit: SpeedUnit,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PopupContent {
    pub title: String,
    pub rows: Vec<(String, String)>,
}

impl PopupContent {
    pub fn row(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn to_html(&self) -> String {
        let mut html = format!("<b>{}</b>", escape_html(&self.title));
        for (label, value) in &self.rows {
            html.push_str(&format!(
                "<br>{}: {}",
                escape_html(label),
                escape_html(value)
            ));
        }
        html
    }
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

pub fn occupancy_text(status: &str) -> &str {
    match status {
        "EMPTY" => "Empty",
        "MANY_SEATS_AVAILABLE" => "Many seats available",
        "FEW_SEATS_AVAILABLE" => "Few seats available",
        "STANDING_ROOM_ONLY" => "Standing room only",
        "CRUSHED_STANDING_ROOM_ONLY" => "Crowded",
        "FULL" => "Full",
        "NOT_ACCEPTING_PASSENGERS" => "Not accepting passengers",
        other => other,
    }
}

pub fn render_popup(
    feature: &VehicleFeature,
    options: &PopupOptions,
    now: DateTime<Utc>,
) -> PopupContent {
    let props = &feature.properties;

    if feature.kind == FeatureKind::Station {
        let title = props
            .stop
            .clone()
            .or_else(|| props.label.clone())
            .unwrap_or_else(|| feature.id.to_string());
        let mut rows = vec![("Line".to_owned(), feature.category.to_string())];
        if options.detailed {
            rows.push(("Stop ID".to_owned(), feature.id.to_string()));
        }
        return PopupContent { title, rows };
    }

    let title = match &props.headsign {
        Some(headsign) => format!("{} to {headsign}", feature.category),
        None => format!("{} {}", feature.category, feature.route),
    };

    let mut rows = Vec::new();

    if let Some(stop) = &props.stop {
        let status = match feature.status() {
            VehicleStatus::InTransitTo => format!("In transit to {stop}"),
            VehicleStatus::IncomingAt => format!("Approaching {stop}"),
            VehicleStatus::StoppedAt => format!("Stopped at {stop}"),
        };
        rows.push(("Status".to_owned(), status));
    }

    if let Some(speed) = props.speed.filter(|s| s.is_finite() && *s > 0.0) {
        let speed = match options.speed_unit {
            SpeedUnit::Mph => format!("{speed:.0} mph"),
            SpeedUnit::Kmh => format!("{:.0} km/h", speed * 1.609_344),
        };
        rows.push(("Speed".to_owned(), speed));
    }

    if let Some(occupancy) = &props.occupancy_status {
        let mut text = occupancy_text(occupancy).to_owned();
        if let Some(pct) = props.occupancy_percentage {
            text.push_str(&format!(" ({pct}%)"));
        }
        rows.push(("Occupancy".to_owned(), text));
    }

    if let Some(eta) = props.eta_time() {
        let minutes = (eta.with_timezone(&Utc) - now).num_minutes();
        let text = match minutes {
            m if m <= 0 => "Arriving".to_owned(),
            1 => "1 min".to_owned(),
            m => format!("{m} min"),
        };
        rows.push(("ETA".to_owned(), text));
    }

    if options.detailed {
        rows.push(("Vehicle".to_owned(), feature.id.to_string()));
        if let Some(label) = &props.label {
            rows.push(("Label".to_owned(), label.clone()));
        }
        rows.push(("Route".to_owned(), feature.route.to_string()));
        if let Some(direction) = feature.direction() {
            let direction = match direction {
                DirectionId::Outbound => "Outbound",
                DirectionId::Inbound => "Inbound",
            };
            rows.push(("Direction".to_owned(), direction.to_owned()));
        }
        if let Some(updated) = props.updated_at() {
            let age = (now - updated.with_timezone(&Utc)).num_seconds().max(0);
            rows.push(("Updated".to_owned(), format!("{age}s ago")));
        }
    }

    PopupContent { title, rows }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use geo::Point;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 13, 10, 0).unwrap()
    }

    fn red_line_train() -> VehicleFeature {
        let mut feature = VehicleFeature::new("R-5480", "Red", Point::new(-71.06, 42.35))
            .with_status(VehicleStatus::IncomingAt)
            .with_direction(DirectionId::Inbound);
        feature.properties.stop = Some("Park Street".into());
        feature.properties.headsign = Some("Alewife".into());
        feature.properties.speed = Some(20.0);
        feature.properties.occupancy_status = Some("FEW_SEATS_AVAILABLE".into());
        feature.properties.eta = Some("2024-03-01T08:13:00-05:00".into());
        feature
    }

    #[test]
    fn test_basic_popup() {
        let popup = render_popup(&red_line_train(), &PopupOptions::default(), now());

        assert_eq!(popup.title, "Red Line to Alewife");
        assert_eq!(popup.row("Status"), Some("Approaching Park Street"));
        assert_eq!(popup.row("Speed"), Some("20 mph"));
        assert_eq!(popup.row("Occupancy"), Some("Few seats available"));
        assert_eq!(popup.row("ETA"), Some("3 min"));
        assert_eq!(popup.row("Vehicle"), None);
    }

    #[test]
    fn test_toggles_change_content() {
        let options = PopupOptions {
            detailed: true,
            speed_unit: SpeedUnit::Kmh,
        };
        let popup = render_popup(&red_line_train(), &options, now());

        assert_eq!(popup.row("Speed"), Some("32 km/h"));
        assert_eq!(popup.row("Vehicle"), Some("R-5480"));
        assert_eq!(popup.row("Direction"), Some("Inbound"));
    }

    #[test]
    fn test_html_is_escaped() {
        let popup = PopupContent {
            title: "<script>".into(),
            rows: vec![("A & B".into(), "\"quoted\"".into())],
        };
        assert_eq!(
            popup.to_html(),
            "<b>&lt;script&gt;</b><br>A &amp; B: &quot;quoted&quot;"
        );
    }

    #[test]
    fn test_station_popup() {
        let mut station = VehicleFeature::new("place-dwnxg", "Red", Point::new(-71.06, 42.355));
        station.kind = FeatureKind::Station;
        station.properties.stop = Some("Downtown Crossing".into());

        let popup = render_popup(&station, &PopupOptions::default(), now());
        assert_eq!(popup.title, "Downtown Crossing");
        assert_eq!(popup.row("Line"), Some("Red Line"));
    }
}
