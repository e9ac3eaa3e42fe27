//! Service alerts from `/alerts`.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use livemap_transit::{AlertIdentifier, RouteIdentifier};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::live::HttpSource;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum SeverityLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl SeverityLevel {
    /// Map a 1-10 severity score onto a level
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=3 => Self::Low,
            4..=6 => Self::Medium,
            7..=8 => Self::High,
            _ => Self::Critical,
        }
    }
}

impl fmt::Display for SeverityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        };
        write!(f, "{s}")
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivePeriod {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: AlertIdentifier,
    pub header: String,
    #[serde(default)]
    pub description: Option<String>,
    /// 1 (minor) to 10 (severe)
    #[serde(default)]
    pub severity: u8,
    #[serde(default)]
    pub active_period: Vec<ActivePeriod>,
    #[serde(default, alias = "routes")]
    pub informed_routes: Vec<RouteIdentifier>,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub lifecycle: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Alert {
    pub fn level(&self) -> SeverityLevel {
        SeverityLevel::from_score(self.severity)
    }

    /// Only the first active period is consulted
    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.active_period
            .first()
            .and_then(|period| period.end)
            .is_some_and(|end| end < now)
    }

    pub fn affects(&self, route: &RouteIdentifier) -> bool {
        self.informed_routes.contains(route)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AlertsPayload {
    List(Vec<serde_json::Value>),
    Wrapped { alerts: Vec<serde_json::Value> },
}

/// Parse an `/alerts` body: either a bare list or `{"alerts": [...]}`.
///
/// Entries that do not decode as an [`Alert`] are skipped; only a body
/// without a recognizable list is an error.
pub fn parse_alerts(body: &str) -> Result<Vec<Alert>> {
    let entries = match serde_json::from_str(body)? {
        AlertsPayload::List(entries) => entries,
        AlertsPayload::Wrapped { alerts } => alerts,
    };

    let total = entries.len();
    let alerts: Vec<Alert> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(alert) => Some(alert),
            Err(e) => {
                warn!("skipping alert #{index}: {e}");
                None
            }
        })
        .collect();

    if alerts.len() < total {
        debug!("parsed {} of {total} alerts", alerts.len());
    }
    Ok(alerts)
}

pub async fn fetch_alerts(source: &HttpSource) -> Result<Vec<Alert>> {
    parse_alerts(&source.fetch_alerts().await?)
}

/// The alerts worth showing right now, most severe first.
///
/// Ended alerts and repeated headers are dropped; the first alert with a
/// given header wins. An empty result is the "No active alerts" state.
pub fn visible_alerts(alerts: &[Alert], now: DateTime<Utc>) -> Vec<&Alert> {
    let mut seen = HashSet::new();
    let mut visible: Vec<&Alert> = alerts
        .iter()
        .filter(|alert| {
            if alert.has_ended(now) {
                debug!("alert {} has ended", alert.id);
                return false;
            }
            seen.insert(alert.header.trim())
        })
        .collect();

    // Stable, so equal severities keep feed order
    visible.sort_by(|a, b| b.severity.cmp(&a.severity));
    visible
}

pub fn alerts_for_route<'a>(alerts: &'a [&'a Alert], route: &RouteIdentifier) -> Vec<&'a Alert> {
    alerts
        .iter()
        .copied()
        .filter(|alert| alert.affects(route))
        .collect()
}
