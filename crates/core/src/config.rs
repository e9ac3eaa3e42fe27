//! Endpoints, timing constants and persisted preferences.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::layers::LayerVisibility;
use crate::live::RefreshRate;

/// Where the server lives
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn vehicles(&self) -> String {
        format!("{}/vehicles", self.base_url)
    }

    pub fn vehicle_stream(&self) -> String {
        format!("{}/vehicles/stream", self.base_url)
    }

    pub fn shapes(&self) -> String {
        format!("{}/shapes", self.base_url)
    }

    pub fn alerts(&self) -> String {
        format!("{}/alerts", self.base_url)
    }
}

/// Timing knobs of the live channel
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSettings {
    /// How long a fetched payload satisfies further requests
    pub cache_ttl: Duration,
    /// Cache lifetime when every push is applied immediately
    pub immediate_cache_ttl: Duration,
    /// A stream silent for this long is considered dead
    pub heartbeat_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Fetches slower than this count against connection quality
    pub slow_fetch: Duration,
    /// Consecutive failures before the link is considered degraded
    pub degraded_after_failures: u32,
    pub request_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(5),
            immediate_cache_ttl: Duration::from_secs(1),
            heartbeat_timeout: Duration::from_secs(60),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
            slow_fetch: Duration::from_secs(3),
            degraded_after_failures: 2,
            request_timeout: Duration::from_secs(15),
        }
    }
}

impl ChannelSettings {
    pub fn cache_ttl_for(&self, rate: RefreshRate) -> Duration {
        match rate {
            RefreshRate::Immediate => self.immediate_cache_ttl,
            RefreshRate::Every(_) => self.cache_ttl,
        }
    }
}

/// Client state that survives restarts
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub refresh_rate: RefreshRate,
    pub layers: LayerVisibility,
    pub map_expanded: bool,
    /// Skip third-party open data sources entirely
    pub third_party_opt_out: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            refresh_rate: RefreshRate::default(),
            layers: LayerVisibility::default(),
            map_expanded: false,
            third_party_opt_out: false,
        }
    }
}

impl Preferences {
    /// Read preferences from `path`. A missing or unreadable file yields the
    /// defaults.
    pub fn load(path: &Path) -> Self {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no preferences at {}, using defaults", path.display());
                return Self::default();
            }
            Err(e) => {
                warn!("could not read preferences {}: {e}", path.display());
                return Self::default();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("discarding corrupt preferences {}: {e}", path.display());
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}
