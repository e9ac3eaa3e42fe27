use std::time::Duration;

use tracing::{info, warn};

use crate::config::ChannelSettings;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LinkQuality {
    #[default]
    Good,
    Degraded,
}

/// Watches fetch outcomes and decides whether the link is degraded.
///
/// Repeated failures or slow fetches mark the link degraded; one fast
/// success restores it.
#[derive(Clone, Debug)]
pub struct ConnectionMonitor {
    slow_fetch: Duration,
    failure_limit: u32,
    consecutive_failures: u32,
    last_latency: Option<Duration>,
    quality: LinkQuality,
}

impl ConnectionMonitor {
    pub fn new(settings: &ChannelSettings) -> Self {
        Self {
            slow_fetch: settings.slow_fetch,
            failure_limit: settings.degraded_after_failures.max(1),
            consecutive_failures: 0,
            last_latency: None,
            quality: LinkQuality::Good,
        }
    }

    pub fn record_success(&mut self, latency: Duration) {
        self.consecutive_failures = 0;
        self.last_latency = Some(latency);
        if latency > self.slow_fetch {
            self.set(LinkQuality::Degraded, || format!("fetch took {latency:?}"));
        } else {
            self.set(LinkQuality::Good, String::new);
        }
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.failure_limit {
            let failures = self.consecutive_failures;
            self.set(LinkQuality::Degraded, || format!("{failures} failures in a row"));
        }
    }

    fn set(&mut self, quality: LinkQuality, why: impl FnOnce() -> String) {
        if self.quality == quality {
            return;
        }
        match quality {
            LinkQuality::Degraded => warn!("connection degraded: {}", why()),
            LinkQuality::Good => info!("connection recovered"),
        }
        self.quality = quality;
    }

    pub fn quality(&self) -> LinkQuality {
        self.quality
    }

    pub fn is_degraded(&self) -> bool {
        self.quality == LinkQuality::Degraded
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    /// Poll interval adjusted for link quality
    pub fn adjust_interval(&self, interval: Duration) -> Duration {
        match self.quality {
            LinkQuality::Good => interval,
            LinkQuality::Degraded => interval.saturating_mul(2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> ConnectionMonitor {
        ConnectionMonitor::new(&ChannelSettings::default())
    }

    #[test]
    fn test_two_failures_degrade() {
        let mut monitor = monitor();
        monitor.record_failure();
        assert!(!monitor.is_degraded());
        monitor.record_failure();
        assert!(monitor.is_degraded());
        assert_eq!(
            monitor.adjust_interval(Duration::from_secs(10)),
            Duration::from_secs(20)
        );

        monitor.record_success(Duration::from_millis(200));
        assert_eq!(monitor.quality(), LinkQuality::Good);
        assert_eq!(monitor.consecutive_failures(), 0);
    }

    #[test]
    fn test_slow_fetch_degrades() {
        let mut monitor = monitor();
        monitor.record_success(Duration::from_millis(3500));
        assert!(monitor.is_degraded());
        assert_eq!(monitor.last_latency(), Some(Duration::from_millis(3500)));

        monitor.record_success(Duration::from_millis(2900));
        assert!(!monitor.is_degraded());
    }
}
