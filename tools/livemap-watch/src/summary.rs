use livemap_core::counter::VehicleCounter;
use livemap_core::live::LiveUpdate;
use livemap_core::RenderReport;

/// Running totals over a watch session
#[derive(Debug, Default)]
pub struct WatchStats {
    pub updates: usize,
    pub stale_updates: usize,
    pub degraded_updates: usize,
    pub created: usize,
    pub removed: usize,
    pub snapped: usize,
    pub offset: usize,
    pub skipped: usize,
    pub rejected: usize,
}

impl WatchStats {
    pub fn record_update(&mut self, update: &LiveUpdate) {
        self.updates += 1;
        if update.stale {
            self.stale_updates += 1;
        }
        if update.degraded {
            self.degraded_updates += 1;
        }
    }

    pub fn record_render(&mut self, report: &RenderReport) {
        self.created += report.diff.created;
        self.removed += report.diff.removed;
        self.skipped += report.diff.skipped;
        self.snapped += report.snapped;
        self.offset += report.offset;
        self.rejected += report.rejected;
    }

    pub fn log_summary(&self, counter: &VehicleCounter) {
        tracing::info!("=== Watch Summary ===");
        tracing::info!("Updates applied: {}", self.updates);
        tracing::info!("Markers created: {}, removed: {}", self.created, self.removed);
        tracing::info!(
            "Snapped to route: {} (offset along line: {})",
            self.snapped,
            self.offset
        );
        if self.stale_updates > 0 {
            tracing::warn!("Stale updates (feed unreachable): {}", self.stale_updates);
        }
        if self.degraded_updates > 0 {
            tracing::warn!("Updates over a degraded link: {}", self.degraded_updates);
        }
        if self.skipped + self.rejected > 0 {
            tracing::warn!(
                "Features with unusable positions: {} skipped, {} rejected",
                self.skipped,
                self.rejected
            );
        }

        log_tallies(counter);
    }
}

/// One line per category and vehicle type
pub fn log_tallies(counter: &VehicleCounter) {
    tracing::info!("Vehicles on map: {}", counter.total());
    for row in counter.rows() {
        tracing::info!(
            "  {:<16} {:<12} {:>4}",
            row.category.display_name(),
            row.vehicle_type.display_name(),
            row.count
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use livemap_core::diff::DiffReport;

    #[test]
    fn test_record_render() {
        let mut stats = WatchStats::default();
        let report = RenderReport {
            diff: DiffReport {
                created: 3,
                updated: 1,
                removed: 2,
                skipped: 1,
            },
            snapped: 2,
            offset: 1,
            rejected: 4,
        };
        stats.record_render(&report);
        stats.record_render(&report);

        assert_eq!(stats.created, 6);
        assert_eq!(stats.removed, 4);
        assert_eq!(stats.snapped, 4);
        assert_eq!(stats.offset, 2);
        assert_eq!(stats.skipped, 2);
        assert_eq!(stats.rejected, 8);
    }
}
