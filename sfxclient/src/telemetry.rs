use std::sync::atomic::{AtomicU64, Ordering};

/// Reporter telemetry.
///
/// `Telemetry` counts how report cycles ended and how many datapoints went out, giving insight into the reporter's own
/// behavior without going through the metrics it reports.
#[derive(Debug, Default)]
pub(crate) struct Telemetry {
    reports_succeeded: AtomicU64,
    reports_failed: AtomicU64,
    reports_cancelled: AtomicU64,
    reports_empty: AtomicU64,
    points_reported: AtomicU64,
    points_dropped: AtomicU64,
}

impl Telemetry {
    /// Applies the given telemetry update.
    pub fn apply_update(&self, update: &TelemetryUpdate) {
        let counter = match update.outcome {
            ReportOutcome::Succeeded => &self.reports_succeeded,
            ReportOutcome::Failed => &self.reports_failed,
            ReportOutcome::Cancelled => &self.reports_cancelled,
            ReportOutcome::Empty => &self.reports_empty,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.points_reported.fetch_add(update.points_reported, Ordering::Relaxed);
        self.points_dropped.fetch_add(update.points_dropped, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of the counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            reports_succeeded: self.reports_succeeded.load(Ordering::Relaxed),
            reports_failed: self.reports_failed.load(Ordering::Relaxed),
            reports_cancelled: self.reports_cancelled.load(Ordering::Relaxed),
            reports_empty: self.reports_empty.load(Ordering::Relaxed),
            points_reported: self.points_reported.load(Ordering::Relaxed),
            points_dropped: self.points_dropped.load(Ordering::Relaxed),
        }
    }
}

/// How a report cycle ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ReportOutcome {
    #[default]
    Empty,
    Succeeded,
    Failed,
    Cancelled,
}

/// A buffer for collecting the telemetry of a single report cycle.
#[derive(Debug, Default)]
pub(crate) struct TelemetryUpdate {
    outcome: ReportOutcome,
    points_reported: u64,
    points_dropped: u64,
}

impl TelemetryUpdate {
    /// Tracks a datapoint dropped before submission.
    pub fn track_point_dropped(&mut self) {
        self.points_dropped += 1;
    }

    /// Tracks a successful submission of `points` datapoints.
    pub fn track_succeeded(&mut self, points: usize) {
        self.outcome = ReportOutcome::Succeeded;
        self.points_reported += points as u64;
    }

    /// Tracks a failed submission.
    pub fn track_failed(&mut self) {
        self.outcome = ReportOutcome::Failed;
    }

    /// Tracks a cancelled cycle.
    pub fn track_cancelled(&mut self) {
        self.outcome = ReportOutcome::Cancelled;
    }
}

/// Point-in-time copy of a reporter's telemetry counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Cycles whose submission succeeded.
    pub reports_succeeded: u64,

    /// Cycles whose submission failed.
    pub reports_failed: u64,

    /// Cycles that were cancelled, before or during submission.
    pub reports_cancelled: u64,

    /// Cycles that produced no datapoints and skipped submission.
    pub reports_empty: u64,

    /// Datapoints delivered by successful cycles.
    pub points_reported: u64,

    /// Datapoints dropped before submission for lacking a metric name.
    pub points_dropped: u64,
}

#[cfg(test)]
mod tests {
    use super::{Telemetry, TelemetrySnapshot, TelemetryUpdate};

    #[test]
    fn updates_accumulate() {
        let telemetry = Telemetry::default();

        let mut update = TelemetryUpdate::default();
        update.track_point_dropped();
        update.track_succeeded(4);
        telemetry.apply_update(&update);

        let mut update = TelemetryUpdate::default();
        update.track_failed();
        telemetry.apply_update(&update);

        telemetry.apply_update(&TelemetryUpdate::default());

        let mut update = TelemetryUpdate::default();
        update.track_cancelled();
        telemetry.apply_update(&update);

        assert_eq!(
            telemetry.snapshot(),
            TelemetrySnapshot {
                reports_succeeded: 1,
                reports_failed: 1,
                reports_cancelled: 1,
                reports_empty: 1,
                points_reported: 4,
                points_dropped: 1,
            }
        );
    }
}
