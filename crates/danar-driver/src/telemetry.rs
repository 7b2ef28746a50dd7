//! Driver metrics.
//!
//! Every metric the driver records is declared here as a [`Metric`] constant
//! so names and labels stay consistent. Call [`describe_metrics`] once at
//! startup after installing a recorder.
//!
//! ```rust,ignore
//! use danar_driver::telemetry::{describe_metrics, metric_defs};
//!
//! describe_metrics();
//! metrics::counter!(metric_defs::FRAMES_RECEIVED.name, "command" => "0x3104").increment(1);
//! ```

use metrics::{describe_counter, describe_gauge, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Monotonically increasing.
    Counter,
    /// Goes up and down.
    Gauge,
}

impl MetricKind {
    /// Lowercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// Metric name, e.g. "danar.frames.received".
    pub name: &'static str,
    /// Counter or gauge.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// Unit of measurement.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    /// Declare a counter.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Declare a gauge.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Set the description.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Set the unit.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Set the expected label keys.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Register this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => {
                describe_counter!(self.name, unit, self.description);
            }
            (MetricKind::Counter, None) => {
                describe_counter!(self.name, self.description);
            }
            (MetricKind::Gauge, Some(unit)) => {
                describe_gauge!(self.name, unit, self.description);
            }
            (MetricKind::Gauge, None) => {
                describe_gauge!(self.name, self.description);
            }
        }
    }
}

/// All metrics recorded by the driver.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Label carrying the command code as `0xNNNN`.
    pub const COMMAND_LABELS: &[&str] = &["command"];

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Frames handed to the session.
    pub const FRAMES_RECEIVED: Metric = Metric::counter("danar.frames.received")
        .with_description("Inbound frames dispatched")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Frames with a code no handler is registered for.
    pub const UNKNOWN_COMMANDS: Metric = Metric::counter("danar.frames.unknown")
        .with_description("Inbound frames with an unregistered command code")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Frames that failed envelope or payload decoding.
    pub const MALFORMED_FRAMES: Metric = Metric::counter("danar.frames.malformed")
        .with_description("Inbound frames dropped as malformed")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Device error events.
    pub const DEVICE_ERRORS: Metric = Metric::counter("danar.device.errors")
        .with_description("Error codes reported by the pump")
        .with_unit(Unit::Count);

    /// History batches fully received.
    pub const HISTORY_BATCHES: Metric = Metric::counter("danar.history.batches")
        .with_description("History batches completed")
        .with_unit(Unit::Count)
        .with_labels(&["category"]);

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Commands released to the transport.
    pub const COMMANDS_SENT: Metric = Metric::counter("danar.commands.sent")
        .with_description("Commands released for sending")
        .with_unit(Unit::Count)
        .with_labels(COMMAND_LABELS);

    /// Values changed by the constraint pipeline.
    pub const CONSTRAINTS_APPLIED: Metric = Metric::counter("danar.constraints.applied")
        .with_description("User values changed by a limiter")
        .with_unit(Unit::Count)
        .with_labels(&["value"]);

    /// Commands waiting behind the in-flight one.
    pub const QUEUE_PENDING: Metric = Metric::gauge("danar.queue.pending")
        .with_description("Commands waiting to be sent")
        .with_unit(Unit::Count);

    /// Every metric, for [`super::describe_metrics`].
    pub const ALL: &[Metric] = &[
        FRAMES_RECEIVED,
        UNKNOWN_COMMANDS,
        MALFORMED_FRAMES,
        DEVICE_ERRORS,
        HISTORY_BATCHES,
        COMMANDS_SENT,
        CONSTRAINTS_APPLIED,
        QUEUE_PENDING,
    ];
}

/// Register descriptions for every driver metric.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

/// Label value for a command code.
pub(crate) fn command_label(code: u16) -> String {
    format!("0x{:04X}", code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names_are_unique() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
        assert!(names.iter().all(|n| n.starts_with("danar.")));
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
        assert_eq!(metric_defs::QUEUE_PENDING.kind, MetricKind::Gauge);
        assert_eq!(command_label(0x3104), "0x3104");
    }
}
