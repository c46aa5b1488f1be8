//! Metric names and descriptions for the sensor-hub transport.
//!
//! Names live in [`metric_defs`] as plain string constants so call sites use
//! the `metrics` macros directly. [`DESCRIPTORS`] pairs each name with its
//! kind, unit and help text; [`describe_metrics`] hands those to whatever
//! recorder is installed. The transport calls it on start, and an embedder
//! that installs its recorder later should call it again.
//!
//! ```rust
//! use shub_metrics::{descriptor, metric_defs, MetricKind};
//!
//! let timeouts = descriptor(metric_defs::IPI_TIMEOUTS).unwrap();
//! assert_eq!(timeouts.kind, MetricKind::Counter);
//!
//! // Safe to call without a recorder installed.
//! shub_metrics::describe_metrics();
//! shub_metrics::metrics::counter!(metric_defs::IPI_TIMEOUTS, "channel" => "2").increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// Metric names.
pub mod metric_defs {
    // Transport: executor, dispatcher and router. Per-channel series carry a
    // "channel" label with the outbound channel id.
    pub const IPI_SENDS: &str = "shub.ipi.sends";
    pub const IPI_BUSY_RETRIES: &str = "shub.ipi.busy_retries";
    pub const IPI_BUSY_EXHAUSTED: &str = "shub.ipi.busy_exhausted";
    pub const IPI_IO_ERRORS: &str = "shub.ipi.io_errors";
    pub const IPI_TIMEOUTS: &str = "shub.ipi.timeouts";
    pub const IPI_LENGTH_MISMATCHES: &str = "shub.ipi.length_mismatches";
    pub const IPI_DROPPED_COMPLETIONS: &str = "shub.ipi.dropped_completions";
    pub const IPI_ABORTED_MESSAGES: &str = "shub.ipi.aborted_messages";
    pub const IPI_MESSAGES_COMPLETED: &str = "shub.ipi.messages_completed";
    pub const IPI_QUEUE_DEPTH: &str = "shub.ipi.queue_depth";
    pub const IPI_MESSAGE_LATENCY: &str = "shub.ipi.message_latency_us";

    // Sensor comm service. Dispatches carry a "command" label.
    pub const COMM_NOTIFY_DISPATCHED: &str = "shub.comm.notify_dispatched";
    pub const COMM_NOTIFY_DROPPED: &str = "shub.comm.notify_dropped";
    pub const COMM_CRC_ERRORS: &str = "shub.comm.crc_errors";
}

/// How a metric is recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// What gets registered with the recorder for one metric.
#[derive(Debug, Clone, Copy)]
pub struct Descriptor {
    pub name: &'static str,
    pub kind: MetricKind,
    pub unit: Unit,
    pub help: &'static str,
}

const fn count(name: &'static str, help: &'static str) -> Descriptor {
    Descriptor {
        name,
        kind: MetricKind::Counter,
        unit: Unit::Count,
        help,
    }
}

/// Every metric the workspace emits.
pub const DESCRIPTORS: &[Descriptor] = &[
    count(metric_defs::IPI_SENDS, "Mailbox sends accepted by the channel"),
    count(metric_defs::IPI_BUSY_RETRIES, "Mailbox send attempts that reported busy"),
    count(
        metric_defs::IPI_BUSY_EXHAUSTED,
        "Sends abandoned after exhausting the busy retry budget",
    ),
    count(metric_defs::IPI_IO_ERRORS, "Mailbox sends that failed with a fatal status"),
    count(metric_defs::IPI_TIMEOUTS, "Transfers that timed out waiting for completion"),
    count(
        metric_defs::IPI_LENGTH_MISMATCHES,
        "Transfers completed with an unexpected response length",
    ),
    count(
        metric_defs::IPI_DROPPED_COMPLETIONS,
        "Acknowledgements dropped because no transfer was waiting",
    ),
    count(
        metric_defs::IPI_ABORTED_MESSAGES,
        "Messages failed because a mailbox call panicked",
    ),
    count(metric_defs::IPI_MESSAGES_COMPLETED, "Messages completed by the dispatcher"),
    Descriptor {
        name: metric_defs::IPI_QUEUE_DEPTH,
        kind: MetricKind::Gauge,
        unit: Unit::Count,
        help: "Messages waiting for dispatch",
    },
    Descriptor {
        name: metric_defs::IPI_MESSAGE_LATENCY,
        kind: MetricKind::Histogram,
        unit: Unit::Microseconds,
        help: "Time spent executing a message",
    },
    count(
        metric_defs::COMM_NOTIFY_DISPATCHED,
        "Notifications delivered to a registered handler",
    ),
    count(metric_defs::COMM_NOTIFY_DROPPED, "Inbound notifications dropped as malformed"),
    count(metric_defs::COMM_CRC_ERRORS, "Inbound frames rejected for a crc8 mismatch"),
];

/// Look up the descriptor registered for `name`.
pub fn descriptor(name: &str) -> Option<&'static Descriptor> {
    DESCRIPTORS.iter().find(|d| d.name == name)
}

/// Register every descriptor with the installed recorder.
///
/// Without a recorder this does nothing, and calling it again is harmless.
pub fn describe_metrics() {
    for d in DESCRIPTORS {
        match d.kind {
            MetricKind::Counter => describe_counter!(d.name, d.unit, d.help),
            MetricKind::Gauge => describe_gauge!(d.name, d.unit, d.help),
            MetricKind::Histogram => describe_histogram!(d.name, d.unit, d.help),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_descriptor_names_unique_and_prefixed() {
        let names: HashSet<_> = DESCRIPTORS.iter().map(|d| d.name).collect();
        assert_eq!(names.len(), DESCRIPTORS.len());
        for d in DESCRIPTORS {
            assert!(d.name.starts_with("shub."), "{}", d.name);
            assert!(!d.help.is_empty(), "{}", d.name);
        }
    }

    #[test]
    fn test_descriptor_lookup() {
        let latency = descriptor(metric_defs::IPI_MESSAGE_LATENCY).unwrap();
        assert_eq!(latency.kind, MetricKind::Histogram);
        assert_eq!(latency.unit, Unit::Microseconds);
        assert_eq!(descriptor(metric_defs::IPI_QUEUE_DEPTH).unwrap().kind, MetricKind::Gauge);
        assert!(descriptor("shub.ipi.unknown").is_none());
    }
}
