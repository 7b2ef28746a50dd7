//! Events emitted while decoding inbound messages.

use crate::history::HistoryCategory;
use crate::types::PumpErrorCode;

/// Signal raised by a handler for the application layer.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpEvent {
    /// A history batch received its end-of-stream marker.
    HistoryBatchComplete(HistoryCategory),
    /// The pump reported a non-zero error code.
    ErrorOccurred(PumpErrorCode),
    /// Bolus delivery progress.
    BolusProgress {
        /// Units delivered so far.
        delivered: f64,
        /// Units still to deliver.
        remaining: f64,
    },
    /// A running bolus was stopped, by request or by a device error.
    BolusStopped {
        /// Units delivered before the stop.
        delivered: f64,
    },
    /// The pump answered a set command with a rejection code.
    CommandRejected {
        /// Command code.
        command: u16,
        /// Result byte.
        code: u8,
    },
    /// The connected pump reports a hardware model this driver does not
    /// support.
    UnsupportedModel {
        /// Hardware model code.
        hw_model: u8,
    },
}

impl PumpEvent {
    /// Short name for logging and metrics labels.
    pub fn name(&self) -> &'static str {
        match self {
            PumpEvent::HistoryBatchComplete(_) => "history_batch_complete",
            PumpEvent::ErrorOccurred(_) => "error_occurred",
            PumpEvent::BolusProgress { .. } => "bolus_progress",
            PumpEvent::BolusStopped { .. } => "bolus_stopped",
            PumpEvent::CommandRejected { .. } => "command_rejected",
            PumpEvent::UnsupportedModel { .. } => "unsupported_model",
        }
    }
}
