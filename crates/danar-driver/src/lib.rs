//! DanaR Pump Driver
//!
//! Session wiring on top of [`danar_protocol`]: a single in-flight command
//! queue, the constraint pipeline that limits user-entered values, YAML
//! configuration, metrics and event fan-out.
//!
//! # Example
//!
//! ```rust,ignore
//! use danar_driver::{DriverConfig, PumpSession};
//! use danar_protocol::HistoryCategory;
//!
//! let session = PumpSession::new(DriverConfig::from_file("danar.yaml")?);
//! let events = session.subscribe();
//!
//! session.request_history(HistoryCategory::Glucose)?;
//! while let Some(packet) = session.next_outbound() {
//!     transport.write_all(&packet)?;
//!     let n = transport.read(&mut buf)?;
//!     session.on_bytes_received(&buf[..n])?;
//! }
//! ```

pub mod config;
pub mod constraints;
pub mod error;
pub mod queue;
pub mod session;
pub mod telemetry;

pub use config::{ConfigError, ConstraintConfig, DriverConfig, QueueConfig};
pub use constraints::{
    Constrained, ConstraintPipeline, DeviceLimits, ExtendedBolusRequest, TempBasalRequest,
    TempTarget,
};
pub use error::{DriverError, DriverResult};
pub use queue::CommandQueue;
pub use session::PumpSession;
pub use telemetry::{describe_metrics, metric_defs, Metric, MetricKind};

pub use danar_protocol;
