//! Telemetry reporting
//!
//! The engine reports the start and completion of each transport operation to
//! a [`TelemetryReporter`]. [`NoOpTelemetryReporter`] is the default and
//! compiles down to nothing; [`LoggingTelemetryReporter`] emits `tracing`
//! events.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use s3accel_common::Result;
use tracing::{debug, info, warn};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// A named unit of work with attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    /// Process-unique identifier
    pub id: u64,
    /// Operation name, e.g. `block.get`
    pub name: &'static str,
    /// Key/value attributes
    pub attributes: Vec<(&'static str, String)>,
}

impl Operation {
    /// Create an operation with a fresh identifier
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            id: NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed),
            name,
            attributes: Vec::new(),
        }
    }

    /// Add an attribute
    #[must_use]
    pub fn with_attribute(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.attributes.push((key, value.to_string()));
        self
    }

    /// Look up an attribute value
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}(", self.id, self.name)?;
        for (i, (key, value)) in self.attributes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str(")")
    }
}

/// Outcome of a completed operation
#[derive(Clone, Debug)]
pub struct OperationMeasurement {
    pub operation: Operation,
    /// Wall clock start, nanoseconds since the Unix epoch
    pub epoch_timestamp_nanos: u64,
    pub elapsed: Duration,
    /// Error message when the operation failed
    pub error: Option<String>,
}

impl OperationMeasurement {
    #[must_use]
    pub const fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Sink for operation telemetry
pub trait TelemetryReporter: Send + Sync {
    /// Reports the start of an operation
    fn report_start(&self, epoch_timestamp_nanos: u64, operation: &Operation);

    /// Reports the completion of an operation
    fn report_complete(&self, measurement: &OperationMeasurement);
}

/// A [`TelemetryReporter`] that does nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpTelemetryReporter;

impl TelemetryReporter for NoOpTelemetryReporter {
    #[inline]
    fn report_start(&self, _epoch_timestamp_nanos: u64, _operation: &Operation) {}

    #[inline]
    fn report_complete(&self, _measurement: &OperationMeasurement) {}
}

/// A [`TelemetryReporter`] that logs through `tracing`
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingTelemetryReporter;

impl TelemetryReporter for LoggingTelemetryReporter {
    fn report_start(&self, epoch_timestamp_nanos: u64, operation: &Operation) {
        debug!(start_ns = epoch_timestamp_nanos, "started {operation}");
    }

    fn report_complete(&self, measurement: &OperationMeasurement) {
        let elapsed_us = u64::try_from(measurement.elapsed.as_micros()).unwrap_or(u64::MAX);
        match &measurement.error {
            None => info!(elapsed_us, "completed {}", measurement.operation),
            Some(error) => warn!(elapsed_us, %error, "failed {}", measurement.operation),
        }
    }
}

fn epoch_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
}

/// Run `future` as `operation`, reporting start and completion
pub async fn measure<F, T>(
    reporter: &dyn TelemetryReporter,
    operation: Operation,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let epoch_timestamp_nanos = epoch_nanos();
    reporter.report_start(epoch_timestamp_nanos, &operation);

    let started = Instant::now();
    let result = future.await;

    reporter.report_complete(&OperationMeasurement {
        operation,
        epoch_timestamp_nanos,
        elapsed: started.elapsed(),
        error: result.as_ref().err().map(ToString::to_string),
    });

    result
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;

    /// Records every completed measurement
    #[derive(Default)]
    pub struct RecordingReporter {
        pub started: Mutex<Vec<Operation>>,
        pub completed: Mutex<Vec<OperationMeasurement>>,
    }

    impl TelemetryReporter for RecordingReporter {
        fn report_start(&self, _epoch_timestamp_nanos: u64, operation: &Operation) {
            self.started.lock().push(operation.clone());
        }

        fn report_complete(&self, measurement: &OperationMeasurement) {
            self.completed.lock().push(measurement.clone());
        }
    }
}
