//! External throughput measurement.
//!
//! The primary exchange only needs a throughput figure in Mbps; the tool that
//! produces it sits behind [`ThroughputMeter`]. The production implementation
//! shells out to `iperf3 --json`.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::config::MeasurementConfig;
use crate::error::MeasurementError;

/// Produces a throughput figure against a measurement server.
#[async_trait]
pub trait ThroughputMeter: Send + Sync {
    /// Measure throughput to `target:port` for `duration`, in Mbps.
    async fn measure(
        &self,
        target: &str,
        port: u16,
        duration: Duration,
    ) -> Result<f64, MeasurementError>;
}

/// Runs the `iperf3` client as a child process.
///
/// The child is killed when the measurement future is dropped, so a caller's
/// timeout also terminates the process.
#[derive(Debug, Clone)]
pub struct Iperf3Meter {
    binary: String,
}

impl Iperf3Meter {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &MeasurementConfig) -> Self {
        Self::new(config.binary.clone())
    }
}

#[async_trait]
impl ThroughputMeter for Iperf3Meter {
    async fn measure(
        &self,
        target: &str,
        port: u16,
        duration: Duration,
    ) -> Result<f64, MeasurementError> {
        let mut command = Command::new(&self.binary);
        command
            .args(["-c", target])
            .args(["-p", &port.to_string()])
            .args(["-t", &duration.as_secs().to_string()])
            .arg("--json")
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!(binary = %self.binary, target, port, ?duration, "starting measurement");

        let output = command
            .output()
            .await
            .map_err(|e| MeasurementError::Spawn {
                program: self.binary.clone(),
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(MeasurementError::ExitStatus {
                program: self.binary.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_iperf3_report(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Extract received throughput (Mbps) from an `iperf3 --json` report.
///
/// # Errors
///
/// Returns [`MeasurementError::Parse`] if the output is not JSON, reports an
/// error, or lacks a finite non-negative `end.sum_received.bits_per_second`.
pub fn parse_iperf3_report(output: &str) -> Result<f64, MeasurementError> {
    let report: Value =
        serde_json::from_str(output).map_err(|e| MeasurementError::parse(e.to_string()))?;

    if let Some(error) = report.get("error").and_then(Value::as_str) {
        return Err(MeasurementError::parse(format!("iperf3 reported: {error}")));
    }

    let bits_per_second = report
        .pointer("/end/sum_received/bits_per_second")
        .and_then(Value::as_f64)
        .ok_or_else(|| MeasurementError::parse("missing end.sum_received.bits_per_second"))?;

    if !bits_per_second.is_finite() || bits_per_second < 0.0 {
        return Err(MeasurementError::parse(format!(
            "implausible throughput {bits_per_second} bit/s"
        )));
    }

    Ok(bits_per_second / 1e6)
}
