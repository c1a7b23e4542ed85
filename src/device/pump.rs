use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::device::fanout::SensorFanout;
use crate::device::response::DeviceResponse;
use crate::device::serial::DeviceLine;
use crate::utils::BridgeError;
use crate::utils::shutdown::ShutdownSignal;

/// Destination for every well-formed device line.
pub trait ResponseSink: Send + Sync {
    fn forward(&self, line: &[u8]) -> impl Future<Output = Result<(), BridgeError>> + Send;
}

impl ResponseSink for mpsc::Sender<Vec<u8>> {
    fn forward(&self, line: &[u8]) -> impl Future<Output = Result<(), BridgeError>> + Send {
        let line = line.to_vec();
        async move { self.send(line).await.map_err(|_| BridgeError::DeviceClosed) }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeviceStats {
    pub forwarded: u64,
    pub rejected: u64,
    pub sensor_deliveries: u64,
}

/// Device receive loop: decodes lines, forwards them and fans out sensor states.
///
/// Runs until shutdown, a terminal read error, or the line channel closing.
/// Shutdown also interrupts a forward or fan-out stuck behind a full queue.
pub async fn pump_responses<S: ResponseSink>(
    mut lines: mpsc::Receiver<DeviceLine>,
    sink: S,
    fanout: Arc<SensorFanout>,
    mut shutdown: ShutdownSignal,
) -> Result<DeviceStats, BridgeError> {
    let mut stats = DeviceStats::default();

    loop {
        let next = tokio::select! {
            _ = shutdown.triggered() => return Ok(stats),
            next = lines.recv() => next,
        };
        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(e)) => return Err(BridgeError::DeviceRead(e)),
            None if shutdown.is_triggered() => return Ok(stats),
            None => return Err(BridgeError::DeviceClosed),
        };
        debug!("<- device {}", String::from_utf8_lossy(&line));

        let response = match DeviceResponse::decode(&line) {
            Ok(response) => response,
            Err(e) => {
                stats.rejected += 1;
                debug!("Dropping device line: {e}");
                continue;
            }
        };

        debug!("Response for cmd = {}", response.cmd());
        let forwarded = tokio::select! {
            _ = shutdown.triggered() => return Ok(stats),
            forwarded = sink.forward(&line) => forwarded,
        };
        forwarded?;
        stats.forwarded += 1;

        match response {
            DeviceResponse::SensorState(state) => {
                let delivered = tokio::select! {
                    _ = shutdown.triggered() => return Ok(stats),
                    delivered = fanout.deliver(&state) => delivered,
                };
                stats.sensor_deliveries += delivered as u64;
            }
            DeviceResponse::InvalidSensorState { error, .. } => {
                stats.rejected += 1;
                warn!("Sensor report did not match the expected shape: {error}");
            }
            DeviceResponse::Status(_) => {}
        }
    }
}
