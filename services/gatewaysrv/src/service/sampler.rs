//! Cyclic sampler
//!
//! One task per data point. A sweep reads every variable of every device in
//! configuration order and records the result; the task then waits for the
//! port's sample interval or cancellation.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::store::DataPoint;
use crate::drivers;

/// Read every variable of a data point once
pub async fn sweep(point: &DataPoint) {
    for device in &point.devices {
        for variable in &device.variables {
            let value = point.driver.read(&device.config, &variable.config).await;
            variable.record(value);
        }
    }
}

/// Bring the driver up, then sweep until `token` is cancelled
pub async fn run(point: Arc<DataPoint>, token: CancellationToken) {
    let port = point.port.port_name.clone();
    let interval = point.port.param.sample_interval();
    let reconnect = drivers::init(point.driver.clone(), point.port.port_type, token.clone()).await;
    info!(
        port = %port,
        driver = point.driver.name(),
        interval_s = interval.as_secs(),
        "Sampler started"
    );

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = sweep(&point) => {},
        }
        debug!(port = %port, "Sweep finished");

        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(interval) => {},
        }
    }

    if let Some(handle) = reconnect {
        if let Err(e) = handle.await {
            warn!(port = %port, "Reconnect task ended abnormally: {}", e);
        }
    }
    info!(port = %port, "Sampler stopped");
}
