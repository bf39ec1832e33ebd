// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Sink contract and fire-and-forget dispatch of flushed metrics.

use crate::errors::SinkError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, Instrument};

/// An external consumer of flushed metric data.
#[async_trait]
pub trait MetricsSink: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Delivers one flush worth of `(name, value)` pairs.
    async fn sink(&self, metrics: &[(String, String)]) -> Result<(), SinkError>;

    /// Releases whatever the sink acquired for the flush. Called exactly once
    /// per dispatch, after `sink` returned, failed, or panicked.
    fn close(&self) {}
}

/// Holds a sink for the duration of one delivery and closes it on drop.
struct SinkLease {
    sink: Arc<dyn MetricsSink>,
}

impl Drop for SinkLease {
    fn drop(&mut self) {
        self.sink.close();
        debug!("Released sink {}", self.sink.name());
    }
}

/// Sends `metrics` to every sink, each on its own task.
///
/// Failures and panics are logged and never reach the caller. The returned
/// handle completes once every sink has finished and been closed; callers are
/// free to drop it.
pub fn dispatch(sinks: &[Arc<dyn MetricsSink>], metrics: Vec<(String, String)>) -> JoinHandle<()> {
    let metrics: Arc<[(String, String)]> = metrics.into();
    let mut tasks = JoinSet::new();

    for sink in sinks {
        let lease = SinkLease {
            sink: Arc::clone(sink),
        };
        let metrics = Arc::clone(&metrics);
        tasks.spawn(async move {
            let lease = lease;
            match lease.sink.sink(&metrics).await {
                Ok(()) => debug!(
                    "Sink {} received {} metrics",
                    lease.sink.name(),
                    metrics.len()
                ),
                Err(e) => error!("Exception in sink {}: {}", lease.sink.name(), e),
            }
        }
        .in_current_span());
    }

    tokio::spawn(
        async move {
            while let Some(result) = tasks.join_next().await {
                if let Err(e) = result {
                    error!("Sink task failed: {}", e);
                }
            }
        }
        .in_current_span(),
    )
}

/// Writes every flushed pair to the `tracing` output at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

#[async_trait]
impl MetricsSink for TracingSink {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn sink(&self, metrics: &[(String, String)]) -> Result<(), SinkError> {
        for (name, value) in metrics {
            info!("Metric {}: {}", name, value);
        }
        Ok(())
    }
}
