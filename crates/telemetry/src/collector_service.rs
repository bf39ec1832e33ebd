// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Collector side of the metrics pipeline.
//!
//! Snapshots produced by remote workers are merged into a resident registry.
//! Once the accumulated changes exceed the configured threshold, the resident
//! data is copied out, the change counters are reset, and the copy is handed
//! to every sink outside the registry lock.

use crate::config::CollectorConfig;
use crate::constants::{SYSTEM_STATE_KEY, TIME_UPDATED_KEY};
use crate::errors::{ConfigError, IngestError};
use crate::metric::Metric;
use crate::registry::MetricRegistry;
use crate::sink::{self, MetricsSink};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub enum CollectorCommand {
    Snapshot {
        payload: Vec<u8>,
        response_tx: Option<oneshot::Sender<Result<IngestReport, IngestError>>>,
    },
    Flush(oneshot::Sender<usize>),
    SystemState {
        state: String,
        updated: i64,
    },
    GetMetric {
        name: String,
        response_tx: oneshot::Sender<Option<Metric>>,
    },
    Shutdown,
}

/// Outcome of merging one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Number of metrics carried by the snapshot
    pub merged: usize,
    /// Whether the merge crossed the threshold and triggered a flush
    pub flushed: bool,
}

#[derive(Clone)]
pub struct CollectorHandle {
    tx: mpsc::UnboundedSender<CollectorCommand>,
}

impl CollectorHandle {
    /// Queues a snapshot without waiting for it to be merged.
    pub fn submit_snapshot(
        &self,
        payload: Vec<u8>,
    ) -> Result<(), mpsc::error::SendError<CollectorCommand>> {
        self.tx.send(CollectorCommand::Snapshot {
            payload,
            response_tx: None,
        })
    }

    /// Queues a snapshot and waits for the merge result.
    pub async fn ingest_snapshot(&self, payload: Vec<u8>) -> Result<IngestReport, IngestError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(CollectorCommand::Snapshot {
                payload,
                response_tx: Some(response_tx),
            })
            .map_err(|e| {
                IngestError::ChannelClosed(format!("Failed to send snapshot command: {}", e))
            })?;

        response_rx.await.map_err(|e| {
            IngestError::ChannelClosed(format!("Failed to receive snapshot response: {}", e))
        })?
    }

    /// Flushes the resident registry regardless of the threshold.
    ///
    /// Returns the number of key/value pairs handed to the sinks.
    pub async fn flush(&self) -> Result<usize, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(CollectorCommand::Flush(response_tx))
            .map_err(|e| format!("Failed to send flush command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive flush response: {}", e))
    }

    /// Sends a system state report straight to the sinks.
    pub fn report_system_state(
        &self,
        state: &str,
        updated: i64,
    ) -> Result<(), mpsc::error::SendError<CollectorCommand>> {
        self.tx.send(CollectorCommand::SystemState {
            state: state.to_string(),
            updated,
        })
    }

    pub async fn get_metric(&self, name: &str) -> Result<Option<Metric>, String> {
        let (response_tx, response_rx) = oneshot::channel();
        self.tx
            .send(CollectorCommand::GetMetric {
                name: name.to_string(),
                response_tx,
            })
            .map_err(|e| format!("Failed to send get_metric command: {}", e))?;

        response_rx
            .await
            .map_err(|e| format!("Failed to receive get_metric response: {}", e))
    }

    pub fn shutdown(&self) -> Result<(), mpsc::error::SendError<CollectorCommand>> {
        self.tx.send(CollectorCommand::Shutdown)
    }
}

pub struct MetricsCollectorService {
    registry: Arc<MetricRegistry>,
    sinks: Vec<Arc<dyn MetricsSink>>,
    flush_threshold: u64,
    in_flight: Vec<JoinHandle<()>>,
    rx: mpsc::UnboundedReceiver<CollectorCommand>,
}

impl MetricsCollectorService {
    pub fn new(
        config: &CollectorConfig,
        sinks: Vec<Arc<dyn MetricsSink>>,
    ) -> Result<(Self, CollectorHandle), ConfigError> {
        Self::with_registry(config, sinks, Arc::new(MetricRegistry::new()))
    }

    /// Builds a service around an existing resident registry, so metrics
    /// produced on the collector itself are flushed alongside remote ones.
    ///
    /// The threshold is only checked when a snapshot arrives. Local updates
    /// alone are delivered by the next snapshot-triggered flush, a forced
    /// flush, or shutdown.
    pub fn with_registry(
        config: &CollectorConfig,
        sinks: Vec<Arc<dyn MetricsSink>>,
        registry: Arc<MetricRegistry>,
    ) -> Result<(Self, CollectorHandle), ConfigError> {
        config.validate()?;
        let (tx, rx) = mpsc::unbounded_channel();

        let service = Self {
            registry,
            sinks,
            flush_threshold: config.flush_threshold,
            in_flight: Vec::new(),
            rx,
        };

        let handle = CollectorHandle { tx };

        Ok((service, handle))
    }

    pub fn registry(&self) -> Arc<MetricRegistry> {
        Arc::clone(&self.registry)
    }

    pub async fn run(mut self) {
        debug!(
            "Metrics collector service started with {} sinks and flush threshold {}",
            self.sinks.len(),
            self.flush_threshold
        );

        while let Some(command) = self.rx.recv().await {
            match command {
                CollectorCommand::Snapshot {
                    payload,
                    response_tx,
                } => {
                    let result = self.on_snapshot(&payload);
                    match response_tx {
                        Some(response_tx) => {
                            if response_tx.send(result).is_err() {
                                error!("Failed to send snapshot response - receiver dropped");
                            }
                        }
                        None => {
                            if let Err(e) = result {
                                warn!("Dropping snapshot of {} bytes: {}", payload.len(), e);
                            }
                        }
                    }
                }

                CollectorCommand::Flush(response_tx) => {
                    let count = self.flush();
                    if response_tx.send(count).is_err() {
                        error!("Failed to send flush response - receiver dropped");
                    }
                }

                CollectorCommand::SystemState { state, updated } => {
                    info!("System state changed to {}", state);
                    let pairs = vec![
                        (SYSTEM_STATE_KEY.to_string(), state),
                        (TIME_UPDATED_KEY.to_string(), updated.to_string()),
                    ];
                    self.dispatch(pairs);
                }

                CollectorCommand::GetMetric { name, response_tx } => {
                    if response_tx.send(self.registry.get(&name)).is_err() {
                        error!("Failed to send get_metric response - receiver dropped");
                    }
                }

                CollectorCommand::Shutdown => {
                    debug!("Metrics collector service shutting down");
                    break;
                }
            }
        }

        self.complete().await;
        debug!("Metrics collector service stopped");
    }

    fn on_snapshot(&mut self, payload: &[u8]) -> Result<IngestReport, IngestError> {
        let transient = MetricRegistry::deserialize(payload)?;
        let merged = self.registry.absorb(transient)?;
        debug!("Received {} metrics in snapshot", merged);

        let flushed = self.registry.flush_ready(self.flush_threshold);
        if flushed {
            self.flush();
        }
        Ok(IngestReport { merged, flushed })
    }

    /// Copies out and resets the resident data, then dispatches the copy.
    fn flush(&mut self) -> usize {
        let pairs = self.registry.drain_for_flush();
        let count = pairs.len();
        debug!("Flushing {} metric values to {} sinks", count, self.sinks.len());
        self.dispatch(pairs);
        count
    }

    fn dispatch(&mut self, pairs: Vec<(String, String)>) {
        self.in_flight.retain(|handle| !handle.is_finished());
        if self.sinks.is_empty() {
            debug!("No sinks configured, dropping {} metric values", pairs.len());
            return;
        }
        self.in_flight.push(sink::dispatch(&self.sinks, pairs));
    }

    /// Delivers whatever changed since the last flush and waits for every
    /// outstanding sink delivery.
    async fn complete(&mut self) {
        if self.registry.total_changes() > 0 {
            self.flush();
        }
        for handle in self.in_flight.drain(..) {
            if let Err(e) = handle.await {
                error!("Sink dispatch failed during shutdown: {}", e);
            }
        }
    }
}
