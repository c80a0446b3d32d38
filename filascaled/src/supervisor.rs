//! Poll supervisor
//!
//! Periodic driver of the exchange engine. Each tick reconnects if needed,
//! asks for one status record, evaluates it against the configured material
//! and hands the latest known status to the sinks. It is the only context
//! that touches the serial device.

use filascale_core::{
    evaluate_thresholds, FilaScaleError, StatusRecord, ThresholdTable, ThresholdViolation,
};
use filascale_hardware::ExchangeEngine;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::publish::StatusSink;

/// Snapshot shared between the poll task and readers
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorState {
    /// Last successfully decoded status
    pub latest: Option<StatusRecord>,
    /// Violations found in `latest`
    pub violations: Vec<ThresholdViolation>,
    pub connected_port: Option<String>,
    /// Ticks that produced a fresh status
    pub polls: u64,
    /// Ticks that ended without one while connected
    pub failures: u64,
}

pub type SharedState = Arc<RwLock<MonitorState>>;

/// What a single tick achieved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No device; nothing was requested
    Offline,
    /// A fresh status was recorded
    Updated,
    /// Connected, but this tick produced no new status
    Stale,
}

pub struct PollSupervisor {
    engine: ExchangeEngine,
    state: SharedState,
    thresholds: ThresholdTable,
    material: String,
    period: Duration,
    sinks: Vec<Box<dyn StatusSink>>,
    connected_rx: mpsc::UnboundedReceiver<String>,
}

impl PollSupervisor {
    pub fn new(
        mut engine: ExchangeEngine,
        thresholds: ThresholdTable,
        material: impl Into<String>,
        period: Duration,
    ) -> Self {
        let (connected_tx, connected_rx) = mpsc::unbounded_channel();
        engine
            .connection_mut()
            .set_connected_callback(Box::new(move |port| {
                // Receiver lives as long as the supervisor
                let _ = connected_tx.send(port.to_string());
            }));

        Self {
            engine,
            state: SharedState::default(),
            thresholds,
            material: material.into(),
            period,
            sinks: Vec::new(),
            connected_rx,
        }
    }

    pub fn with_sink(mut self, sink: Box<dyn StatusSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    #[cfg(test)]
    pub fn engine(&self) -> &ExchangeEngine {
        &self.engine
    }

    /// Run one poll cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.engine.is_connected() {
            if let Err(e) = self.engine.connect() {
                debug!("FilaScale not found: {}", e);
            }
        }
        self.announce_connections().await;

        let outcome = if self.engine.is_connected() {
            self.poll_status().await
        } else {
            TickOutcome::Offline
        };

        self.note_disconnect().await;
        self.publish_latest().await;
        outcome
    }

    async fn poll_status(&mut self) -> TickOutcome {
        let record = match self.engine.request_status().await {
            Ok(record) => record,
            Err(FilaScaleError::RetriesExhausted { attempts }) => {
                warn!(
                    "FilaScale did not answer after {} attempts, resetting",
                    attempts
                );
                self.record_failure().await;
                match self.engine.reset_device().await {
                    Ok(()) => {
                        for sink in &self.sinks {
                            sink.device_reset().await;
                        }
                    }
                    Err(e) => warn!("Reset failed: {}", e),
                }
                return TickOutcome::Stale;
            }
            Err(FilaScaleError::UnexpectedReply { expected, received }) => {
                warn!("Discarding {} reply to {} request", received, expected);
                self.record_failure().await;
                return TickOutcome::Stale;
            }
            Err(FilaScaleError::InvalidStatusPayload(reason)) => {
                warn!("Discarding malformed status: {}", reason);
                self.record_failure().await;
                return TickOutcome::Stale;
            }
            Err(e) if e.is_connection_fatal() => {
                info!("Connection to FilaScale lost: {}", e);
                self.record_failure().await;
                return TickOutcome::Stale;
            }
            Err(e) => {
                warn!("Status request failed: {}", e);
                self.record_failure().await;
                return TickOutcome::Stale;
            }
        };

        let violations = self.evaluate(&record);
        let mut state = self.state.write().await;
        state.latest = Some(record);
        state.violations = violations;
        state.polls += 1;
        TickOutcome::Updated
    }

    fn evaluate(&self, record: &StatusRecord) -> Vec<ThresholdViolation> {
        match self.thresholds.get(&self.material) {
            Some(set) => evaluate_thresholds(record, set),
            None => {
                warn!("No thresholds for material '{}'", self.material);
                Vec::new()
            }
        }
    }

    async fn record_failure(&mut self) {
        self.state.write().await.failures += 1;
    }

    /// Deliver queued "connected on P" notifications.
    async fn announce_connections(&mut self) {
        while let Ok(port) = self.connected_rx.try_recv() {
            self.state.write().await.connected_port = Some(port.clone());
            for sink in &self.sinks {
                sink.connected(&port).await;
            }
        }
    }

    async fn note_disconnect(&mut self) {
        if self.engine.is_connected() {
            return;
        }
        let previous = self.state.write().await.connected_port.take();
        if let Some(port) = previous {
            let reason = format!("lost {}", port);
            for sink in &self.sinks {
                sink.disconnected(&reason).await;
            }
        }
    }

    async fn publish_latest(&mut self) {
        let (latest, violations) = {
            let state = self.state.read().await;
            (state.latest.clone(), state.violations.clone())
        };
        if let Some(status) = latest {
            for sink in &self.sinks {
                sink.publish(&status, &violations).await;
            }
        }
    }

    /// Close the session and report it.
    async fn shutdown(&mut self) {
        if self.engine.is_connected() {
            if let Err(e) = self.engine.stop().await {
                debug!("Stop request not acknowledged: {}", e);
            }
        }
        self.engine.disconnect();
        let previous = self.state.write().await.connected_port.take();
        if previous.is_some() {
            for sink in &self.sinks {
                sink.disconnected("monitor stopped").await;
            }
        }
        info!("Poll supervisor stopped");
    }

    /// Run `tick` every period on a dedicated task.
    pub fn start(mut self) -> SupervisorHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let state = self.state.clone();

        let task = tokio::spawn(async move {
            info!("Polling FilaScale every {:?}", self.period);
            let mut ticker = interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = self.tick().await;
                        debug!("Tick: {:?}", outcome);
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            self.shutdown().await;
        });

        SupervisorHandle {
            stop_tx,
            task,
            state,
        }
    }
}

/// Running poll task
pub struct SupervisorHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
    state: SharedState,
}

impl SupervisorHandle {
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }

    /// Stop after the current tick and wait for the task to disconnect.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Poll task ended abnormally: {}", e);
        }
    }
}
