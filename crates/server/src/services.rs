use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use firebridge_core::{Command, CommandRecord, ResponseRecord};
use firebridge_firebase::{StateStore, StoreError};
use firebridge_serial::{DeviceLink, ReadPolicy};

use crate::models::{BridgeStatus, ErrorRecord, OutcomeRecord, OutcomeSource};
use crate::reconciler::{Dispatch, ReconcileError, Reconciler, TickOutcome};
use crate::Metrics;

#[derive(Default)]
struct Activity {
    last_outcome: Option<OutcomeRecord>,
    last_error: Option<ErrorRecord>,
}

/// Shared entry point for the poll loop and the control API.
///
/// Both paths go through the same reconciler lock, so a poll tick never
/// interleaves with a command issued over HTTP.
pub struct BridgeService<S, D> {
    store: S,
    reconciler: Arc<Mutex<Reconciler<S, D>>>,
    activity: Arc<RwLock<Activity>>,
    metrics: Arc<Metrics>,
}

impl<S: Clone, D> Clone for BridgeService<S, D> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            reconciler: self.reconciler.clone(),
            activity: self.activity.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<S, D> BridgeService<S, D>
where
    S: StateStore + Clone,
    D: DeviceLink,
{
    pub fn new(store: S, device: Option<D>, read_policy: ReadPolicy, metrics: Arc<Metrics>) -> Self {
        metrics.device_connected.set(i64::from(device.is_some()));
        let reconciler = Reconciler::new(store.clone(), device, read_policy);
        Self {
            store,
            reconciler: Arc::new(Mutex::new(reconciler)),
            activity: Arc::new(RwLock::new(Activity::default())),
            metrics,
        }
    }

    pub async fn poll_once(&self) -> Result<TickOutcome, ReconcileError> {
        self.metrics.ticks_total.inc();
        let result = self.reconciler.lock().await.tick().await;
        match &result {
            Ok(TickOutcome::Applied(dispatch)) => self.record(OutcomeSource::Poll, dispatch).await,
            Ok(_) => {}
            Err(err) => self.record_error(err).await,
        }
        result
    }

    /// Publish `raw` as the current command and dispatch it right away.
    ///
    /// The dispatch happens even when the same command was applied last; the
    /// following poll tick then sees it as unchanged.
    pub async fn issue(&self, raw: &str) -> Result<Dispatch, ReconcileError> {
        let command = Command::parse(raw);
        let result = {
            let mut reconciler = self.reconciler.lock().await;
            if command.needs_device() && !reconciler.is_connected() {
                Err(ReconcileError::Disconnected(command))
            } else {
                match self.store.set_command(&CommandRecord::new(raw)).await {
                    Ok(()) => reconciler.apply(command).await,
                    Err(err) => Err(err.into()),
                }
            }
        };
        match &result {
            Ok(dispatch) => self.record(OutcomeSource::Api, dispatch).await,
            Err(err) => self.record_error(err).await,
        }
        result
    }

    pub async fn response(&self) -> Result<ResponseRecord, StoreError> {
        let result = self.store.get_response().await;
        if result.is_err() {
            self.metrics.store_errors_total.inc();
        }
        result
    }

    pub async fn is_connected(&self) -> bool {
        self.reconciler.lock().await.is_connected()
    }

    pub async fn status(&self) -> BridgeStatus {
        let (connected, port, last_executed) = {
            let reconciler = self.reconciler.lock().await;
            (
                reconciler.is_connected(),
                reconciler.port_name().map(str::to_string),
                reconciler.last_executed().cloned(),
            )
        };
        let activity = self.activity.read().await;
        BridgeStatus {
            connected,
            port,
            last_executed,
            last_outcome: activity.last_outcome.clone(),
            last_error: activity.last_error.clone(),
        }
    }

    async fn record(&self, source: OutcomeSource, dispatch: &Dispatch) {
        let label = match dispatch.command {
            Command::Unknown(_) => "unknown",
            ref known => known.as_str(),
        };
        self.metrics.dispatches_total.with_label_values(&[label]).inc();
        let mut activity = self.activity.write().await;
        activity.last_outcome = Some(OutcomeRecord { at: Utc::now(), source, dispatch: dispatch.clone() });
    }

    async fn record_error(&self, err: &ReconcileError) {
        match err {
            ReconcileError::Store(StoreError::Decode(_)) => self.metrics.malformed_records_total.inc(),
            ReconcileError::Store(_) => self.metrics.store_errors_total.inc(),
            ReconcileError::Link(_) => self.metrics.device_errors_total.inc(),
            ReconcileError::Disconnected(_) => {}
        }
        let mut activity = self.activity.write().await;
        activity.last_error = Some(ErrorRecord { at: Utc::now(), message: err.to_string() });
    }
}

/// Tick the reconciler every `period` until `shutdown` flips.
pub async fn run_poll_loop<S, D>(service: BridgeService<S, D>, period: Duration, mut shutdown: watch::Receiver<bool>)
where
    S: StateStore + Clone,
    D: DeviceLink,
{
    info!(period_ms = period.as_millis() as u64, "Starting command poll loop");
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Last command refused for lack of a board; warn once per command
    let mut refused: Option<Command> = None;
    // Last decode failure of the command record; warn once per distinct failure
    let mut malformed: Option<String> = None;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match service.poll_once().await {
            Ok(TickOutcome::Applied(dispatch)) => {
                refused = None;
                malformed = None;
                debug!(command = %dispatch.command, "Poll tick dispatched");
            }
            Ok(_) => {
                refused = None;
                malformed = None;
            }
            Err(ReconcileError::Disconnected(command)) => {
                if refused.as_ref() != Some(&command) {
                    warn!(%command, "No device connected; command not dispatched");
                    refused = Some(command);
                }
            }
            Err(ReconcileError::Store(StoreError::Decode(err))) => {
                let message = err.to_string();
                if malformed.as_deref() != Some(message.as_str()) {
                    warn!(error = %message, "Command record is malformed; expected {{\"command\": \"<text>\"}}");
                    malformed = Some(message);
                }
            }
            Err(ReconcileError::Store(err)) => {
                warn!(error = %err, "Command store unreachable; retrying next interval");
            }
            Err(err) => error!(error = %err, "Dispatch failed"),
        }
    }
    info!("Command poll loop stopped");
}
