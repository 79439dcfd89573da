//! Per-worker operational counters.
//!
//! Producers submit [`StatEvent`]s through a bounded channel; one consumer
//! task owns all writes to the table. When the channel is full, `add` waits
//! for room instead of dropping the event.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::AppError;

/// Counter kinds tracked per worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatKind {
    /// Backend adapter invoked.
    Scrapes,
    /// Items returned by successful calls.
    ReturnedItems,
    /// Validation failures and generic backend failures.
    Errors,
    /// No usable credential, or the provider rejected one.
    AuthErrors,
    /// Provider throttled the credential in use.
    RateLimitErrors,
}

impl StatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatKind::Scrapes => "scrapes",
            StatKind::ReturnedItems => "returned_items",
            StatKind::Errors => "errors",
            StatKind::AuthErrors => "auth_errors",
            StatKind::RateLimitErrors => "rate_limit_errors",
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One counter increment attributed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEvent {
    pub worker_id: String,
    pub kind: StatKind,
    pub delta: u64,
}

/// Static process details reported alongside the counters.
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// Queue capacity before `add` starts applying backpressure.
    pub buffer: usize,
    pub worker_version: String,
    pub application_version: String,
    pub capabilities: Vec<String>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            buffer: 1024,
            worker_version: "v1".to_string(),
            application_version: env!("CARGO_PKG_VERSION").to_string(),
            capabilities: Vec::new(),
        }
    }
}

impl StatsConfig {
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<String>) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_worker_version(mut self, version: impl Into<String>) -> Self {
        self.worker_version = version.into();
        self
    }
}

/// The aggregated table. Only the consumer task mutates `stats`.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub boot_time: DateTime<Utc>,
    pub last_operation_time: Option<DateTime<Utc>>,
    pub stats: BTreeMap<String, BTreeMap<StatKind, u64>>,
    pub reported_capabilities: Vec<String>,
    pub worker_version: String,
    pub application_version: String,
}

impl WorkerStats {
    fn new(config: &StatsConfig) -> Self {
        Self {
            boot_time: Utc::now(),
            last_operation_time: None,
            stats: BTreeMap::new(),
            reported_capabilities: config.capabilities.clone(),
            worker_version: config.worker_version.clone(),
            application_version: config.application_version.clone(),
        }
    }

    fn apply(&mut self, event: StatEvent) {
        *self
            .stats
            .entry(event.worker_id)
            .or_default()
            .entry(event.kind)
            .or_insert(0) += event.delta;
        self.last_operation_time = Some(Utc::now());
    }

    /// Count for `(worker_id, kind)`, zero when never recorded.
    pub fn get(&self, worker_id: &str, kind: StatKind) -> u64 {
        self.stats
            .get(worker_id)
            .and_then(|row| row.get(&kind))
            .copied()
            .unwrap_or(0)
    }
}

/// A telemetry read: the table plus the time it was taken.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    #[serde(flatten)]
    pub stats: WorkerStats,
    pub current_time: DateTime<Utc>,
}

enum Command {
    Add(StatEvent),
    Flush(oneshot::Sender<()>),
}

/// Producer handle to the stats consumer. Cheap to clone.
#[derive(Clone)]
pub struct StatsCollector {
    tx: mpsc::Sender<Command>,
    table: Arc<Mutex<WorkerStats>>,
}

impl StatsCollector {
    /// Spawn the consumer task and return a producer handle.
    ///
    /// The task ends once every handle has been dropped and the queue is
    /// drained.
    pub fn start(config: StatsConfig) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let table = Arc::new(Mutex::new(WorkerStats::new(&config)));
        let consumer = tokio::spawn(consume(rx, Arc::clone(&table)));

        (Self { tx, table }, consumer)
    }

    /// Submit an increment. Waits while the queue is full.
    pub async fn add(&self, worker_id: &str, kind: StatKind, delta: u64) {
        let event = StatEvent {
            worker_id: worker_id.to_string(),
            kind,
            delta,
        };
        if self.tx.send(Command::Add(event)).await.is_err() {
            tracing::warn!(%worker_id, %kind, delta, "Stats consumer stopped, increment lost");
        }
    }

    /// Resolve once every event submitted before this call has been applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Command::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }

    pub fn set_capabilities(&self, capabilities: Vec<String>) {
        lock_table(&self.table).reported_capabilities = capabilities;
    }

    /// Point-in-time copy of the table.
    pub fn snapshot(&self) -> StatsSnapshot {
        let stats = lock_table(&self.table).clone();
        StatsSnapshot {
            stats,
            current_time: Utc::now(),
        }
    }

    /// Serialize a snapshot while holding the table lock.
    pub fn to_json(&self) -> Result<serde_json::Value, AppError> {
        let table = lock_table(&self.table);
        let mut value = serde_json::to_value(&*table)?;
        if let Some(object) = value.as_object_mut() {
            object.insert(
                "current_time".to_string(),
                serde_json::to_value(Utc::now())?,
            );
        }
        Ok(value)
    }
}

fn lock_table(table: &Mutex<WorkerStats>) -> std::sync::MutexGuard<'_, WorkerStats> {
    table.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Recovered from poisoned stats mutex");
        poisoned.into_inner()
    })
}

async fn consume(mut rx: mpsc::Receiver<Command>, table: Arc<Mutex<WorkerStats>>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Add(event) => {
                tracing::trace!(worker_id = %event.worker_id, kind = %event.kind, delta = event.delta, "Stat applied");
                lock_table(&table).apply(event);
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Stats consumer stopped");
}
