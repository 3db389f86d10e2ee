//! Run-time event types and the emitter the engine publishes through.
//!
//! Every consumer outside the engine (the canvas visualization, the
//! debugger, log panes) observes execution through these types; the engine
//! never exposes its internals directly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

/// Severity of a log entry in the per-run sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Success,
    Warn,
    Error,
}

/// One append-only log record. Carries the node id and timestamp so errors
/// can be traced after the run ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        LogEntry {
            level,
            message: message.into(),
            node_id: None,
            data: None,
            timestamp: Utc::now(),
        }
    }
}

/// A record of one value transmitted from a source node to a target node.
///
/// Appended in strict execution order; `history[0..=n]` is the replayable
/// state as of step n.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataFlowEvent {
    pub source_node_id: String,
    pub target_node_id: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl DataFlowEvent {
    pub fn new(source: impl Into<String>, target: impl Into<String>, data: Value) -> Self {
        DataFlowEvent {
            source_node_id: source.into(),
            target_node_id: target.into(),
            data,
            timestamp: Utc::now(),
        }
    }
}

/// Engine lifecycle events published to external observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted {
        run_id: String,
    },
    NodeStarted {
        node_id: String,
    },
    NodeFinished {
        node_id: String,
        outputs: Value,
    },
    NodeSkipped {
        node_id: String,
    },
    NodeFailed {
        node_id: String,
        error: String,
    },
    BranchSelected {
        node_id: String,
        handle: String,
    },
    DataFlow(DataFlowEvent),
    RunCompleted {
        outputs: Value,
    },
    RunFailed {
        error: String,
    },
    RunAborted {
        reason: String,
    },
}

/// Sender wrapper with an atomic active flag so emission is cheap to skip
/// when nobody is listening.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<EngineEvent>,
    active: Arc<AtomicBool>,
}

impl EventEmitter {
    pub fn new(tx: mpsc::Sender<EngineEvent>, active: Arc<AtomicBool>) -> Self {
        EventEmitter { tx, active }
    }

    /// Create an emitter together with its receiver.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (EventEmitter::new(tx, Arc::new(AtomicBool::new(true))), rx)
    }

    /// An emitter that drops everything.
    pub fn disabled() -> Self {
        let (tx, _rx) = mpsc::channel(1);
        EventEmitter::new(tx, Arc::new(AtomicBool::new(false)))
    }

    #[inline(always)]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }

    pub async fn emit(&self, event: EngineEvent) {
        if self.is_active() {
            let _ = self.tx.send(event).await;
        }
    }
}
