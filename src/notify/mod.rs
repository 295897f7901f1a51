//! One-way notification bus
//!
//! Events describe what the engine did for an outside presentation layer.
//! Nothing in the engine reads them back.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::core::types::AttemptId;

/// How an attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// Script walked to the end, or the battle ended while waiting
    Completed,
    /// A step reported failure while the battle was still live
    StepFailed { index: usize },
    /// The battle was forfeited on purpose
    Abandoned,
    /// The battle screen never appeared
    NotStarted,
    Cancelled,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Completed)
    }
}

/// Events emitted by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "what", content = "details")]
pub enum CopilotEvent {
    CopilotAction {
        action: String,
        target: String,
        doc: String,
        doc_color: String,
    },
    UnsupportedStage {
        stage: String,
    },
    StageRecognized {
        stage: String,
    },
    Settlement {
        why: String,
    },
    AttemptStarted {
        stage: String,
        attempt: u32,
        attempt_id: AttemptId,
    },
    AttemptFinished {
        stage: String,
        attempt: u32,
        outcome: AttemptOutcome,
    },
}

/// Receiver of engine events
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: &CopilotEvent);
}

/// Forwards events to the log
#[derive(Debug, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, event: &CopilotEvent) {
        match serde_json::to_string(event) {
            Ok(json) => tracing::info!(event = %json, "notification"),
            Err(e) => tracing::warn!(error = %e, "unserializable notification"),
        }
    }
}

/// Forwards every event to several sinks, in order
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }
}

impl NotificationSink for FanoutSink {
    fn notify(&self, event: &CopilotEvent) {
        for sink in &self.sinks {
            sink.notify(event);
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<CopilotEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<CopilotEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Action names in emission order
    pub fn actions(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                CopilotEvent::CopilotAction { action, .. } => Some(action),
                _ => None,
            })
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: &CopilotEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
