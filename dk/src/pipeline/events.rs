//! Progress bus and cooperative stop signal
//!
//! The coordinator emits a [`PipelineEvent`] for every state change, every
//! operation it starts or finishes, and every warning. Subscribers (the CLI
//! progress printer, tests) are optional; with none, events are dropped.

use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::ledger::EntryStatus;
use super::state::RunState;
use crate::domain::NodeId;
use crate::planning::OperationKind;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Observable pipeline activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    StateChanged {
        run_id: String,
        from: RunState,
        to: RunState,
    },
    OperationStarted {
        run_id: String,
        node: NodeId,
        kind: OperationKind,
        label: String,
    },
    OperationFinished {
        run_id: String,
        node: NodeId,
        kind: OperationKind,
        status: EntryStatus,
        external_ref: Option<String>,
        detail: Option<String>,
    },
    Warning {
        run_id: String,
        message: String,
    },
}

impl PipelineEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "state_changed",
            Self::OperationStarted { .. } => "operation_started",
            Self::OperationFinished { .. } => "operation_finished",
            Self::Warning { .. } => "warning",
        }
    }

    pub fn run_id(&self) -> &str {
        match self {
            Self::StateChanged { run_id, .. }
            | Self::OperationStarted { run_id, .. }
            | Self::OperationFinished { run_id, .. }
            | Self::Warning { run_id, .. } => run_id,
        }
    }
}

/// Broadcast channel for pipeline progress
pub struct ProgressBus {
    tx: broadcast::Sender<PipelineEvent>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "ProgressBus::new: creating progress bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Receives every event emitted after subscription
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        debug!("ProgressBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Emitter bound to one run
    pub fn emitter_for(&self, run_id: impl Into<String>) -> ProgressEmitter {
        ProgressEmitter {
            tx: Some(self.tx.clone()),
            run_id: run_id.into(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

/// Next event for a subscriber, or `None` once every emitter is gone
///
/// A subscriber that falls behind loses the overwritten events but keeps
/// receiving newer ones.
pub async fn next_event(rx: &mut broadcast::Receiver<PipelineEvent>) -> Option<PipelineEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "next_event: subscriber lagged, events dropped");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Cheap-to-clone handle that stamps events with the run id
#[derive(Clone)]
pub struct ProgressEmitter {
    tx: Option<broadcast::Sender<PipelineEvent>>,
    run_id: String,
}

impl ProgressEmitter {
    /// Emitter with no bus behind it
    pub fn detached(run_id: impl Into<String>) -> Self {
        Self {
            tx: None,
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn emit(&self, event: PipelineEvent) {
        debug!(event_type = event.event_type(), run_id = %self.run_id, "ProgressEmitter::emit");
        if let Some(tx) = &self.tx {
            // No subscribers is fine
            let _ = tx.send(event);
        }
    }

    pub fn state_changed(&self, from: RunState, to: RunState) {
        self.emit(PipelineEvent::StateChanged {
            run_id: self.run_id.clone(),
            from,
            to,
        });
    }

    pub fn operation_started(&self, node: NodeId, kind: OperationKind, label: &str) {
        self.emit(PipelineEvent::OperationStarted {
            run_id: self.run_id.clone(),
            node,
            kind,
            label: label.to_string(),
        });
    }

    pub fn operation_finished(
        &self,
        node: NodeId,
        kind: OperationKind,
        status: EntryStatus,
        external_ref: Option<String>,
        detail: Option<String>,
    ) {
        self.emit(PipelineEvent::OperationFinished {
            run_id: self.run_id.clone(),
            node,
            kind,
            status,
            external_ref,
            detail,
        });
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.emit(PipelineEvent::Warning {
            run_id: self.run_id.clone(),
            message: message.into(),
        });
    }
}

/// Cooperative cancellation flag, checked before each operation starts
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Arc<AtomicBool>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        debug!("StopSignal::stop: stop requested");
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let bus = ProgressBus::with_default_capacity();
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("run-1");

        emitter.state_changed(RunState::Idle, RunState::Extracting);
        emitter.warning("type lookup failed");

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "state_changed");
        assert_eq!(first.run_id(), "run-1");
        let second = rx.recv().await.unwrap();
        assert_eq!(
            second,
            PipelineEvent::Warning {
                run_id: "run-1".to_string(),
                message: "type lookup failed".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_receiving() {
        let bus = ProgressBus::new(2);
        let mut rx = bus.subscribe();
        let emitter = bus.emitter_for("run-1");
        for i in 0..5 {
            emitter.warning(format!("warning {}", i));
        }
        drop(emitter);
        drop(bus);

        let mut messages = Vec::new();
        while let Some(event) = next_event(&mut rx).await {
            if let PipelineEvent::Warning { message, .. } = event {
                messages.push(message);
            }
        }
        assert_eq!(messages, vec!["warning 3", "warning 4"]);
    }

    #[test]
    fn test_emit_without_subscribers_is_ok() {
        let bus = ProgressBus::new(4);
        bus.emitter_for("run").warning("nobody listening");
        ProgressEmitter::detached("run").warning("no bus at all");
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_stop_signal_shared_between_clones() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_stopped());
        signal.stop();
        assert!(clone.is_stopped());
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PipelineEvent::Warning {
            run_id: "r".to_string(),
            message: "m".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "warning");
    }
}
