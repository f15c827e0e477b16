//! Analysis event types and the broadcast event bus
//!
//! The scheduler publishes per-track phase status and progress here; the UI
//! (or the CLI's progress printer) subscribes. Events are broadcast, so a
//! late subscriber only sees events emitted after it subscribed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// The three analysis phases a track moves through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStage {
    Technical,
    Creative,
    Instrumentation,
}

impl AnalysisStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStage::Technical => "technical",
            AnalysisStage::Creative => "creative",
            AnalysisStage::Instrumentation => "instrumentation",
        }
    }
}

/// Per-stage lifecycle status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    Processing,
    Complete,
    Error,
}

/// Events emitted by the analysis scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnalysisEvent {
    /// A phase started, finished or failed for one track.
    PhaseStatus {
        /// Normalized track key.
        key: String,
        /// Path as submitted.
        path: String,
        stage: AnalysisStage,
        status: StageStatus,
        /// Human-readable note (error cause, status string).
        #[serde(skip_serializing_if = "Option::is_none")]
        note: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Coarse per-track progress for progress bars.
    ///
    /// `pct` takes the fixed steps 0, 25, 50, 75, 100.
    PhaseProgress {
        key: String,
        path: String,
        pct: u8,
        label: String,
        timestamp: DateTime<Utc>,
    },

    /// The technical phase finished and a partial record is available.
    TrackPartial {
        key: String,
        path: String,
        timestamp: DateTime<Utc>,
    },

    /// The merged record was written to disk and upserted into the store.
    TrackPersisted {
        key: String,
        path: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus carrying [`AnalysisEvent`]s to all subscribers.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AnalysisEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers.
    ///
    /// A send with no live subscribers is not an error for the pipeline;
    /// the event is simply dropped.
    pub fn emit(&self, event: AnalysisEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.emit(AnalysisEvent::PhaseProgress {
            key: "k".into(),
            path: "p".into(),
            pct: 25,
            label: "Technical complete".into(),
            timestamp: Utc::now(),
        });
        match rx.recv().await.expect("event") {
            AnalysisEvent::PhaseProgress { pct, .. } => assert_eq!(pct, 25),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn emit_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit(AnalysisEvent::TrackPartial {
            key: "k".into(),
            path: "p".into(),
            timestamp: Utc::now(),
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = AnalysisEvent::PhaseStatus {
            key: "k".into(),
            path: "p".into(),
            stage: AnalysisStage::Technical,
            status: StageStatus::Processing,
            note: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).expect("serializes");
        assert_eq!(json["type"], "PhaseStatus");
        assert_eq!(json["stage"], "technical");
        assert_eq!(json["status"], "PROCESSING");
    }
}
