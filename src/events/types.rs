//! System event types
//!
//! Defines the events pushed to WebSocket clients and in-process subscribers.

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

/// System event enumeration
///
/// Serialized as `{"event": "<name>", "data": {...}}`:
/// ```json
/// {
///   "event": "recognition.label_changed",
///   "data": { "label": "Ka" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum SystemEvent {
    /// Session moved between INACTIVE and ACTIVE
    #[serde(rename = "session.state_changed")]
    SessionStateChanged {
        state: SessionState,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<u64>,
        /// Device backing the session (None when inactive)
        #[serde(skip_serializing_if = "Option::is_none")]
        device: Option<String>,
    },

    /// `start()` could not acquire a camera
    #[serde(rename = "session.camera_unavailable")]
    SessionCameraUnavailable { device: String, reason: String },

    /// The camera went away while the session was running
    #[serde(rename = "session.device_lost")]
    SessionDeviceLost {
        session_id: u64,
        device: String,
        reason: String,
    },

    /// The displayed label changed
    #[serde(rename = "recognition.label_changed")]
    RecognitionLabelChanged { label: String },

    /// WebSocket error notification (for connection-level errors like lag)
    #[serde(rename = "error")]
    Error { message: String },
}

impl SystemEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::SessionStateChanged { .. } => "session.state_changed",
            Self::SessionCameraUnavailable { .. } => "session.camera_unavailable",
            Self::SessionDeviceLost { .. } => "session.device_lost",
            Self::RecognitionLabelChanged { .. } => "recognition.label_changed",
            Self::Error { .. } => "error",
        }
    }

    /// Check if event name matches a topic pattern
    ///
    /// - `*` matches all events
    /// - `session.*` matches all session events
    /// - `session.state_changed` matches exactly
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();
        match topic.strip_suffix(".*") {
            Some(prefix) => event_name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.')),
            None => event_name == topic,
        }
    }
}
