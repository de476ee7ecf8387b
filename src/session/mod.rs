//! Capture session: camera lifecycle, recognition loop and displayed label

pub mod frame_loop;
pub mod label;
pub mod manager;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use frame_loop::{CycleOutcome, FrameLoop, LoopExit};
pub use label::DisplayedLabel;
pub use manager::{CaptureSessionManager, SessionConfig};

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Inactive,
    Active,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        matches!(self, SessionState::Active)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Inactive => write!(f, "inactive"),
            SessionState::Active => write!(f, "active"),
        }
    }
}

/// Snapshot of the session as shown to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub label: String,
    /// Device backing the active session
    pub device: Option<String>,
    pub session_id: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    /// User-facing notice from the last failure (camera unavailable, unplugged)
    pub notice: Option<String>,
}
