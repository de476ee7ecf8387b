use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::ConfigStore;
use crate::events::EventBus;
use crate::session::CaptureSessionManager;

/// Application-wide state shared across handlers
///
/// Handlers only read session state and forward start/stop intents to
/// `session`; the recognition loop is the only writer of the label.
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// Capture session manager (camera handle, loop, displayed label)
    pub session: Arc<CaptureSessionManager>,
    /// Event bus for real-time notifications
    pub events: Arc<EventBus>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(
        config: ConfigStore,
        session: Arc<CaptureSessionManager>,
        events: Arc<EventBus>,
        shutdown_tx: broadcast::Sender<()>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            session,
            events,
            shutdown_tx,
        })
    }

    /// Subscribe to shutdown signal
    pub fn shutdown_signal(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }
}
