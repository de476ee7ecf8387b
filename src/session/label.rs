//! The displayed recognition label

use std::sync::Arc;
use tokio::sync::watch;

use crate::events::{EventBus, SystemEvent};

/// Shown until the first cycle completes
pub const LOADING: &str = "Loading...";
/// Service answered without a usable prediction
pub const NO_GESTURE: &str = "No gesture detected";
/// Encoding or transport failure
pub const RECOGNITION_ERROR: &str = "Error recognizing gesture.";

/// Single mutable label observed by the presentation layer.
///
/// Only the recognition loop writes it. Observers either poll [`get`] or
/// hold a watch receiver from [`subscribe`]; every actual change is also
/// published as `recognition.label_changed`.
///
/// [`get`]: DisplayedLabel::get
/// [`subscribe`]: DisplayedLabel::subscribe
pub struct DisplayedLabel {
    tx: watch::Sender<String>,
    events: Arc<EventBus>,
}

impl DisplayedLabel {
    pub fn new(events: Arc<EventBus>) -> Self {
        let (tx, _rx) = watch::channel(LOADING.to_string());
        Self { tx, events }
    }

    pub fn get(&self) -> String {
        self.tx.borrow().clone()
    }

    /// Replace the label. Returns false when it already had this value.
    pub fn set(&self, label: &str) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if current == label {
                false
            } else {
                label.clone_into(current);
                true
            }
        });

        if changed {
            self.events.publish(SystemEvent::RecognitionLabelChanged {
                label: label.to_string(),
            });
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<String> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_loading() {
        let label = DisplayedLabel::new(Arc::new(EventBus::new()));
        assert_eq!(label.get(), LOADING);
    }

    #[tokio::test]
    async fn test_change_is_published_once() {
        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe();
        let label = DisplayedLabel::new(events.clone());

        assert!(label.set("Ka"));
        assert!(!label.set("Ka"));
        assert_eq!(label.get(), "Ka");

        match rx.recv().await.unwrap() {
            SystemEvent::RecognitionLabelChanged { label } => assert_eq!(label, "Ka"),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let label = DisplayedLabel::new(Arc::new(EventBus::new()));
        let mut rx = label.subscribe();

        label.set(NO_GESTURE);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), NO_GESTURE);
    }
}
