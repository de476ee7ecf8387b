//! Capture session manager
//!
//! Owns the camera handle and gates the recognition loop on session
//! activity. The handle lives inside an [`ActiveSession`] that is present
//! exactly while the session is ACTIVE; dropping it (on `stop()`, on device
//! loss, or when the manager itself is dropped) clears the loop's active flag
//! and stops every track.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::frame_loop::{FrameLoop, LoopExit, DEFAULT_REFRESH};
use super::label::DisplayedLabel;
use super::{SessionState, SessionStatus};
use crate::error::{AppError, Result};
use crate::events::{EventBus, SystemEvent};
use crate::media::{CameraBackend, FrameReceiver, MediaStream, VideoConstraints};
use crate::recognition::Recognizer;
use crate::video::JpegEncoder;

/// Session parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub constraints: VideoConstraints,
    /// Reschedule tick of the recognition loop
    pub refresh: Duration,
    /// JPEG quality for raw frames, clamped by the encoder
    pub jpeg_quality: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            constraints: VideoConstraints::default(),
            refresh: DEFAULT_REFRESH,
            jpeg_quality: crate::video::jpeg::DEFAULT_QUALITY,
        }
    }
}

/// The device handle plus the flag its loop polls
struct ActiveSession {
    id: u64,
    stream: MediaStream,
    active: Arc<AtomicBool>,
    started_at: Instant,
    started_wall: DateTime<Utc>,
}

impl ActiveSession {
    fn is_live(&self) -> bool {
        self.active.load(Ordering::SeqCst) && self.stream.is_live()
    }

    /// Halt the loop and stop every track; returns the number of tracks stopped
    fn release(&mut self) -> usize {
        self.active.store(false, Ordering::SeqCst);
        self.stream.stop()
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

pub struct CaptureSessionManager {
    me: Weak<Self>,
    camera: Arc<dyn CameraBackend>,
    recognizer: Arc<dyn Recognizer>,
    config: SessionConfig,
    label: Arc<DisplayedLabel>,
    events: Arc<EventBus>,
    session: Mutex<Option<ActiveSession>>,
    state_tx: watch::Sender<SessionState>,
    notice: parking_lot::Mutex<Option<String>>,
    next_id: AtomicU64,
}

impl CaptureSessionManager {
    pub fn new(
        camera: Arc<dyn CameraBackend>,
        recognizer: Arc<dyn Recognizer>,
        config: SessionConfig,
        events: Arc<EventBus>,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(SessionState::Inactive);
        let label = Arc::new(DisplayedLabel::new(events.clone()));

        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            camera,
            recognizer,
            config,
            label,
            events,
            session: Mutex::new(None),
            state_tx,
            notice: parking_lot::Mutex::new(None),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn label(&self) -> &Arc<DisplayedLabel> {
        &self.label
    }

    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Last user-facing failure notice, if any
    pub fn notice(&self) -> Option<String> {
        self.notice.lock().clone()
    }

    /// Whether a device handle is currently held
    pub async fn has_handle(&self) -> bool {
        self.session.lock().await.is_some()
    }

    pub async fn status(&self) -> SessionStatus {
        let session = self.session.lock().await;
        SessionStatus {
            state: self.state(),
            label: self.label.get(),
            device: session.as_ref().map(|s| s.stream.device().to_string()),
            session_id: session.as_ref().map(|s| s.id),
            started_at: session.as_ref().map(|s| s.started_wall),
            notice: self.notice(),
        }
    }

    /// Latest-frame receiver of the active session (video sink attachment)
    pub async fn preview(&self) -> Option<FrameReceiver> {
        self.session.lock().await.as_ref().map(|s| s.stream.frames())
    }

    /// Acquire the camera and start the recognition loop.
    ///
    /// Calling this while a live session exists is a no-op. A handle whose
    /// tracks have died is released before a new one is acquired. On
    /// acquisition failure the session stays INACTIVE and a notice is set.
    pub async fn start(&self) -> Result<SessionState> {
        let mut slot = self.session.lock().await;

        if let Some(current) = slot.as_ref() {
            if current.is_live() {
                debug!("Session {} already active", current.id);
                return Ok(SessionState::Active);
            }
            warn!("Releasing stale camera handle of session {}", current.id);
            if let Some(stale) = slot.take() {
                self.set_state(SessionState::Inactive, None, None);
                if let Err(e) = Self::release(stale).await {
                    warn!("Failed to release stale camera handle: {}", e);
                }
            }
        }

        let stream = match self.camera.acquire(&self.config.constraints).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Failed to start capture session: {}", e);
                let (device, reason) = match &e {
                    AppError::CameraUnavailable { device, reason } => {
                        (device.clone(), reason.clone())
                    }
                    other => ("unknown".to_string(), other.to_string()),
                };
                *self.notice.lock() = Some(format!("Camera unavailable: {}", reason));
                self.events
                    .publish(SystemEvent::SessionCameraUnavailable { device, reason });
                self.set_state(SessionState::Inactive, None, None);
                return Err(e);
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let active = Arc::new(AtomicBool::new(true));
        let device = stream.device().to_string();
        let tracks = stream.track_count();

        let frame_loop = FrameLoop::new(
            id,
            stream.frames(),
            active.clone(),
            self.recognizer.clone(),
            self.label.clone(),
        )
        .with_encoder(JpegEncoder::new(self.config.jpeg_quality))
        .with_refresh(self.config.refresh);

        *slot = Some(ActiveSession {
            id,
            stream,
            active,
            started_at: Instant::now(),
            started_wall: Utc::now(),
        });
        self.notice.lock().take();
        self.set_state(SessionState::Active, Some(id), Some(device.clone()));
        info!(
            "Capture session {} started on {} ({} track(s))",
            id, device, tracks
        );

        let manager = self.me.clone();
        tokio::spawn(async move {
            if frame_loop.run().await == LoopExit::DeviceLost {
                if let Some(manager) = manager.upgrade() {
                    manager.release_lost(id).await;
                }
            }
        });

        Ok(SessionState::Active)
    }

    /// Stop the session and release the camera. No-op while inactive.
    ///
    /// An in-flight recognition request is not aborted; its result may still
    /// update the label before the loop halts.
    pub async fn stop(&self) -> Result<()> {
        let mut slot = self.session.lock().await;

        let Some(session) = slot.take() else {
            debug!("Stop requested while inactive");
            self.set_state(SessionState::Inactive, None, None);
            return Ok(());
        };

        // State follows the slot before the release is awaited, so a caller
        // dropping this future cannot leave ACTIVE without a handle.
        self.set_state(SessionState::Inactive, None, None);
        let id = session.id;
        let uptime = session.started_at.elapsed();
        let released = Self::release(session).await;

        info!(
            "Capture session {} stopped after {:.1}s",
            id,
            uptime.as_secs_f64()
        );
        released.map(|_| ())
    }

    /// Tear down a session whose camera disappeared
    async fn release_lost(&self, id: u64) {
        let mut slot = self.session.lock().await;

        // Already stopped or replaced
        if slot.as_ref().map(|s| s.id) != Some(id) {
            return;
        }
        let Some(session) = slot.take() else {
            return;
        };

        let device = session.stream.device().to_string();
        warn!("Camera {} lost during session {}", device, id);
        *self.notice.lock() = Some(format!("Camera {} was disconnected", device));
        self.events.publish(SystemEvent::SessionDeviceLost {
            session_id: id,
            device: device.clone(),
            reason: "camera stopped delivering frames".to_string(),
        });
        self.set_state(SessionState::Inactive, None, None);

        if let Err(e) = Self::release(session).await {
            warn!("Failed to release lost camera {}: {}", device, e);
        }
    }

    /// Stopping tracks can join a capture thread, so it runs off the runtime
    async fn release(mut session: ActiveSession) -> Result<usize> {
        let id = session.id;
        let released = tokio::task::spawn_blocking(move || session.release())
            .await
            .map_err(|e| AppError::Internal(format!("Failed to release camera: {}", e)))?;
        debug!("Session {} released {} track(s)", id, released);
        Ok(released)
    }

    fn set_state(&self, state: SessionState, session_id: Option<u64>, device: Option<String>) {
        let changed = self.state_tx.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if changed {
            self.events.publish(SystemEvent::SessionStateChanged {
                state,
                session_id,
                device,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::testing::FakeCamera;
    use crate::recognition::testing::{FakeRecognizer, Reply};
    use crate::session::label::LOADING;
    use crate::video::{PixelFormat, Resolution, VideoFrame};
    use futures::FutureExt;
    use tokio::sync::Notify;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(5);

    fn jpeg_frame() -> VideoFrame {
        let mut data = vec![0xFF, 0xD8];
        data.extend(vec![0x42u8; 256]);
        data.extend([0xFF, 0xD9]);
        VideoFrame::from_vec(data, Resolution::VGA, PixelFormat::Mjpeg, 0, 1)
    }

    fn config() -> SessionConfig {
        SessionConfig {
            refresh: Duration::from_millis(2),
            ..Default::default()
        }
    }

    fn manager(
        camera: Arc<FakeCamera>,
        recognizer: Arc<FakeRecognizer>,
    ) -> Arc<CaptureSessionManager> {
        CaptureSessionManager::new(camera, recognizer, config(), Arc::new(EventBus::new()))
    }

    async fn assert_invariant(manager: &CaptureSessionManager) {
        assert_eq!(
            manager.state() == SessionState::Active,
            manager.has_handle().await,
            "handle present iff ACTIVE"
        );
    }

    #[tokio::test]
    async fn test_start_then_stop() {
        let camera = Arc::new(FakeCamera::new(2));
        let manager = manager(camera.clone(), Arc::new(FakeRecognizer::new(Reply::Nothing)));

        assert_eq!(manager.state(), SessionState::Inactive);
        assert_eq!(manager.start().await.unwrap(), SessionState::Active);
        assert!(manager.has_handle().await);
        assert_eq!(manager.status().await.device.as_deref(), Some("fake"));

        manager.stop().await.unwrap();
        assert_eq!(manager.state(), SessionState::Inactive);
        assert!(!manager.has_handle().await);
        assert_eq!(camera.stop_count(), 2);
    }

    #[tokio::test]
    async fn test_stop_while_inactive_is_noop() {
        let camera = Arc::new(FakeCamera::new(1));
        let manager = manager(camera.clone(), Arc::new(FakeRecognizer::new(Reply::Nothing)));

        manager.stop().await.unwrap();
        manager.stop().await.unwrap();

        assert_eq!(manager.state(), SessionState::Inactive);
        assert_eq!(camera.stop_count(), 0);
        assert_eq!(camera.acquire_count(), 0);
    }

    #[tokio::test]
    async fn test_redundant_start_does_not_leak() {
        let camera = Arc::new(FakeCamera::new(3));
        let manager = manager(camera.clone(), Arc::new(FakeRecognizer::new(Reply::Nothing)));

        manager.start().await.unwrap();
        manager.start().await.unwrap();
        assert_eq!(camera.acquire_count(), 1);

        manager.stop().await.unwrap();
        manager.stop().await.unwrap();
        assert_eq!(camera.stop_count(), 3);
    }

    #[tokio::test]
    async fn test_stale_handle_is_replaced() {
        let camera = Arc::new(FakeCamera::new(2));
        let manager = manager(camera.clone(), Arc::new(FakeRecognizer::new(Reply::Nothing)));

        manager.start().await.unwrap();
        camera.kill_tracks();

        manager.start().await.unwrap();
        assert_eq!(camera.acquire_count(), 2);
        assert_eq!(camera.stop_count(), 2);
        assert_invariant(&manager).await;

        manager.stop().await.unwrap();
        assert_eq!(camera.stop_count(), 4);
    }

    #[tokio::test]
    async fn test_invariant_across_sequences() {
        let camera = Arc::new(FakeCamera::new(1));
        let manager = manager(camera.clone(), Arc::new(FakeRecognizer::new(Reply::Nothing)));

        for start in [true, true, false, false, true, false, true, true, false] {
            if start {
                manager.start().await.unwrap();
            } else {
                manager.stop().await.unwrap();
            }
            assert_invariant(&manager).await;
        }
        assert_eq!(camera.acquire_count(), camera.stop_count());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancelled_stop_keeps_invariant() {
        let camera = Arc::new(FakeCamera::new(2));
        let manager = manager(camera.clone(), Arc::new(FakeRecognizer::new(Reply::Nothing)));
        manager.start().await.unwrap();

        // Poll once so the slot is emptied, then abandon the call mid-release
        let pending = manager.stop().now_or_never();
        if pending.is_none() {
            assert_eq!(manager.state(), SessionState::Inactive);
        }
        assert_invariant(&manager).await;

        manager.stop().await.unwrap();
        assert_invariant(&manager).await;
        timeout(WAIT, async {
            while camera.stop_count() < 2 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        manager.start().await.unwrap();
        assert_invariant(&manager).await;
        assert_eq!(camera.acquire_count(), 2);
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_camera_unavailable() {
        let camera = Arc::new(FakeCamera::failing("permission denied"));
        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe();
        let manager = CaptureSessionManager::new(
            camera.clone(),
            Arc::new(FakeRecognizer::new(Reply::Nothing)),
            config(),
            events,
        );

        let result = manager.start().await;
        assert!(matches!(result, Err(AppError::CameraUnavailable { .. })));
        assert_eq!(manager.state(), SessionState::Inactive);
        assert!(!manager.has_handle().await);
        assert!(manager.notice().unwrap().contains("permission denied"));

        match rx.recv().await.unwrap() {
            SystemEvent::SessionCameraUnavailable { reason, .. } => {
                assert_eq!(reason, "permission denied")
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_rapid_start_stop_before_first_frame() {
        let camera = Arc::new(FakeCamera::new(1));
        let recognizer = Arc::new(FakeRecognizer::new(Reply::Label("Ka")));
        let manager = manager(camera.clone(), recognizer.clone());

        manager.start().await.unwrap();
        manager.stop().await.unwrap();

        assert_eq!(manager.state(), SessionState::Inactive);
        assert!(!manager.has_handle().await);
        assert_eq!(camera.stop_count(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(recognizer.calls(), 0);
        assert_eq!(manager.label().get(), LOADING);
    }

    #[tokio::test]
    async fn test_loop_updates_label() {
        let camera = Arc::new(FakeCamera::new(1));
        let manager = manager(camera.clone(), Arc::new(FakeRecognizer::new(Reply::Label("Ka"))));
        let mut label = manager.label().subscribe();

        manager.start().await.unwrap();
        camera.publish(jpeg_frame());

        timeout(WAIT, label.wait_for(|l| l == "Ka"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(manager.status().await.label, "Ka");

        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_does_not_abort_in_flight_request() {
        let camera = Arc::new(FakeCamera::new(1));
        let gate = Arc::new(Notify::new());
        let recognizer = Arc::new(FakeRecognizer::gated(Reply::Label("Ka"), gate.clone()));
        let manager = manager(camera.clone(), recognizer.clone());
        let mut label = manager.label().subscribe();

        manager.start().await.unwrap();
        camera.publish(jpeg_frame());
        timeout(WAIT, recognizer.entered.notified()).await.unwrap();

        manager.stop().await.unwrap();
        assert_eq!(manager.state(), SessionState::Inactive);
        gate.notify_one();

        // The in-flight result lands, then the loop halts
        timeout(WAIT, label.wait_for(|l| l == "Ka"))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(recognizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_device_lost_releases_handle() {
        let camera = Arc::new(FakeCamera::new(2));
        let events = Arc::new(EventBus::new());
        let mut rx = events.subscribe();
        let manager = CaptureSessionManager::new(
            camera.clone(),
            Arc::new(FakeRecognizer::new(Reply::Nothing)),
            config(),
            events,
        );
        let mut state = manager.subscribe_state();

        manager.start().await.unwrap();
        camera.unplug();

        timeout(WAIT, state.wait_for(|s| *s == SessionState::Inactive))
            .await
            .unwrap()
            .unwrap();
        assert!(!manager.has_handle().await);
        assert_eq!(camera.stop_count(), 2);
        assert!(manager.notice().unwrap().contains("disconnected"));

        let mut saw_lost = false;
        while let Ok(event) = rx.try_recv() {
            saw_lost |= matches!(event, SystemEvent::SessionDeviceLost { .. });
        }
        assert!(saw_lost);

        // Next start re-acquires
        manager.start().await.unwrap();
        assert_eq!(camera.acquire_count(), 2);
        assert!(manager.notice().is_none());
        manager.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_drop_releases_camera() {
        let camera = Arc::new(FakeCamera::new(2));
        let manager = manager(camera.clone(), Arc::new(FakeRecognizer::new(Reply::Nothing)));

        manager.start().await.unwrap();
        drop(manager);

        assert_eq!(camera.stop_count(), 2);
    }
}
