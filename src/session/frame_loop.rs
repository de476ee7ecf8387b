//! Frame recognition loop
//!
//! One cycle: snapshot the latest frame, encode it, submit it, apply the
//! outcome to the displayed label. The next cycle is only scheduled after the
//! previous one has been applied, and only while the session's active flag
//! is still set, so there is never more than one request in flight.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::label::{DisplayedLabel, NO_GESTURE, RECOGNITION_ERROR};
use crate::error::AppError;
use crate::error_throttled;
use crate::media::FrameReceiver;
use crate::recognition::{Prediction, Recognizer};
use crate::utils::LogThrottler;
use crate::video::JpegEncoder;

/// Default display refresh rate driving the reschedule tick
pub const DEFAULT_REFRESH: Duration = Duration::from_micros(16_667);

/// Result of a single cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No frame with pixels yet; nothing was submitted
    Skipped,
    /// Service named a sign
    Recognized(String),
    /// Service answered without a usable prediction
    NoGesture,
    /// Encoding or transport failed
    Failed,
}

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// Session was stopped
    Halted,
    /// The camera stopped producing (frame channel closed)
    DeviceLost,
}

pub struct FrameLoop {
    session_id: u64,
    frames: FrameReceiver,
    active: Arc<AtomicBool>,
    recognizer: Arc<dyn Recognizer>,
    label: Arc<DisplayedLabel>,
    encoder: JpegEncoder,
    refresh: Duration,
    throttler: LogThrottler,
}

impl FrameLoop {
    pub fn new(
        session_id: u64,
        frames: FrameReceiver,
        active: Arc<AtomicBool>,
        recognizer: Arc<dyn Recognizer>,
        label: Arc<DisplayedLabel>,
    ) -> Self {
        Self {
            session_id,
            frames,
            active,
            recognizer,
            label,
            encoder: JpegEncoder::default(),
            refresh: DEFAULT_REFRESH,
            throttler: LogThrottler::with_secs(5),
        }
    }

    pub fn with_encoder(mut self, encoder: JpegEncoder) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh.max(Duration::from_millis(1));
        self
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Drive cycles until the session goes inactive or the camera disappears
    pub async fn run(mut self) -> LoopExit {
        let mut tick = tokio::time::interval(self.refresh);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(session = self.session_id, "Recognition loop started");
        let mut cycles = 0u64;

        let exit = loop {
            if !self.is_active() {
                break LoopExit::Halted;
            }
            if self.frames.has_changed().is_err() {
                break LoopExit::DeviceLost;
            }

            let outcome = self.run_cycle().await;
            cycles += 1;
            debug!(session = self.session_id, cycle = cycles, ?outcome);

            // A stop that landed while the request was in flight ends the loop
            // here; its result has already been applied.
            if !self.is_active() {
                break LoopExit::Halted;
            }
            tick.tick().await;
        };

        info!(
            session = self.session_id,
            cycles,
            ?exit,
            "Recognition loop finished"
        );
        exit
    }

    /// Run one snapshot, encode, submit, interpret round
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let snapshot = self.frames.borrow().clone();
        let frame = match snapshot {
            Some(frame) if frame.has_pixels() => frame,
            _ => return CycleOutcome::Skipped,
        };

        let image = match self.encoder.encode_async(frame).await {
            Ok(image) => image,
            Err(AppError::EmptyFrame) => return CycleOutcome::Skipped,
            Err(e) => {
                warn!(session = self.session_id, "Failed to encode frame: {}", e);
                self.label.set(RECOGNITION_ERROR);
                return CycleOutcome::Failed;
            }
        };

        match self.recognizer.recognize(image).await {
            Ok(Prediction::Detected(label)) => {
                self.throttler.clear("recognition_transport");
                self.label.set(&label);
                CycleOutcome::Recognized(label)
            }
            Ok(Prediction::Nothing) => {
                self.throttler.clear("recognition_transport");
                self.label.set(NO_GESTURE);
                CycleOutcome::NoGesture
            }
            Err(e) => {
                error_throttled!(
                    self.throttler,
                    "recognition_transport",
                    "Error recognizing gesture: {}",
                    e
                );
                self.label.set(RECOGNITION_ERROR);
                CycleOutcome::Failed
            }
        }
    }
}
