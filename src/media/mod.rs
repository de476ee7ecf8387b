//! Camera acquisition abstractions
//!
//! A [`CameraBackend`] hands out a [`MediaStream`]: the device handle owned by
//! the capture session. The stream owns one or more stoppable [`MediaTrack`]s
//! and exposes the most recent frame through a watch channel.
//!
//! Dropping a `MediaStream` stops every track it still owns, so the camera is
//! released on every exit path, including panics and process shutdown.

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::runtime::RuntimeFlavor;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Result;
use crate::video::format::{PixelFormat, Resolution};
use crate::video::frame::VideoFrame;

/// Receiver side of a stream's "latest frame" slot.
///
/// Holds `None` until the device delivers its first frame. The channel closes
/// when the producing track ends.
pub type FrameReceiver = watch::Receiver<Option<VideoFrame>>;

/// A single stoppable media source owned by a [`MediaStream`]
pub trait MediaTrack: Send {
    /// Human readable label (device name/path)
    fn label(&self) -> &str;

    /// Whether the track is still producing
    fn is_live(&self) -> bool;

    /// Stop the track and release its underlying resource.
    ///
    /// `MediaStream` calls this exactly once per track.
    fn stop(&mut self);
}

/// Requested capture parameters
#[derive(Debug, Clone, PartialEq)]
pub struct VideoConstraints {
    /// Explicit device, or None to let the backend pick one
    pub device: Option<PathBuf>,
    pub resolution: Resolution,
    pub format: PixelFormat,
    /// Desired frame rate (0 = driver default)
    pub fps: u32,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            device: None,
            resolution: Resolution::VGA,
            format: PixelFormat::Mjpeg,
            fps: 30,
        }
    }
}

/// Environment-provided camera acquisition
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Request a video-only stream.
    ///
    /// Fails with `AppError::CameraUnavailable` when permission is denied or
    /// no suitable device exists.
    async fn acquire(&self, constraints: &VideoConstraints) -> Result<MediaStream>;
}

/// Device handle for an acquired camera
pub struct MediaStream {
    device: String,
    tracks: Vec<Box<dyn MediaTrack>>,
    frames: FrameReceiver,
}

impl MediaStream {
    pub fn new(
        device: impl Into<String>,
        tracks: Vec<Box<dyn MediaTrack>>,
        frames: FrameReceiver,
    ) -> Self {
        Self {
            device: device.into(),
            tracks,
            frames,
        }
    }

    /// Device the stream was acquired from
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Number of tracks not yet stopped
    pub fn track_count(&self) -> usize {
        self.tracks.len()
    }

    /// True while the stream owns tracks and all of them are producing
    pub fn is_live(&self) -> bool {
        !self.tracks.is_empty() && self.tracks.iter().all(|t| t.is_live())
    }

    /// New receiver for the latest-frame slot (video sink attachment)
    pub fn frames(&self) -> FrameReceiver {
        self.frames.clone()
    }

    /// Stop every owned track. Returns the number of tracks stopped.
    ///
    /// Tracks are drained, so a second call (or the eventual drop) is a no-op.
    pub fn stop(&mut self) -> usize {
        let count = self.tracks.len();
        for mut track in self.tracks.drain(..) {
            debug!("Stopping track {}", track.label());
            track.stop();
        }
        if count > 0 {
            info!("Released camera {} ({} track(s))", self.device, count);
        }
        count
    }
}

impl Drop for MediaStream {
    /// Stopping a track may join its capture thread. On a multi-threaded
    /// runtime worker the join runs under `block_in_place` so other tasks
    /// migrate off this worker while it waits.
    fn drop(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        let on_multi_thread = tokio::runtime::Handle::try_current()
            .map(|h| h.runtime_flavor() == RuntimeFlavor::MultiThread)
            .unwrap_or(false);
        if on_multi_thread {
            tokio::task::block_in_place(|| self.stop());
        } else {
            self.stop();
        }
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("device", &self.device)
            .field("tracks", &self.tracks.len())
            .finish()
    }
}
