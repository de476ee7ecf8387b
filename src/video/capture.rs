//! V4L2 camera backend
//!
//! Each acquired stream runs a dedicated capture thread that dequeues
//! memory-mapped buffers and publishes the newest frame into a watch slot.
//! The thread is the stream's only track: stopping the track raises the stop
//! flag and joins the thread, which turns streaming off and closes the device.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, Format};

use super::device::find_best_device;
use super::format::{PixelFormat, Resolution};
use super::frame::VideoFrame;
use crate::error::{AppError, Result};
use crate::media::{CameraBackend, MediaStream, MediaTrack, VideoConstraints};
use crate::utils::LogThrottler;
use crate::{error_throttled, warn_throttled};

/// Default number of capture buffers (2 keeps latency low)
const DEFAULT_BUFFER_COUNT: u32 = 2;
/// Poll timeout per dequeue; bounds how long a stop request waits
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);
/// Minimum valid frame size (bytes)
const MIN_FRAME_SIZE: usize = 128;

/// Negotiated capture format reported back to the acquiring task
#[derive(Debug, Clone, Copy)]
struct Negotiated {
    resolution: Resolution,
    format: PixelFormat,
    stride: u32,
}

/// Camera backend backed by Video4Linux2
#[derive(Debug, Clone)]
pub struct V4l2Camera {
    buffer_count: u32,
    timeout: Duration,
}

impl Default for V4l2Camera {
    fn default() -> Self {
        Self {
            buffer_count: DEFAULT_BUFFER_COUNT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl V4l2Camera {
    pub fn new() -> Self {
        Self::default()
    }

    async fn resolve_device(constraints: &VideoConstraints) -> Result<PathBuf> {
        if let Some(path) = &constraints.device {
            return Ok(path.clone());
        }
        let best = tokio::task::spawn_blocking(find_best_device)
            .await
            .map_err(|e| AppError::Internal(format!("Device scan task failed: {}", e)))??;
        info!("Auto-selected camera {} ({:?})", best.name, best.path);
        Ok(best.path)
    }
}

#[async_trait]
impl CameraBackend for V4l2Camera {
    async fn acquire(&self, constraints: &VideoConstraints) -> Result<MediaStream> {
        let device_path = Self::resolve_device(constraints).await?;
        let label = device_path.display().to_string();

        info!(
            "Acquiring camera {} at {} {}",
            label, constraints.resolution, constraints.format
        );

        let (frame_tx, frame_rx) = watch::channel(None);
        let (ready_tx, ready_rx) = oneshot::channel();
        let stop_flag = Arc::new(AtomicBool::new(false));
        let live = Arc::new(AtomicBool::new(true));

        let ctx = CaptureContext {
            device_path,
            constraints: constraints.clone(),
            buffer_count: self.buffer_count,
            timeout: self.timeout,
            stop_flag: stop_flag.clone(),
            live: live.clone(),
        };

        let handle = std::thread::Builder::new()
            .name("v4l2-capture".to_string())
            .spawn(move || capture_thread(ctx, frame_tx, ready_tx))?;

        let negotiated = match ready_rx.await {
            Ok(Ok(negotiated)) => negotiated,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(AppError::CameraUnavailable {
                    device: label,
                    reason: "capture thread exited during setup".to_string(),
                });
            }
        };

        info!(
            "Camera {} streaming {} {} stride={}",
            label, negotiated.resolution, negotiated.format, negotiated.stride
        );

        let track = V4l2VideoTrack {
            label: label.clone(),
            stop_flag,
            live,
            handle: Some(handle),
        };

        Ok(MediaStream::new(label, vec![Box::new(track)], frame_rx))
    }
}

/// The capture thread behind a V4L2 stream
pub struct V4l2VideoTrack {
    label: String,
    stop_flag: Arc<AtomicBool>,
    live: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MediaTrack for V4l2VideoTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Capture thread for {} panicked", self.label);
            }
        }
        self.live.store(false, Ordering::SeqCst);
    }
}

struct CaptureContext {
    device_path: PathBuf,
    constraints: VideoConstraints,
    buffer_count: u32,
    timeout: Duration,
    stop_flag: Arc<AtomicBool>,
    live: Arc<AtomicBool>,
}

fn capture_thread(
    ctx: CaptureContext,
    frame_tx: watch::Sender<Option<VideoFrame>>,
    ready_tx: oneshot::Sender<Result<Negotiated>>,
) {
    let label = ctx.device_path.display().to_string();

    let (device, negotiated) = match open_device(&ctx) {
        Ok(opened) => opened,
        Err(e) => {
            ctx.live.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    let mut stream = match Stream::with_buffers(&device, Type::VideoCapture, ctx.buffer_count) {
        Ok(stream) => stream,
        Err(e) => {
            ctx.live.store(false, Ordering::SeqCst);
            let _ = ready_tx.send(Err(AppError::camera(label, &e)));
            return;
        }
    };
    stream.set_timeout(ctx.timeout);

    if ready_tx.send(Ok(negotiated)).is_err() {
        // Acquiring task went away before we were ready
        ctx.live.store(false, Ordering::SeqCst);
        return;
    }

    run_capture(&ctx, &label, negotiated, &mut stream, &frame_tx);

    ctx.live.store(false, Ordering::SeqCst);
    // Dropping the stream issues STREAMOFF and unmaps the buffers; dropping
    // the sender closes every frame receiver.
    drop(stream);
    drop(frame_tx);
    debug!("Capture thread for {} exited", label);
}

fn open_device(ctx: &CaptureContext) -> Result<(Device, Negotiated)> {
    let label = ctx.device_path.display().to_string();
    let device = Device::with_path(&ctx.device_path).map_err(|e| AppError::camera(&label, &e))?;

    let requested = Format::new(
        ctx.constraints.resolution.width,
        ctx.constraints.resolution.height,
        ctx.constraints.format.to_fourcc(),
    );
    let actual = device
        .set_format(&requested)
        .map_err(|e| AppError::camera(&label, &e))?;

    let format = PixelFormat::from_fourcc(actual.fourcc).ok_or_else(|| {
        AppError::CameraUnavailable {
            device: label.clone(),
            reason: format!("driver chose unsupported pixel format {}", actual.fourcc),
        }
    })?;
    let resolution = Resolution::new(actual.width, actual.height);
    if resolution != ctx.constraints.resolution {
        warn!(
            "Requested {}, camera delivers {}",
            ctx.constraints.resolution, resolution
        );
    }

    let stride = if actual.stride > 0 {
        actual.stride
    } else {
        format.min_stride(resolution.width).unwrap_or(0)
    };

    if ctx.constraints.fps > 0 {
        if let Err(e) = device.set_params(&Parameters::with_fps(ctx.constraints.fps)) {
            warn!("Failed to set frame rate: {}", e);
        }
    }

    Ok((
        device,
        Negotiated {
            resolution,
            format,
            stride,
        },
    ))
}

fn run_capture(
    ctx: &CaptureContext,
    label: &str,
    negotiated: Negotiated,
    stream: &mut Stream<'_>,
    frame_tx: &watch::Sender<Option<VideoFrame>>,
) {
    let throttler = LogThrottler::with_secs(5);

    while !ctx.stop_flag.load(Ordering::Relaxed) {
        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {
                warn_throttled!(
                    throttler,
                    "capture_timeout",
                    "Capture timeout on {} - camera not delivering frames",
                    label
                );
                continue;
            }
            Err(e) if is_device_lost(&e) => {
                error!("Camera {} lost: {}", label, e);
                return;
            }
            Err(e) => {
                error_throttled!(throttler, "capture_error", "Capture error on {}: {}", label, e);
                continue;
            }
        };

        let used = (meta.bytesused as usize).min(buf.len());
        if used < MIN_FRAME_SIZE {
            debug!("Dropping small frame: {} bytes", used);
            continue;
        }

        let frame = VideoFrame::new(
            bytes::Bytes::copy_from_slice(&buf[..used]),
            negotiated.resolution,
            negotiated.format,
            negotiated.stride,
            meta.sequence as u64,
        );
        frame_tx.send_replace(Some(frame));
    }

    info!("Capture on {} stopped", label);
}

/// Errors after which the device node is gone for good
fn is_device_lost(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(6)      // ENXIO - No such device or address
            | Some(19)  // ENODEV - No such device
            | Some(5)   // EIO - I/O error (device removed)
            | Some(32)  // EPIPE - Broken pipe
            | Some(108) // ESHUTDOWN - Transport endpoint shutdown
    )
}
