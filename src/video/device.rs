//! V4L2 device enumeration and capability query

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use v4l::capability::Flags;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use super::format::{PixelFormat, Resolution};
use crate::error::{AppError, Result};

/// Information about a camera
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoDeviceInfo {
    /// Device path (e.g., /dev/video0)
    pub path: PathBuf,
    /// Card name reported by the driver
    pub name: String,
    pub driver: String,
    pub bus_info: String,
    /// Supported pixel formats, best first
    pub formats: Vec<FormatInfo>,
    /// Priority score for automatic selection (higher is better)
    pub priority: u32,
}

/// Information about a supported format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatInfo {
    pub format: PixelFormat,
    /// Supported resolutions, largest first
    pub resolutions: Vec<Resolution>,
    pub description: String,
}

/// Open handle used only for querying
pub struct VideoDevice {
    pub path: PathBuf,
    device: Device,
}

impl VideoDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        debug!("Opening video device: {:?}", path);

        let device = Device::with_path(&path)
            .map_err(|e| AppError::camera(path.display().to_string(), &e))?;

        Ok(Self { path, device })
    }

    /// Query capabilities and formats. Returns None for non-capture nodes
    /// (UVC cameras expose a metadata node next to the video one).
    pub fn info(&self) -> Result<Option<VideoDeviceInfo>> {
        let caps = self.device.query_caps().map_err(|e| {
            AppError::VideoError(format!("Failed to query capabilities: {}", e))
        })?;

        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            return Ok(None);
        }

        let formats = self.enumerate_formats()?;
        if formats.is_empty() {
            return Ok(None);
        }
        let priority = calculate_priority(&caps.driver, &formats);

        Ok(Some(VideoDeviceInfo {
            path: self.path.clone(),
            name: caps.card,
            driver: caps.driver,
            bus_info: caps.bus,
            formats,
            priority,
        }))
    }

    fn enumerate_formats(&self) -> Result<Vec<FormatInfo>> {
        let descs = self.device.enum_formats().map_err(|e| {
            AppError::VideoError(format!("Failed to enumerate formats: {}", e))
        })?;

        let mut formats: Vec<FormatInfo> = descs
            .into_iter()
            .filter_map(|desc| match PixelFormat::from_fourcc(desc.fourcc) {
                Some(format) => Some(FormatInfo {
                    format,
                    resolutions: self.enumerate_resolutions(desc.fourcc),
                    description: desc.description,
                }),
                None => {
                    debug!("Skipping unsupported format: {}", desc.fourcc);
                    None
                }
            })
            .collect();

        formats.sort_by(|a, b| b.format.priority().cmp(&a.format.priority()));
        Ok(formats)
    }

    fn enumerate_resolutions(&self, fourcc: FourCC) -> Vec<Resolution> {
        let mut resolutions = Vec::new();

        match self.device.enum_framesizes(fourcc) {
            Ok(sizes) => {
                for size in sizes {
                    match size.size {
                        v4l::framesize::FrameSizeEnum::Discrete(d) => {
                            resolutions.push(Resolution::new(d.width, d.height));
                        }
                        v4l::framesize::FrameSizeEnum::Stepwise(s) => {
                            // Offer the common webcam sizes that fit the range
                            for res in [
                                Resolution::QVGA,
                                Resolution::VGA,
                                Resolution::HD720,
                                Resolution::HD1080,
                            ] {
                                if (s.min_width..=s.max_width).contains(&res.width)
                                    && (s.min_height..=s.max_height).contains(&res.height)
                                {
                                    resolutions.push(res);
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => debug!("Failed to enumerate frame sizes for {}: {}", fourcc, e),
        }

        resolutions.sort_by(|a, b| b.pixels().cmp(&a.pixels()));
        resolutions.dedup();
        resolutions
    }
}

/// Score a camera for automatic selection
fn calculate_priority(driver: &str, formats: &[FormatInfo]) -> u32 {
    let mut priority = 0u32;

    // Compressed output means no re-encode per cycle
    if formats.iter().any(|f| f.format.is_compressed()) {
        priority += 100;
    }

    // Anything that can do VGA is plenty for hand landmarks
    if formats
        .iter()
        .any(|f| f.resolutions.iter().any(|r| r.pixels() >= Resolution::VGA.pixels()))
    {
        priority += 50;
    }

    if driver.contains("uvcvideo") {
        priority += 25;
    }

    priority
}

/// Enumerate all video capture devices, best first
pub fn enumerate_devices() -> Result<Vec<VideoDeviceInfo>> {
    let mut devices = Vec::new();

    let entries = std::fs::read_dir("/dev")
        .map_err(|e| AppError::VideoError(format!("Failed to read /dev: {}", e)))?;

    for entry in entries.flatten() {
        let path = entry.path();
        let is_video_node = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("video"));
        if !is_video_node {
            continue;
        }

        match VideoDevice::open(&path).and_then(|d| d.info()) {
            Ok(Some(info)) => {
                debug!(
                    "Found camera: {} ({}) - {} formats",
                    info.name,
                    info.driver,
                    info.formats.len()
                );
                devices.push(info);
            }
            Ok(None) => debug!("Skipping non-capture node: {:?}", path),
            Err(e) => debug!("Failed to query {:?}: {}", path, e),
        }
    }

    devices.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.path.cmp(&b.path)));

    info!("Found {} camera(s)", devices.len());
    Ok(devices)
}

/// Pick the camera to use when none is configured
pub fn find_best_device() -> Result<VideoDeviceInfo> {
    enumerate_devices()?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::CameraUnavailable {
            device: "auto".to_string(),
            reason: "no video capture devices found".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: PixelFormat, resolutions: Vec<Resolution>) -> FormatInfo {
        FormatInfo {
            format,
            resolutions,
            description: String::new(),
        }
    }

    #[test]
    fn test_mjpeg_camera_ranks_higher() {
        let mjpeg = vec![format(PixelFormat::Mjpeg, vec![Resolution::HD720])];
        let raw = vec![format(PixelFormat::Yuyv, vec![Resolution::HD720])];

        assert!(calculate_priority("uvcvideo", &mjpeg) > calculate_priority("uvcvideo", &raw));
    }

    #[test]
    fn test_small_sensor_ranks_lower() {
        let small = vec![format(PixelFormat::Yuyv, vec![Resolution::QVGA])];
        let vga = vec![format(PixelFormat::Yuyv, vec![Resolution::VGA])];

        assert!(calculate_priority("other", &vga) > calculate_priority("other", &small));
    }
}
