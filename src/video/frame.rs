//! Video frame data structures

use bytes::Bytes;

use super::format::{PixelFormat, Resolution};

/// One captured frame: the raster the recognition loop snapshots
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// Raw frame data (cheap to clone)
    data: Bytes,
    /// Native frame resolution
    pub resolution: Resolution,
    /// Pixel format
    pub format: PixelFormat,
    /// Stride (bytes per line, 0 for compressed formats)
    pub stride: u32,
    /// Driver sequence number
    pub sequence: u64,
}

impl VideoFrame {
    pub fn new(
        data: Bytes,
        resolution: Resolution,
        format: PixelFormat,
        stride: u32,
        sequence: u64,
    ) -> Self {
        Self {
            data,
            resolution,
            format,
            stride,
            sequence,
        }
    }

    pub fn from_vec(
        data: Vec<u8>,
        resolution: Resolution,
        format: PixelFormat,
        stride: u32,
        sequence: u64,
    ) -> Self {
        Self::new(Bytes::from(data), resolution, format, stride, sequence)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.resolution.width
    }

    pub fn height(&self) -> u32 {
        self.resolution.height
    }

    /// False for zero-area or empty frames, which must never be encoded
    pub fn has_pixels(&self) -> bool {
        !self.resolution.is_empty() && !self.data.is_empty()
    }

    /// Validate JPEG frame data (SOI marker plus a plausible trailer)
    pub fn is_valid_jpeg(&self) -> bool {
        self.format.is_compressed() && is_valid_jpeg(&self.data)
    }
}

/// Check JPEG start/end markers.
///
/// Some UVC cameras pad MJPEG payloads, so `0xD900` and `0x0000` trailers
/// are accepted as well as a proper EOI.
pub fn is_valid_jpeg(data: &[u8]) -> bool {
    if data.len() < 125 {
        return false;
    }
    if data[0] != 0xFF || data[1] != 0xD8 {
        return false;
    }
    let end = data.len();
    let end_marker = ((data[end - 2] as u16) << 8) | data[end - 1] as u16;
    matches!(end_marker, 0xFFD9 | 0xD900 | 0x0000)
}
