//! JPEG encoding for recognition uploads
//!
//! MJPEG cameras already hand us a JPEG per frame, which is uploaded as-is.
//! Raw formats go through libjpeg-turbo: packed 4:2:2 YUV is expanded to
//! RGB24 first, RGB/BGR/GREY rasters are compressed directly.

use bytes::Bytes;

use super::format::PixelFormat;
use super::frame::VideoFrame;
use crate::error::{AppError, Result};

/// Default JPEG quality for re-encoded frames
pub const DEFAULT_QUALITY: u32 = 80;

/// Byte order of a packed 4:2:2 macropixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Packed422 {
    Yuyv,
    Yvyu,
    Uyvy,
}

impl Packed422 {
    /// Offsets of (y0, u, y1, v) inside a 4-byte macropixel
    fn offsets(self) -> (usize, usize, usize, usize) {
        match self {
            Packed422::Yuyv => (0, 1, 2, 3),
            Packed422::Yvyu => (0, 3, 2, 1),
            Packed422::Uyvy => (1, 0, 3, 2),
        }
    }
}

/// Stateless JPEG encoder.
///
/// A turbojpeg compressor is created per call so the encoder can be moved
/// freely between tasks and onto the blocking pool.
#[derive(Debug, Clone, Copy)]
pub struct JpegEncoder {
    quality: u8,
}

impl Default for JpegEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_QUALITY)
    }
}

impl JpegEncoder {
    /// Quality outside 1..=100 is clamped
    pub fn new(quality: u32) -> Self {
        Self {
            quality: quality.clamp(1, 100) as u8,
        }
    }

    /// Encode a frame into a JPEG byte buffer.
    ///
    /// Zero-area frames are rejected with `AppError::EmptyFrame`.
    pub fn encode(&self, frame: &VideoFrame) -> Result<Bytes> {
        if !frame.has_pixels() {
            return Err(AppError::EmptyFrame);
        }

        match frame.format {
            PixelFormat::Mjpeg | PixelFormat::Jpeg => {
                if frame.is_valid_jpeg() {
                    Ok(frame.data_bytes())
                } else {
                    Err(AppError::Encoding(format!(
                        "corrupt {} frame ({} bytes)",
                        frame.format,
                        frame.len()
                    )))
                }
            }
            PixelFormat::Yuyv => self.encode_packed422(frame, Packed422::Yuyv),
            PixelFormat::Yvyu => self.encode_packed422(frame, Packed422::Yvyu),
            PixelFormat::Uyvy => self.encode_packed422(frame, Packed422::Uyvy),
            PixelFormat::Rgb24 => self.compress(frame, turbojpeg::PixelFormat::RGB),
            PixelFormat::Bgr24 => self.compress(frame, turbojpeg::PixelFormat::BGR),
            PixelFormat::Grey => self.compress(frame, turbojpeg::PixelFormat::GRAY),
        }
    }

    /// Encode on the blocking pool so the async loop never stalls on CPU work
    pub async fn encode_async(&self, frame: VideoFrame) -> Result<Bytes> {
        let encoder = *self;
        tokio::task::spawn_blocking(move || encoder.encode(&frame))
            .await
            .map_err(|e| AppError::Encoding(format!("encode task failed: {}", e)))?
    }

    fn encode_packed422(&self, frame: &VideoFrame, layout: Packed422) -> Result<Bytes> {
        let width = frame.width() as usize;
        let height = frame.height() as usize;
        let stride = checked_stride(frame)?;

        let rgb = packed422_to_rgb24(frame.data(), width, height, stride, layout);
        self.compress_raw(&rgb, width, width * 3, height, turbojpeg::PixelFormat::RGB)
    }

    fn compress(&self, frame: &VideoFrame, format: turbojpeg::PixelFormat) -> Result<Bytes> {
        let stride = checked_stride(frame)?;
        self.compress_raw(
            frame.data(),
            frame.width() as usize,
            stride,
            frame.height() as usize,
            format,
        )
    }

    fn compress_raw(
        &self,
        pixels: &[u8],
        width: usize,
        pitch: usize,
        height: usize,
        format: turbojpeg::PixelFormat,
    ) -> Result<Bytes> {
        let mut compressor = turbojpeg::Compressor::new().map_err(|e| {
            AppError::Encoding(format!("Failed to create turbojpeg compressor: {}", e))
        })?;
        compressor
            .set_quality(self.quality as i32)
            .map_err(|e| AppError::Encoding(format!("Failed to set JPEG quality: {}", e)))?;

        let subsamp = if format == turbojpeg::PixelFormat::GRAY {
            turbojpeg::Subsamp::Gray
        } else {
            turbojpeg::Subsamp::Sub2x2
        };
        compressor
            .set_subsamp(subsamp)
            .map_err(|e| AppError::Encoding(format!("Failed to set subsampling: {}", e)))?;

        let image = turbojpeg::Image {
            pixels,
            width,
            pitch,
            height,
            format,
        };

        let jpeg = compressor
            .compress_to_vec(image)
            .map_err(|e| AppError::Encoding(format!("JPEG compression failed: {}", e)))?;

        Ok(Bytes::from(jpeg))
    }
}

/// Row stride of a raw frame, validated against the buffer length
fn checked_stride(frame: &VideoFrame) -> Result<usize> {
    let min = frame
        .format
        .min_stride(frame.width())
        .ok_or_else(|| AppError::Encoding(format!("{} is not a raw format", frame.format)))?
        as usize;
    let stride = (frame.stride as usize).max(min);
    let needed = stride * (frame.height() as usize - 1) + min;

    if frame.len() < needed {
        return Err(AppError::Encoding(format!(
            "{} frame too small: {} < {}",
            frame.format,
            frame.len(),
            needed
        )));
    }
    Ok(stride)
}

/// BT.601 limited-range YCbCr to RGB
#[inline]
fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    ]
}

fn packed422_to_rgb24(
    data: &[u8],
    width: usize,
    height: usize,
    stride: usize,
    layout: Packed422,
) -> Vec<u8> {
    let (oy0, ou, oy1, ov) = layout.offsets();
    let mut rgb = vec![0u8; width * height * 3];

    for row in 0..height {
        let src = &data[row * stride..];
        let dst = &mut rgb[row * width * 3..(row + 1) * width * 3];

        for pair in 0..width.div_ceil(2) {
            // Odd widths may end on a half macropixel
            let Some(px) = src.get(pair * 4..pair * 4 + 4) else {
                break;
            };
            let (u, v) = (px[ou], px[ov]);

            let x = pair * 2;
            dst[x * 3..x * 3 + 3].copy_from_slice(&ycbcr_to_rgb(px[oy0], u, v));
            if x + 1 < width {
                dst[(x + 1) * 3..(x + 2) * 3].copy_from_slice(&ycbcr_to_rgb(px[oy1], u, v));
            }
        }
    }

    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::format::Resolution;

    fn is_jpeg(data: &[u8]) -> bool {
        data.len() > 4 && data[0] == 0xFF && data[1] == 0xD8
    }

    #[test]
    fn test_zero_area_frame_is_rejected() {
        let encoder = JpegEncoder::default();
        let frame = VideoFrame::from_vec(vec![0u8; 16], Resolution::new(0, 0), PixelFormat::Grey, 0, 0);
        assert!(matches!(encoder.encode(&frame), Err(AppError::EmptyFrame)));
    }

    #[test]
    fn test_mjpeg_passthrough() {
        let mut data = vec![0xFF, 0xD8];
        data.extend(vec![0x11u8; 300]);
        data.extend([0xFF, 0xD9]);
        let frame = VideoFrame::from_vec(data.clone(), Resolution::VGA, PixelFormat::Mjpeg, 0, 7);

        let encoded = JpegEncoder::default().encode(&frame).unwrap();
        assert_eq!(encoded.as_ref(), data.as_slice());
    }

    #[test]
    fn test_corrupt_mjpeg_is_an_encoding_error() {
        let frame = VideoFrame::from_vec(vec![0u8; 300], Resolution::VGA, PixelFormat::Mjpeg, 0, 1);
        assert!(matches!(
            JpegEncoder::default().encode(&frame),
            Err(AppError::Encoding(_))
        ));
    }

    #[test]
    fn test_yuyv_frame_encodes() {
        let (w, h) = (32u32, 16u32);
        let frame = VideoFrame::from_vec(
            vec![128u8; (w * h * 2) as usize],
            Resolution::new(w, h),
            PixelFormat::Yuyv,
            w * 2,
            1,
        );
        let jpeg = JpegEncoder::new(70).encode(&frame).unwrap();
        assert!(is_jpeg(&jpeg));
    }

    #[test]
    fn test_out_of_range_quality_is_clamped() {
        let frame = VideoFrame::from_vec(vec![90u8; 32 * 16], Resolution::new(32, 16), PixelFormat::Grey, 32, 1);
        assert!(is_jpeg(&JpegEncoder::new(0).encode(&frame).unwrap()));
        assert!(is_jpeg(&JpegEncoder::new(500).encode(&frame).unwrap()));
    }

    #[test]
    fn test_grey_frame_encodes() {
        let frame = VideoFrame::from_vec(vec![200u8; 64 * 48], Resolution::new(64, 48), PixelFormat::Grey, 64, 1);
        assert!(is_jpeg(&JpegEncoder::default().encode(&frame).unwrap()));
    }

    #[test]
    fn test_short_raw_buffer_is_rejected() {
        let frame = VideoFrame::from_vec(vec![0u8; 100], Resolution::new(64, 48), PixelFormat::Rgb24, 0, 1);
        assert!(matches!(
            JpegEncoder::default().encode(&frame),
            Err(AppError::Encoding(_))
        ));
    }

    #[test]
    fn test_ycbcr_conversion() {
        assert_eq!(ycbcr_to_rgb(16, 128, 128), [0, 0, 0]);
        assert_eq!(ycbcr_to_rgb(235, 128, 128), [255, 255, 255]);
        // Strong Cr pushes towards red
        let [r, g, b] = ycbcr_to_rgb(81, 90, 240);
        assert!(r > 200 && g < 50 && b < 50);
    }

    #[test]
    fn test_uyvy_layout() {
        // One macropixel: U=128 Y0=235 V=128 Y1=16 -> white then black
        let rgb = packed422_to_rgb24(&[128, 235, 128, 16], 2, 1, 4, Packed422::Uyvy);
        assert_eq!(rgb, vec![255, 255, 255, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_encode_async() {
        let frame = VideoFrame::from_vec(vec![90u8; 16 * 16 * 3], Resolution::new(16, 16), PixelFormat::Bgr24, 48, 1);
        let jpeg = JpegEncoder::default().encode_async(frame).await.unwrap();
        assert!(is_jpeg(&jpeg));
    }
}
