use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::media::VideoConstraints;
use crate::recognition::RecognizerSettings;
use crate::session::SessionConfig;
use crate::video::{PixelFormat, Resolution};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Camera capture settings
    pub camera: CameraConfig,
    /// Recognition service settings
    pub recognition: RecognitionConfig,
    /// Capture session behaviour
    pub session: SessionSettings,
    /// Web server settings
    pub web: WebConfig,
}

impl AppConfig {
    /// Session parameters derived from camera and session settings
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            constraints: self.camera.constraints(),
            refresh: self.session.refresh_interval(),
            jpeg_quality: self.camera.quality,
        }
    }
}

/// Camera capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Video device path (e.g., /dev/video0), None to auto-select
    pub device: Option<String>,
    /// Pixel format (e.g., "MJPEG", "YUYV")
    pub format: Option<String>,
    /// Resolution width
    pub width: u32,
    /// Resolution height
    pub height: u32,
    /// Frame rate
    pub fps: u32,
    /// JPEG quality (1-100) for re-encoded raw frames
    pub quality: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: None,
            format: None, // MJPEG
            width: 640,
            height: 480,
            fps: 30,
            quality: 80,
        }
    }
}

impl CameraConfig {
    /// Unknown format names fall back to MJPEG
    pub fn pixel_format(&self) -> PixelFormat {
        self.format
            .as_deref()
            .and_then(|f| f.parse().ok())
            .unwrap_or(PixelFormat::Mjpeg)
    }

    pub fn constraints(&self) -> VideoConstraints {
        VideoConstraints {
            device: self.device.as_ref().map(PathBuf::from),
            resolution: Resolution::new(self.width, self.height),
            format: self.pixel_format(),
            fps: self.fps,
        }
    }
}

/// Recognition service configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecognitionConfig {
    /// Endpoint receiving the multipart upload
    pub endpoint: String,
    /// Multipart field name of the image
    pub field_name: String,
    /// File name sent with the image
    pub file_name: String,
    /// Whole-request timeout in milliseconds
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds
    pub connect_timeout_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/recognize_gesture".to_string(),
            field_name: "image".to_string(),
            file_name: "gesture.jpg".to_string(),
            timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl RecognitionConfig {
    pub fn settings(&self) -> RecognizerSettings {
        RecognizerSettings {
            endpoint: self.endpoint.clone(),
            field_name: self.field_name.clone(),
            file_name: self.file_name.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
        }
    }
}

/// Capture session configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionSettings {
    /// Start the session when the server comes up
    pub auto_start: bool,
    /// Display refresh rate used to schedule the next cycle
    pub refresh_hz: u32,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            auto_start: true,
            refresh_hz: 60,
        }
    }
}

impl SessionSettings {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.refresh_hz.clamp(1, 1000) as f64)
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebConfig {
    /// HTTP port
    pub http_port: u16,
    /// Bind address
    pub bind_address: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            bind_address: "0.0.0.0".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_uses_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"camera": {"device": "/dev/video2"}, "web": {"http_port": 9000}}"#)
                .unwrap();

        assert_eq!(config.camera.device.as_deref(), Some("/dev/video2"));
        assert_eq!(config.camera.width, 640);
        assert_eq!(config.web.http_port, 9000);
        assert_eq!(config.web.bind_address, "0.0.0.0");
        assert_eq!(config.recognition.file_name, "gesture.jpg");
        assert!(config.session.auto_start);
    }

    #[test]
    fn test_constraints() {
        let camera = CameraConfig {
            device: Some("/dev/video1".to_string()),
            format: Some("yuyv".to_string()),
            ..Default::default()
        };
        let constraints = camera.constraints();
        assert_eq!(constraints.device, Some(PathBuf::from("/dev/video1")));
        assert_eq!(constraints.format, PixelFormat::Yuyv);
        assert_eq!(constraints.resolution, Resolution::VGA);

        let unknown = CameraConfig {
            format: Some("H264".to_string()),
            ..Default::default()
        };
        assert_eq!(unknown.pixel_format(), PixelFormat::Mjpeg);
    }

    #[test]
    fn test_refresh_interval() {
        let session = SessionSettings::default();
        let interval = session.refresh_interval();
        assert!(interval > Duration::from_millis(16) && interval < Duration::from_millis(17));

        let zero = SessionSettings {
            refresh_hz: 0,
            ..Default::default()
        };
        assert_eq!(zero.refresh_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_recognizer_settings() {
        let settings = RecognitionConfig::default().settings();
        assert_eq!(settings.field_name, "image");
        assert_eq!(settings.timeout, Duration::from_secs(10));
        assert_eq!(settings.connect_timeout, Duration::from_secs(3));
    }
}
