//! Recognition service contract
//!
//! The service takes one JPEG per request and answers with an optional
//! `predicted_gesture`. Anything other than a 2xx response carrying a
//! non-empty prediction means "nothing recognized"; only failures to reach
//! the service at all are errors.

pub mod client;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

pub use client::HttpRecognizer;

/// Outcome of one recognition round-trip
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prediction {
    /// The service named a sign
    Detected(String),
    /// Success without a usable prediction, or a non-success status
    Nothing,
}

/// Expected success body
#[derive(Debug, Deserialize)]
struct RecognitionResponse {
    #[serde(default)]
    predicted_gesture: Option<String>,
}

/// Something that maps an encoded image to a prediction.
///
/// `Err` is reserved for transport failures (request not sent, timed out,
/// connection dropped).
#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn recognize(&self, image: Bytes) -> Result<Prediction>;
}

/// Interpret a service response
pub fn interpret(status: StatusCode, body: &[u8]) -> Prediction {
    if !status.is_success() {
        debug!(
            "Recognition service answered {}: {}",
            status,
            String::from_utf8_lossy(body)
        );
        return Prediction::Nothing;
    }

    match serde_json::from_slice::<RecognitionResponse>(body) {
        Ok(RecognitionResponse {
            predicted_gesture: Some(label),
        }) if !label.is_empty() => Prediction::Detected(label),
        Ok(_) => Prediction::Nothing,
        Err(e) => {
            debug!("Unparsable recognition response: {}", e);
            Prediction::Nothing
        }
    }
}

/// Request shape for the HTTP recognizer
#[derive(Debug, Clone)]
pub struct RecognizerSettings {
    pub endpoint: String,
    /// Multipart field carrying the image
    pub field_name: String,
    /// File name attached to the image part
    pub file_name: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for RecognizerSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:5000/recognize_gesture".to_string(),
            field_name: "image".to_string(),
            file_name: "gesture.jpg".to_string(),
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(3),
        }
    }
}
