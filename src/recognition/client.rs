//! HTTP recognizer: multipart upload over reqwest

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use tracing::{debug, instrument};

use super::{interpret, Prediction, Recognizer, RecognizerSettings};
use crate::error::{AppError, Result};

/// Posts each frame to the recognition endpoint
pub struct HttpRecognizer {
    client: reqwest::Client,
    settings: RecognizerSettings,
}

impl HttpRecognizer {
    pub fn new(settings: RecognizerSettings) -> Result<Self> {
        reqwest::Url::parse(&settings.endpoint).map_err(|e| {
            AppError::Config(format!("Invalid recognition endpoint {}: {}", settings.endpoint, e))
        })?;

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, settings })
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    fn form(&self, image: Bytes) -> Result<Form> {
        let part = Part::bytes(image.to_vec())
            .file_name(self.settings.file_name.clone())
            .mime_str("image/jpeg")
            .map_err(|e| AppError::Internal(format!("Invalid image part: {}", e)))?;
        Ok(Form::new().part(self.settings.field_name.clone(), part))
    }
}

#[async_trait]
impl Recognizer for HttpRecognizer {
    #[instrument(skip_all, fields(bytes = image.len()))]
    async fn recognize(&self, image: Bytes) -> Result<Prediction> {
        let form = self.form(image)?;

        let response = self
            .client
            .post(&self.settings.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::Transport(describe(&e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| AppError::Transport(describe(&e)))?;

        let prediction = interpret(status, &body);
        debug!(%status, ?prediction, "Recognition round-trip complete");
        Ok(prediction)
    }
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        format!("request timed out: {}", err)
    } else if err.is_connect() {
        format!("connection failed: {}", err)
    } else {
        err.to_string()
    }
}
