//! HTTP OCR sidecar provider.
//!
//! Posts the file to a sidecar service speaking multipart and returning
//! `{"text": ...}`. The sidecar owns model selection and quality; this
//! client only moves bytes and surfaces descriptive errors.

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use super::{extension_of, OcrError, OcrProvider, SUPPORTED_EXTENSIONS};

#[derive(Debug, Deserialize)]
struct SidecarResponse {
    text: String,
}

pub struct RemoteOcrProvider {
    url: String,
    client: reqwest::Client,
}

impl RemoteOcrProvider {
    pub fn new(url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            url: url.into(),
            client,
        }
    }
}

#[async_trait::async_trait]
impl OcrProvider for RemoteOcrProvider {
    fn name(&self) -> &str {
        "remote_sidecar"
    }

    async fn extract_text(&self, path: &Path) -> Result<String, OcrError> {
        use reqwest::multipart::{Form, Part};

        let ext = extension_of(path).unwrap_or_default();
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(OcrError::UnsupportedFormat(ext));
        }

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("document")
            .to_string();

        let data = tokio::fs::read(path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => OcrError::NotFound(path.to_path_buf()),
                _ => OcrError::Extraction(format!("failed to read file: {}", e)),
            })?;

        let mime = match ext.as_str() {
            "pdf" => "application/pdf",
            "png" => "image/png",
            _ => "image/jpeg",
        };

        let part = Part::bytes(data)
            .file_name(filename)
            .mime_str(mime)
            .map_err(|e| OcrError::Extraction(format!("invalid mime type: {}", e)))?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/extract", self.url))
            .multipart(form)
            .send()
            .await
            .map_err(|e| OcrError::Extraction(format!("sidecar request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(OcrError::Extraction(format!(
                "OCR sidecar error ({}): {}",
                status, error_text
            )));
        }

        let sidecar: SidecarResponse = response
            .json()
            .await
            .map_err(|e| OcrError::Extraction(format!("invalid sidecar response: {}", e)))?;

        info!(
            "OCR sidecar extracted {} characters from upload",
            sidecar.text.len()
        );
        Ok(sidecar.text)
    }
}
