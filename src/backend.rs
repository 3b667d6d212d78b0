// src/backend.rs
//
// Request/response calls against the processing service:
//
//   POST /process_video_file               multipart "file" → {file_id, file_path}
//   GET  /violations                       → [Violation], newest first
//   GET  /download_processed_video?filename=<recording>
//   GET  /uploaded_videos/<filename>
//
// The two GET-by-name endpoints are only turned into URLs here; fetching the
// video itself is left to whatever plays it.

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::BackendError;
use crate::snapshot::{ObjectId, RecordingHandle};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    pub file_id: String,
    /// Server-side path; stream it by passing it as the session source.
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: i64,
    #[serde(default)]
    pub vehicle_id: Option<ObjectId>,
    #[serde(default)]
    pub timestamp: Option<NaiveDateTime>,
    #[serde(default)]
    pub video_second: Option<f64>,
    #[serde(default)]
    pub processed_video_path: Option<String>,
    #[serde(default)]
    pub original_video_path: Option<String>,
}

#[derive(Clone)]
pub struct BackendClient {
    http_client: reqwest::Client,
    base: Url,
    upload_timeout: Duration,
    uploading: Arc<AtomicBool>,
}

/// Clears the in-progress flag however the upload ends.
struct UploadGuard<'a>(&'a AtomicBool);

impl Drop for UploadGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BackendClient {
    pub fn new(base_url: &str, timeout_secs: u64, upload_timeout_secs: u64) -> Result<Self> {
        let base = Url::parse(base_url)
            .with_context(|| format!("Invalid backend URL '{}'", base_url))?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http_client,
            base,
            upload_timeout: Duration::from_secs(upload_timeout_secs),
            uploading: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading.load(Ordering::Acquire)
    }

    /// Uploads a local video for processing. A second upload while one is
    /// running is rejected rather than queued.
    pub async fn upload_video(&self, path: &Path) -> Result<UploadResponse, BackendError> {
        if self.uploading.swap(true, Ordering::AcqRel) {
            return Err(BackendError::UploadInProgress);
        }
        let _guard = UploadGuard(&self.uploading);

        let bytes = tokio::fs::read(path).await.map_err(|source| BackendError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.mp4")
            .to_string();

        let url = self.endpoint(&["process_video_file"]);
        info!("📤 Uploading {} ({} bytes) to {}", file_name, bytes.len(), url);

        let form = Form::new().part("file", Part::bytes(bytes).file_name(file_name));
        let response = self
            .http_client
            .post(url.clone())
            .timeout(self.upload_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|source| BackendError::Http {
                url: url.to_string(),
                source,
            })?;

        let uploaded: UploadResponse = read_json(url, response).await?;
        info!("📤 Upload stored as {} ({})", uploaded.file_path, uploaded.file_id);
        Ok(uploaded)
    }

    pub async fn fetch_violations(&self) -> Result<Vec<Violation>, BackendError> {
        let url = self.endpoint(&["violations"]);
        let response = self
            .http_client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| BackendError::Http {
                url: url.to_string(),
                source,
            })?;
        read_json(url, response).await
    }

    pub fn download_url(&self, handle: &RecordingHandle) -> String {
        let mut url = self.endpoint(&["download_processed_video"]);
        url.query_pairs_mut().append_pair("filename", handle.as_str());
        url.to_string()
    }

    pub fn processed_video_url(&self, violation: &Violation) -> Option<String> {
        violation
            .processed_video_path
            .as_deref()
            .and_then(RecordingHandle::from_output_path)
            .map(|handle| self.download_url(&handle))
    }

    pub fn original_video_url(&self, violation: &Violation) -> Option<String> {
        let name = violation
            .original_video_path
            .as_deref()
            .and_then(RecordingHandle::from_output_path)?;
        Some(self.endpoint(&["uploaded_videos", name.as_str()]).to_string())
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

async fn read_json<T>(url: Url, response: reqwest::Response) -> Result<T, BackendError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!("🌐 Backend error {} from {}: {}", status, url, body);
        return Err(BackendError::Status {
            url: url.to_string(),
            status,
            body,
        });
    }
    response.json::<T>().await.map_err(|source| {
        error!("🌐 Failed to parse response from {}: {}", url, source);
        BackendError::Decode {
            url: url.to_string(),
            source,
        }
    })
}
