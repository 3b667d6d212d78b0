// src/error.rs
//
// Typed failures for the pieces callers branch on. Application-level
// plumbing (config, startup) stays on anyhow.

use std::path::PathBuf;
use thiserror::Error;

/// Rejected session starts. Raised before any channel is touched.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Stream source path is empty")]
    EmptySource,
}

/// A text message on the frame channel that could not be accepted.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Metadata message is not valid JSON")]
    InvalidJson(#[source] serde_json::Error),

    #[error("frame_data payload does not match the detection schema")]
    InvalidFrameData(#[source] serde_json::Error),
}

/// Failures of the request/response calls against the processing backend.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Request to {url} failed")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Backend returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Unexpected response body from {url}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("An upload is already in progress")]
    UploadInProgress,

    #[error("Failed to read {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One line with every cause in the chain, as anyhow's `{:#}` prints it.
pub fn describe<E>(err: E) -> String
where
    E: std::error::Error + Send + Sync + 'static,
{
    format!("{:#}", anyhow::Error::new(err))
}
