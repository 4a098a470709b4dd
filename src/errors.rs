use serde::Deserialize;
use std::{io, path::PathBuf};
use thiserror::Error;

/// Everything that can stop a deploy run.
///
/// There is no per-file recovery: the first error returned by any of these
/// paths ends the run and is reported by `main`.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("environment variable `{0}` is not set")]
    MissingConfig(&'static str),
    #[error("endpoint `{endpoint}` invalid: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },
    #[error("path `{0}` does not map to a valid object key")]
    InvalidObjectKey(PathBuf),
    #[error("directory `{path}` is nested deeper than {max_depth} levels")]
    DepthLimitExceeded { path: PathBuf, max_depth: usize },
    #[error("remote {status} {code}: {message} (request id: {request_id})")]
    Remote {
        status: u16,
        code: String,
        message: String,
        request_id: String,
    },
    #[error("checksum mismatch for `{key}`: sent {expected}, service reported {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type DeployResult<T> = Result<T, DeployError>;

/// Body of an OSS error response.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct OssErrorBody {
    code: String,
    message: String,
    request_id: String,
}

impl DeployError {
    /// Build a `Remote` error from an OSS error response body.
    ///
    /// OSS answers failures with a small XML document:
    /// `<Error><Code>..</Code><Message>..</Message><RequestId>..</RequestId></Error>`.
    /// Missing elements, or a body that is not XML, leave the fields empty;
    /// the HTTP status is always kept.
    pub fn from_remote_body(status: u16, body: &str) -> Self {
        let parsed: OssErrorBody = quick_xml::de::from_str(body).unwrap_or_default();
        DeployError::Remote {
            status,
            code: parsed.code,
            message: parsed.message,
            request_id: parsed.request_id,
        }
    }
}
