//! Remote-call capabilities consumed by the session controllers.
//!
//! Controllers only see the traits below; [`HttpTransport`] is the production
//! implementation and tests substitute in-memory ones.

mod http;
mod rpc;

pub use http::HttpTransport;

use crate::error::TransportError;
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Request/response calls against the backend's JSON routes.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Call `route` (e.g. `"execute"`) with `params` and return the reply's result.
    async fn call(&self, route: &str, params: Value) -> Result<Value, TransportError>;
}

/// Receives byte-level progress while a file is being sent.
pub trait ProgressSink: Send + Sync {
    fn report(&self, bytes_sent: u64, total_bytes: u64);
}

/// A local file chosen for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
}

impl LocalFile {
    /// Describe the file at `path` from its metadata.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let path = path.into();
        let meta = std::fs::metadata(&path)
            .map_err(|e| TransportError::io_error(path.display().to_string(), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path,
            name,
            size_bytes: meta.len(),
        })
    }
}

/// Status and raw body of a finished upload; interpretation is left to the caller.
#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: u16,
    pub body: Bytes,
}

/// Streaming upload with progress: sends one file as a multipart body.
///
/// Implementations report progress through `progress` and give up with
/// [`TransportError::Aborted`] once `cancel` is raised.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn send_file(
        &self,
        file: &LocalFile,
        progress: Arc<dyn ProgressSink>,
        cancel: Arc<AtomicBool>,
    ) -> Result<RawReply, TransportError>;
}
