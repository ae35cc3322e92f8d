use super::rpc::{parse_reply, RpcRequest};
use super::{LocalFile, ProgressSink, RawReply, RpcTransport, UploadTransport};
use crate::config::ClientConfig;
use crate::error::TransportError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// Chunk size for the upload body stream (64 KB)
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// reqwest-backed transport for the backend's JSON routes and addon uploads.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    endpoint: Url,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl HttpTransport {
    pub fn new(cfg: &ClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(session_id) = cfg.session_id.as_deref() {
            let mut cookie = HeaderValue::from_str(&format!("session_id={session_id}"))
                .context("session id is not a valid cookie value")?;
            cookie.set_sensitive(true);
            headers.insert(COOKIE, cookie);
        }

        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .default_headers(headers)
            .build()
            .context("build http client")?;

        Ok(Self {
            http,
            endpoint: cfg.endpoint_base()?,
            request_timeout: cfg.request_timeout,
            upload_timeout: cfg.upload_timeout,
        })
    }

    fn url(&self, route: &str) -> Result<Url, TransportError> {
        self.endpoint
            .join(route)
            .map_err(|e| TransportError::Network(format!("bad route {route}: {e}")))
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, route: &str, params: Value) -> Result<Value, TransportError> {
        let url = self.url(route)?;
        let req = RpcRequest::call(&params);
        tracing::debug!(route, id = req.id(), "rpc call");

        let resp = self
            .http
            .post(url)
            .timeout(self.request_timeout)
            .json(&req)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        let body = resp.bytes().await?;
        parse_reply(&body)
    }
}

#[async_trait]
impl UploadTransport for HttpTransport {
    async fn send_file(
        &self,
        file: &LocalFile,
        progress: Arc<dyn ProgressSink>,
        cancel: Arc<AtomicBool>,
    ) -> Result<RawReply, TransportError> {
        let url = self.url("upload_addon")?;
        let io_err = |e| TransportError::io_error(file.path.display().to_string(), e);
        let handle = tokio::fs::File::open(&file.path).await.map_err(io_err)?;
        let total = handle.metadata().await.map_err(io_err)?.len();

        // Bytes are counted as chunks are handed to reqwest, which tracks what has been
        // put on the wire closely enough for a progress readout.
        let body_stream = stream::unfold(
            Some((handle, 0u64, progress, cancel.clone())),
            move |state| async move {
                let Some((mut handle, sent, progress, cancel)) = state else {
                    return None;
                };
                if cancel.load(Ordering::Relaxed) {
                    let err = std::io::Error::new(std::io::ErrorKind::Interrupted, "upload cancelled");
                    return Some((Err(err), None));
                }
                let chunk = match read_chunk(&mut handle).await {
                    Ok(chunk) if chunk.is_empty() => return None,
                    Ok(chunk) => chunk,
                    Err(e) => return Some((Err(e), None)),
                };
                let sent = sent + chunk.len() as u64;
                progress.report(sent, total);
                Some((Ok::<Bytes, std::io::Error>(chunk), Some((handle, sent, progress, cancel))))
            },
        );

        let part = Part::stream_with_length(reqwest::Body::wrap_stream(body_stream), total)
            .file_name(file.name.clone())
            .mime_str("application/zip")?;
        let form = Form::new().part("file", part);

        let request = self
            .http
            .post(url)
            .timeout(self.upload_timeout)
            .multipart(form)
            .send();

        let resp = tokio::select! {
            r = request => r,
            _ = wait_for_cancel(&cancel) => return Err(TransportError::Aborted),
        };
        let resp = match resp {
            Ok(r) => r,
            Err(_) if cancel.load(Ordering::Relaxed) => return Err(TransportError::Aborted),
            Err(e) => return Err(TransportError::Network(e.to_string())),
        };

        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(RawReply { status, body })
    }
}

/// Fill up to one upload chunk from `handle`; empty at end of file.
async fn read_chunk(handle: &mut tokio::fs::File) -> std::io::Result<Bytes> {
    let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
    let mut filled = 0;
    while filled < buf.len() {
        match handle.read(&mut buf[filled..]).await? {
            0 => break,
            n => filled += n,
        }
    }
    buf.truncate(filled);
    Ok(Bytes::from(buf))
}

/// Resolve once `cancel` is raised.
async fn wait_for_cancel(cancel: &AtomicBool) {
    while !cancel.load(Ordering::Relaxed) {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
