//! Addon upload pipeline: validate a `.zip`, stream it with progress, reconcile the reply.

use super::in_flight::{BusyFlag, Percent};
use crate::api;
use crate::error::TransportError;
use crate::format::format_file_size;
use crate::model::{join_error, UploadRecord, UploadResponse};
use crate::notify::{Level, Notification, Notifier};
use crate::transport::{LocalFile, ProgressSink, RawReply, RpcTransport, UploadTransport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Called with the new percentage whenever it changes.
pub type ProgressObserver = Arc<dyn Fn(u8) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// No file selected; nothing was sent.
    Rejected,
    Uploaded,
    /// The backend answered but refused the addon.
    Refused,
    /// The transfer did not produce a usable reply.
    Failed(String),
}

#[derive(Debug, Default)]
pub struct UploadState {
    selected_file: Option<LocalFile>,
    uploading: BusyFlag,
    progress: Percent,
    history: Vec<UploadRecord>,
}

impl UploadState {
    pub fn selected_file(&self) -> Option<&LocalFile> {
        self.selected_file.as_ref()
    }

    #[cfg(test)]
    pub fn is_uploading(&self) -> bool {
        self.uploading.is_set()
    }

    #[cfg(test)]
    pub fn progress_percent(&self) -> u8 {
        self.progress.get()
    }

    /// Most recent first.
    pub fn history(&self) -> &[UploadRecord] {
        &self.history
    }
}

/// Turns byte counts into a rounded percentage.
struct PercentSink {
    percent: Percent,
    observer: Option<ProgressObserver>,
}

impl ProgressSink for PercentSink {
    fn report(&self, bytes_sent: u64, total_bytes: u64) {
        if total_bytes == 0 {
            return;
        }
        let pct = ((bytes_sent as f64 / total_bytes as f64) * 100.0)
            .round()
            .min(100.0) as u8;
        if pct != self.percent.get() {
            self.percent.set(pct);
            if let Some(observe) = &self.observer {
                observe(pct);
            }
        }
    }
}

pub struct UploadPipeline {
    rpc: Arc<dyn RpcTransport>,
    uploader: Arc<dyn UploadTransport>,
    notifier: Arc<dyn Notifier>,
    history_limit: usize,
    cancel: Arc<AtomicBool>,
    observer: Option<ProgressObserver>,
    state: UploadState,
}

impl UploadPipeline {
    pub fn new(
        rpc: Arc<dyn RpcTransport>,
        uploader: Arc<dyn UploadTransport>,
        notifier: Arc<dyn Notifier>,
        history_limit: usize,
    ) -> Self {
        Self {
            rpc,
            uploader,
            notifier,
            history_limit,
            cancel: Arc::new(AtomicBool::new(false)),
            observer: None,
            state: UploadState::default(),
        }
    }

    pub fn with_progress_observer(mut self, observer: ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Flag that aborts the running upload when raised.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Accept `file` if its name ends in `.zip` (case-sensitive). A rejected file leaves
    /// the current selection as it was.
    pub fn select_file(&mut self, file: LocalFile) -> bool {
        if !file.name.ends_with(".zip") {
            self.notifier.warning("Only .zip files are allowed");
            return false;
        }
        self.notifier.info(&format!(
            "Selected: {} ({})",
            file.name,
            format_file_size(file.size_bytes)
        ));
        self.state.selected_file = Some(file);
        true
    }

    pub async fn upload(&mut self) -> UploadOutcome {
        let Some(file) = self.state.selected_file.clone() else {
            self.notifier.warning("Please select a .zip file first");
            return UploadOutcome::Rejected;
        };

        let busy = self.state.uploading.acquire().with_progress(&self.state.progress);
        self.cancel.store(false, Ordering::Relaxed);
        tracing::info!(file = %file.name, size = file.size_bytes, "uploading addon");

        let sink = Arc::new(PercentSink {
            percent: self.state.progress.clone(),
            observer: self.observer.clone(),
        });
        let reply = self
            .uploader
            .send_file(&file, sink, self.cancel.clone())
            .await;

        let outcome = match interpret_reply(reply) {
            Ok(body) if body.success => {
                self.notifier.notify(Notification {
                    level: Level::Success,
                    message: body.message.unwrap_or_else(|| "Addon uploaded".to_string()),
                    sticky: true,
                });
                self.state.selected_file = None;
                UploadOutcome::Uploaded
            }
            Ok(body) => {
                let error = body.error.as_deref().unwrap_or("Upload Failed");
                self.notifier
                    .danger(&join_error(error, body.message.as_deref()));
                UploadOutcome::Refused
            }
            Err(reason) => {
                tracing::warn!(%reason, "addon upload failed");
                self.notifier.danger(&format!("Upload failed: {reason}"));
                UploadOutcome::Failed(reason)
            }
        };
        drop(busy);

        if outcome == UploadOutcome::Uploaded {
            self.load_upload_history(self.history_limit).await;
        }
        outcome
    }

    /// Fetch up to `limit` recent uploads. Failures keep the current list and are only logged.
    pub async fn load_upload_history(&mut self, limit: usize) -> bool {
        match api::get_upload_history(self.rpc.as_ref(), limit).await {
            Ok(resp) if resp.success => {
                self.state.history = resp.uploads;
                true
            }
            Ok(resp) => {
                tracing::warn!(
                    error = resp.error.as_deref().unwrap_or("unknown"),
                    message = resp.message.as_deref().unwrap_or(""),
                    "upload history request refused"
                );
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load upload history");
                false
            }
        }
    }
}

/// Status and body checks for a finished transfer; `Err` carries the user-facing reason.
fn interpret_reply(reply: Result<RawReply, TransportError>) -> Result<UploadResponse, String> {
    let reply = reply.map_err(|e| match e {
        TransportError::Aborted => "Upload cancelled".to_string(),
        TransportError::Network(_) => "Network error".to_string(),
        other => other.to_string(),
    })?;
    if reply.status != 200 {
        return Err(format!("Upload failed with status {}", reply.status));
    }
    serde_json::from_slice(&reply.body).map_err(|_| "Invalid response from server".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ok_reply, MockTransport, RecordingNotifier, UploadScript};
    use serde_json::json;
    use std::sync::Mutex;

    fn zip(name: &str, size: u64) -> LocalFile {
        LocalFile {
            path: format!("/tmp/{name}").into(),
            name: name.to_string(),
            size_bytes: size,
        }
    }

    fn uploads_json() -> serde_json::Value {
        json!({"success": true, "uploads": [{
            "id": 1, "name": "my_module", "filename": "my_module.zip", "file_size": 200,
            "state": "success", "upload_path": "/mnt/extra-addons/my_module",
            "error_message": false, "user": "Administrator", "create_date": "2024-03-01 12:30:00"
        }]})
    }

    fn pipeline(
        mock: MockTransport,
    ) -> (UploadPipeline, Arc<MockTransport>, Arc<RecordingNotifier>, Arc<Mutex<Vec<u8>>>) {
        let mock = Arc::new(mock);
        let notifier = Arc::new(RecordingNotifier::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let p = UploadPipeline::new(mock.clone(), mock.clone(), notifier.clone(), 20)
            .with_progress_observer(Arc::new(move |pct| seen2.lock().unwrap().push(pct)));
        (p, mock, notifier, seen)
    }

    #[test]
    fn non_zip_is_rejected_and_selection_kept() {
        let (mut p, _m, notifier, _) = pipeline(MockTransport::new());
        assert!(p.select_file(zip("first.zip", 10)));
        assert!(!p.select_file(zip("addon.txt", 10)));
        assert!(!p.select_file(zip("ADDON.ZIP", 10)));

        assert_eq!(p.state().selected_file().unwrap().name, "first.zip");
        assert_eq!(notifier.levels(), vec![Level::Info, Level::Warning, Level::Warning]);
    }

    #[test]
    fn zip_selection_reports_size() {
        let (mut p, _m, notifier, _) = pipeline(MockTransport::new());
        assert!(p.select_file(zip("addon.zip", 2_097_152)));
        let n = notifier.last().unwrap();
        assert_eq!(n.level, Level::Info);
        assert_eq!(n.message, "Selected: addon.zip (2.00 MB)");
    }

    #[tokio::test]
    async fn upload_without_selection_is_a_no_op() {
        let (mut p, mock, notifier, _) = pipeline(MockTransport::new());
        assert_eq!(p.upload().await, UploadOutcome::Rejected);
        assert!(mock.calls().is_empty());
        assert_eq!(notifier.levels(), vec![Level::Warning]);
    }

    #[tokio::test]
    async fn successful_upload_reports_progress_and_refreshes_history() {
        let (mut p, mock, notifier, seen) = pipeline(
            MockTransport::new()
                .upload_script(UploadScript {
                    ticks: vec![(50, 200), (100, 200), (200, 200)],
                    outcome: ok_reply(json!({
                        "success": true,
                        "message": "Addon \"my_module\" uploaded successfully!\n\nNote: restart to load it.",
                        "module_name": "my_module"
                    })),
                })
                .reply(api::GET_UPLOAD_HISTORY, uploads_json()),
        );
        p.select_file(zip("my_module.zip", 200));
        assert_eq!(p.state().progress_percent(), 0);

        assert_eq!(p.upload().await, UploadOutcome::Uploaded);

        assert_eq!(*seen.lock().unwrap(), vec![25, 50, 100]);
        assert_eq!(p.state().progress_percent(), 0);
        assert!(!p.state().is_uploading());
        assert!(p.state().selected_file().is_none());
        assert_eq!(p.state().history().len(), 1);
        assert_eq!(mock.calls_to(api::GET_UPLOAD_HISTORY), vec![json!({"limit": 20})]);

        let n = notifier.last().unwrap();
        assert_eq!(n.level, Level::Success);
        assert!(n.sticky);
        assert!(n.message.contains("my_module"));
    }

    #[tokio::test]
    async fn non_200_status_fails_with_status_code() {
        let (mut p, mock, notifier, _) = pipeline(MockTransport::new().upload_script(UploadScript {
            ticks: vec![(100, 200)],
            outcome: Ok(RawReply {
                status: 413,
                body: "Request Entity Too Large".into(),
            }),
        }));
        p.select_file(zip("big.zip", 200));

        assert_eq!(
            p.upload().await,
            UploadOutcome::Failed("Upload failed with status 413".into())
        );
        assert_eq!(p.state().progress_percent(), 0);
        assert!(!p.state().is_uploading());
        assert!(p.state().selected_file().is_some());
        assert!(mock.calls_to(api::GET_UPLOAD_HISTORY).is_empty());
        assert_eq!(
            notifier.last().unwrap().message,
            "Upload failed: Upload failed with status 413"
        );
    }

    #[tokio::test]
    async fn unparsable_body_is_an_invalid_response() {
        let (mut p, _m, notifier, _) = pipeline(MockTransport::new().upload_script(UploadScript {
            ticks: vec![],
            outcome: Ok(RawReply {
                status: 200,
                body: "<html>oops</html>".into(),
            }),
        }));
        p.select_file(zip("a.zip", 1));
        assert_eq!(
            p.upload().await,
            UploadOutcome::Failed("Invalid response from server".into())
        );
        assert_eq!(notifier.levels(), vec![Level::Info, Level::Danger]);
    }

    #[tokio::test]
    async fn refused_addon_reports_code_and_message() {
        let (mut p, _m, notifier, _) = pipeline(MockTransport::new().upload_script(UploadScript {
            ticks: vec![(1, 1)],
            outcome: ok_reply(json!({
                "error": "Invalid Addon",
                "message": "No __manifest__.py or __openerp__.py found in the zip file."
            })),
        }));
        p.select_file(zip("a.zip", 1));
        assert_eq!(p.upload().await, UploadOutcome::Refused);
        let n = notifier.last().unwrap();
        assert_eq!(n.level, Level::Danger);
        assert_eq!(
            n.message,
            "Invalid Addon: No __manifest__.py or __openerp__.py found in the zip file."
        );
        assert_eq!(p.state().progress_percent(), 0);
    }

    #[tokio::test]
    async fn abort_is_a_failure_outcome() {
        let (mut p, _m, notifier, _) = pipeline(MockTransport::new().upload_script(UploadScript {
            ticks: vec![(10, 100), (20, 100)],
            outcome: ok_reply(json!({"success": true})),
        }));
        p.select_file(zip("a.zip", 100));
        // Abort from inside the transfer, as a Ctrl+C handler would.
        let abort = p.abort_handle();
        p.observer = Some(Arc::new(move |_| abort.store(true, Ordering::Relaxed)));

        assert_eq!(
            p.upload().await,
            UploadOutcome::Failed("Upload cancelled".into())
        );
        assert_eq!(notifier.last().unwrap().message, "Upload failed: Upload cancelled");
        assert_eq!(p.state().progress_percent(), 0);
        assert!(!p.state().is_uploading());
    }

    #[tokio::test]
    async fn network_error_is_reported_generically() {
        let (mut p, _m, notifier, _) = pipeline(MockTransport::new().upload_script(UploadScript {
            ticks: vec![],
            outcome: Err(TransportError::Network("connection reset".into())),
        }));
        p.select_file(zip("a.zip", 1));
        p.upload().await;
        assert_eq!(notifier.last().unwrap().message, "Upload failed: Network error");
    }

    #[tokio::test]
    async fn upload_history_load_reports_failure_quietly() {
        let (mut p, _m, notifier, _) =
            pipeline(MockTransport::new().reply(api::GET_UPLOAD_HISTORY, uploads_json()));
        assert!(p.load_upload_history(20).await);
        assert_eq!(p.state().history().len(), 1);

        let (mut p, _m, notifier2, _) = pipeline(MockTransport::new());
        assert!(!p.load_upload_history(20).await);
        assert!(p.state().history().is_empty());
        assert_eq!(notifier.len() + notifier2.len(), 0);
    }
}
