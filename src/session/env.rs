use super::in_flight::BusyFlag;
use crate::api;
use crate::model::{join_error, EnvInfo};
use crate::notify::Notifier;
use crate::operator::Prompter;
use crate::transport::RpcTransport;
use std::sync::Arc;

const CONFIRM_CLEAR_LOGS: &str =
    "Are you sure you want to clear old terminal logs based on retention policy?";

/// Read-only view of the backend's runtime plus the log retention action.
pub struct EnvironmentPanel {
    rpc: Arc<dyn RpcTransport>,
    notifier: Arc<dyn Notifier>,
    prompter: Arc<dyn Prompter>,
    info: Option<EnvInfo>,
    loading: BusyFlag,
}

impl EnvironmentPanel {
    pub fn new(
        rpc: Arc<dyn RpcTransport>,
        notifier: Arc<dyn Notifier>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        Self {
            rpc,
            notifier,
            prompter,
            info: None,
            loading: BusyFlag::default(),
        }
    }

    pub fn info(&self) -> Option<&EnvInfo> {
        self.info.as_ref()
    }

    #[cfg(test)]
    pub fn is_loading(&self) -> bool {
        self.loading.is_set()
    }

    /// Fetch environment details. Returns whether fresh info was stored.
    pub async fn load(&mut self) -> bool {
        let _guard = self.loading.acquire();
        match api::get_env_info(self.rpc.as_ref()).await {
            Ok(resp) => {
                if let Some(error) = resp.error {
                    self.notifier
                        .danger(&join_error(&error, resp.message.as_deref()));
                    return false;
                }
                match resp.info {
                    Some(info) => {
                        self.info = Some(info);
                        true
                    }
                    None => false,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load environment info");
                self.notifier.danger("Failed to load environment info");
                false
            }
        }
    }

    /// Ask the backend to prune terminal logs past its retention window.
    pub async fn clear_old_logs(&self) -> bool {
        if !self.prompter.confirm(CONFIRM_CLEAR_LOGS) {
            return false;
        }
        match api::clear_logs(self.rpc.as_ref()).await {
            Ok(resp) => match resp.error {
                Some(error) => {
                    self.notifier
                        .danger(&join_error(&error, resp.message.as_deref()));
                    false
                }
                None => {
                    let message = resp.message.unwrap_or_else(|| "Logs cleared".to_string());
                    self.notifier.success(&message);
                    true
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "failed to clear logs");
                self.notifier.danger("Failed to clear logs");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::notify::Level;
    use crate::testing::{MockTransport, RecordingNotifier, ScriptedPrompter};
    use serde_json::json;

    fn panel(
        rpc: MockTransport,
        confirm: bool,
    ) -> (EnvironmentPanel, Arc<MockTransport>, Arc<RecordingNotifier>) {
        let rpc = Arc::new(rpc);
        let notifier = Arc::new(RecordingNotifier::default());
        let prompter = Arc::new(ScriptedPrompter::new(confirm, vec![]));
        let panel = EnvironmentPanel::new(rpc.clone(), notifier.clone(), prompter);
        (panel, rpc, notifier)
    }

    #[tokio::test]
    async fn load_stores_info() {
        let (mut p, _, notifier) = panel(
            MockTransport::new().reply(
                api::GET_ENV_INFO,
                json!({
                    "success": true,
                    "info": {
                        "python_version": "3.10.12",
                        "odoo_version": "17.0",
                        "os_info": {"system": "Linux", "release": "6.1"},
                        "packages": [{"name": "lxml", "version": "4.9.3"}],
                        "total_packages": 1,
                        "environment_vars": {"PATH": "/usr/bin"},
                        "terminal_config": {"max_execution_time": 300}
                    }
                }),
            ),
            true,
        );
        assert!(p.load().await);
        let info = p.info().unwrap();
        assert_eq!(info.odoo_version, "17.0");
        assert_eq!(info.os_info.system, "Linux");
        assert_eq!(info.packages[0].name, "lxml");
        assert_eq!(info.terminal_config["max_execution_time"], 300);
        assert!(!p.is_loading());
        assert_eq!(notifier.len(), 0);
    }

    #[tokio::test]
    async fn load_reports_application_and_transport_errors() {
        let (mut p, _, notifier) = panel(
            MockTransport::new().reply(
                api::GET_ENV_INFO,
                json!({"error": "Access Denied", "message": "Developer Terminal Admin only"}),
            ),
            true,
        );
        assert!(!p.load().await);
        assert!(p.info().is_none());
        assert_eq!(
            notifier.last().unwrap().message,
            "Access Denied: Developer Terminal Admin only"
        );

        let (mut p, _, notifier) = panel(
            MockTransport::new().on(api::GET_ENV_INFO, |_| Err(TransportError::Status(502))),
            true,
        );
        assert!(!p.load().await);
        let n = notifier.last().unwrap();
        assert_eq!((n.level, n.message.as_str()), (Level::Danger, "Failed to load environment info"));
        assert!(!p.is_loading());
    }

    #[tokio::test]
    async fn clearing_logs_needs_confirmation() {
        let (p, rpc, notifier) = panel(MockTransport::new(), false);
        assert!(!p.clear_old_logs().await);
        assert!(rpc.calls().is_empty());
        assert_eq!(notifier.len(), 0);
    }

    #[tokio::test]
    async fn clearing_logs_reports_result() {
        let (p, _, notifier) = panel(
            MockTransport::new().reply(
                api::CLEAR_LOGS,
                json!({"success": true, "message": "Cleared 42 old log entries"}),
            ),
            true,
        );
        assert!(p.clear_old_logs().await);
        let n = notifier.last().unwrap();
        assert_eq!((n.level, n.message.as_str()), (Level::Success, "Cleared 42 old log entries"));

        let (p, _, notifier) = panel(
            MockTransport::new().on(api::CLEAR_LOGS, |_| {
                Err(TransportError::Network("reset".into()))
            }),
            true,
        );
        assert!(!p.clear_old_logs().await);
        assert_eq!(notifier.last().unwrap().message, "Failed to clear logs");
    }
}
