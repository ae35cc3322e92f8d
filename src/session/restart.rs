//! Restart negotiation with the backend: plain attempt, credential challenge, retry, reload.

use crate::api;
use crate::error::TransportError;
use crate::model::{RestartRequest, RestartResponse};
use crate::notify::{Level, Notification, Notifier};
use crate::operator::{Prompter, ReloadScheduler};
use crate::transport::RpcTransport;
use std::sync::Arc;
use std::time::Duration;

/// Delay before reconnecting once a credentialed restart was accepted.
pub const RELOAD_DELAY: Duration = Duration::from_secs(3);

const CONFIRM_PLAIN: &str =
    "Are you sure you want to restart the Odoo service? This will disconnect all users.";
const CONFIRM_WITH_RELOAD: &str =
    "Are you sure you want to restart Odoo? This will disconnect all users and reload the page.";
const PASSWORD_PROMPT: &str = "Enter sudo password for system restart:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartState {
    Idle,
    Confirm,
    AttemptPlain,
    AwaitCredential,
    AttemptWithCredential,
    /// The backend cannot restart itself; the operator has to follow `message`.
    ManualInstructions { message: String },
    Cancelled,
    Failed { summary: String },
    Completed { message: String, reload_scheduled: bool },
}

impl RestartState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RestartState::ManualInstructions { .. }
                | RestartState::Cancelled
                | RestartState::Failed { .. }
                | RestartState::Completed { .. }
        )
    }
}

/// Credentials kept between attempts for the credentialed variant.
#[derive(Clone, Default)]
pub struct RestartForm {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl RestartForm {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.password.is_none()
    }

    pub fn clear(&mut self) {
        self.username = None;
        self.password = None;
    }

    fn to_request(&self) -> RestartRequest {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        RestartRequest {
            username: non_empty(&self.username),
            sudo_password: non_empty(&self.password),
        }
    }
}

impl std::fmt::Debug for RestartForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartForm")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub struct RestartNegotiator {
    rpc: Arc<dyn RpcTransport>,
    notifier: Arc<dyn Notifier>,
    prompter: Arc<dyn Prompter>,
    reloader: Arc<dyn ReloadScheduler>,
    state: RestartState,
    form: RestartForm,
    // Set when the last negotiation ended because a call never got a reply.
    unreachable: bool,
}

impl RestartNegotiator {
    pub fn new(
        rpc: Arc<dyn RpcTransport>,
        notifier: Arc<dyn Notifier>,
        prompter: Arc<dyn Prompter>,
        reloader: Arc<dyn ReloadScheduler>,
    ) -> Self {
        Self {
            rpc,
            notifier,
            prompter,
            reloader,
            state: RestartState::Idle,
            form: RestartForm::default(),
            unreachable: false,
        }
    }

    pub fn state(&self) -> &RestartState {
        &self.state
    }

    pub fn form(&self) -> &RestartForm {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut RestartForm {
        &mut self.form
    }

    /// Whether the last negotiation returned to `Idle` because the backend could not be reached.
    pub fn backend_unreachable(&self) -> bool {
        self.unreachable
    }

    fn transition(&mut self, next: RestartState) {
        tracing::debug!(from = ?self.state, to = ?next, "restart negotiation");
        self.state = next;
    }

    /// Restart without credentials first, asking for a password only if the backend
    /// wants one.
    pub async fn restart(&mut self) -> RestartState {
        self.unreachable = false;
        self.transition(RestartState::Confirm);
        if !self.prompter.confirm(CONFIRM_PLAIN) {
            self.transition(RestartState::Idle);
            return self.state.clone();
        }

        self.transition(RestartState::AttemptPlain);
        let response = match api::restart(self.rpc.as_ref(), &RestartRequest::default()).await {
            Ok(r) => r,
            Err(e) => return self.network_failure(e),
        };

        if response.is_containerized() {
            let message = response.message.unwrap_or_default();
            self.notifier.notify(Notification {
                level: Level::Info,
                message: message.clone(),
                sticky: true,
            });
            self.transition(RestartState::ManualInstructions { message });
            return self.state.clone();
        }

        if response.requires_password() {
            self.transition(RestartState::AwaitCredential);
            let Some(secret) = self.prompter.prompt_secret(PASSWORD_PROMPT) else {
                self.notifier.info("Restart cancelled");
                self.transition(RestartState::Cancelled);
                return self.state.clone();
            };
            let request = RestartRequest {
                username: None,
                sudo_password: Some(secret),
            };
            return self.attempt_with_credential(request).await;
        }

        if let Some(summary) = response.error_summary() {
            return self.failed(summary);
        }
        let message = response
            .message
            .unwrap_or_else(|| "Restart command sent".to_string());
        self.notifier.success(&message);
        self.transition(RestartState::Completed {
            message,
            reload_scheduled: false,
        });
        self.state.clone()
    }

    /// Restart straight away with the credentials held in the form.
    pub async fn restart_with_credentials(&mut self) -> RestartState {
        self.unreachable = false;
        self.transition(RestartState::Confirm);
        if !self.prompter.confirm(CONFIRM_WITH_RELOAD) {
            self.transition(RestartState::Idle);
            return self.state.clone();
        }
        let request = self.form.to_request();
        self.attempt_with_credential(request).await
    }

    async fn attempt_with_credential(&mut self, request: RestartRequest) -> RestartState {
        self.transition(RestartState::AttemptWithCredential);
        let response = match api::restart(self.rpc.as_ref(), &request).await {
            Ok(r) => r,
            Err(e) => return self.network_failure(e),
        };

        if let Some(summary) = response.error_summary() {
            return self.failed(summary);
        }

        if response.success == Some(true) {
            let message = response.message.unwrap_or_default();
            self.notifier.success(&format!(
                "{message} Page will reload in {} seconds...",
                RELOAD_DELAY.as_secs()
            ));
            self.form.clear();
            self.reloader.schedule_reload(RELOAD_DELAY);
            self.transition(RestartState::Completed {
                message,
                reload_scheduled: true,
            });
        } else {
            self.accepted_without_confirmation(response);
        }
        self.state.clone()
    }

    fn accepted_without_confirmation(&mut self, response: RestartResponse) {
        let message = response
            .message
            .unwrap_or_else(|| "Restart command sent".to_string());
        self.notifier.info(&message);
        self.transition(RestartState::Completed {
            message,
            reload_scheduled: false,
        });
    }

    fn failed(&mut self, summary: String) -> RestartState {
        self.notifier.warning(&summary);
        self.transition(RestartState::Failed { summary });
        self.state.clone()
    }

    fn network_failure(&mut self, e: TransportError) -> RestartState {
        tracing::warn!(error = %e, "restart call failed");
        self.notifier.danger(&format!("Failed to restart Odoo: {e}"));
        self.unreachable = true;
        self.transition(RestartState::Idle);
        self.state.clone()
    }
}
