//! Command session: the input line, its output buffers and a recallable history.

use super::in_flight::BusyFlag;
use crate::api;
use crate::model::{CommandRecord, CommandType, ExecuteRequest, ExecutionResult};
use crate::notify::Notifier;
use crate::transport::RpcTransport;
use std::sync::Arc;

pub const EXECUTING_PLACEHOLDER: &str = "Executing...\n";
pub const NO_OUTPUT: &str = "Command executed successfully (no output)";

/// Direction of a history step. `Older` moves away from the most recent entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Older,
    Newer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Nothing to run; no call was made.
    Rejected,
    Succeeded,
    /// The backend answered with an error payload.
    Failed,
    /// The call itself failed (network, status, unparsable reply).
    TransportFailed,
}

#[derive(Debug, Default)]
pub struct SessionState {
    pub command_text: String,
    pub command_type: CommandType,
    pub output: String,
    pub error_output: String,
    executing: BusyFlag,
    history: Vec<CommandRecord>,
    // None: not browsing. Some(i) always indexes into `history`.
    history_cursor: Option<usize>,
    scroll_to_end: bool,
}

impl SessionState {
    #[cfg(test)]
    pub fn is_executing(&self) -> bool {
        self.executing.is_set()
    }

    /// Most recent first.
    pub fn history(&self) -> &[CommandRecord] {
        &self.history
    }

    pub fn history_cursor(&self) -> Option<usize> {
        self.history_cursor
    }

    /// Whether the output view should jump to its end; cleared by reading it.
    pub fn take_scroll_request(&mut self) -> bool {
        std::mem::take(&mut self.scroll_to_end)
    }

    fn replace_history(&mut self, history: Vec<CommandRecord>) {
        self.history = history;
        self.history_cursor = match self.history_cursor {
            Some(_) if self.history.is_empty() => None,
            Some(c) => Some(c.min(self.history.len() - 1)),
            None => None,
        };
    }
}

pub struct CommandSession {
    rpc: Arc<dyn RpcTransport>,
    notifier: Arc<dyn Notifier>,
    history_limit: usize,
    state: SessionState,
}

impl CommandSession {
    pub fn new(rpc: Arc<dyn RpcTransport>, notifier: Arc<dyn Notifier>, history_limit: usize) -> Self {
        Self {
            rpc,
            notifier,
            history_limit,
            state: SessionState::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    /// Fetch up to `limit` recent commands. Failures keep the current history and are
    /// only logged.
    pub async fn load_history(&mut self, limit: usize) -> bool {
        match api::get_history(self.rpc.as_ref(), limit).await {
            Ok(resp) if resp.success => {
                self.state.replace_history(resp.history);
                true
            }
            Ok(resp) => {
                tracing::warn!(
                    error = resp.error.as_deref().unwrap_or("unknown"),
                    message = resp.message.as_deref().unwrap_or(""),
                    "command history request refused"
                );
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to load command history");
                false
            }
        }
    }

    /// Run the current command text on the backend.
    pub async fn execute(&mut self) -> ExecuteOutcome {
        if self.state.command_text.trim().is_empty() {
            self.notifier.warning("Please enter a command");
            return ExecuteOutcome::Rejected;
        }

        let _busy = self.state.executing.acquire();
        self.state.output = EXECUTING_PLACEHOLDER.to_string();
        self.state.error_output.clear();

        let request = ExecuteRequest {
            command: self.state.command_text.clone(),
            command_type: self.state.command_type,
        };
        tracing::info!(command_type = request.command_type.as_str(), "executing command");

        let outcome = match api::execute(self.rpc.as_ref(), &request).await {
            Ok(result) => self.apply_result(result),
            Err(e) => {
                tracing::warn!(error = %e, "execute call failed");
                self.state.error_output = format!("Error: {e}");
                self.notifier.danger("Execution failed");
                ExecuteOutcome::TransportFailed
            }
        };

        // Newly executed commands become recallable right away.
        self.load_history(self.history_limit).await;
        self.state.scroll_to_end = true;
        outcome
    }

    fn apply_result(&mut self, result: ExecutionResult) -> ExecuteOutcome {
        if let Some(error) = result.error.as_deref() {
            self.state.error_output =
                format!("Error: {error}\n{}", result.message.as_deref().unwrap_or(""));
            self.state.output = result.output.unwrap_or_default();
            self.notifier.danger(error);
            return ExecuteOutcome::Failed;
        }

        self.state.output = result
            .output
            .filter(|o| !o.is_empty())
            .unwrap_or_else(|| NO_OUTPUT.to_string());
        self.state.error_output.clear();
        let message = match result.execution_time_seconds {
            Some(t) if t > 0.0 => format!("Command executed ({t}s)"),
            _ => "Command executed".to_string(),
        };
        self.notifier.success(&message);
        ExecuteOutcome::Succeeded
    }

    /// Shell-style history step. No wraparound: stepping newer past the most recent
    /// entry leaves history browsing and empties the input.
    pub fn navigate_history(&mut self, direction: Direction) {
        let state = &mut self.state;
        match direction {
            Direction::Older => {
                let next = state.history_cursor.map_or(0, |c| c + 1);
                if let Some(record) = state.history.get(next) {
                    state.command_text = record.command.clone();
                    state.history_cursor = Some(next);
                }
            }
            Direction::Newer => match state.history_cursor {
                Some(c) if c > 0 => {
                    state.history_cursor = Some(c - 1);
                    state.command_text = state.history[c - 1].command.clone();
                }
                _ => {
                    state.history_cursor = None;
                    state.command_text.clear();
                }
            },
        }
    }

    /// Load an arbitrary history entry into the input. The cursor is left alone.
    pub fn recall(&mut self, record: &CommandRecord) {
        self.state.command_text = record.command.clone();
        self.state.command_type = record.command_type;
    }

    pub fn clear(&mut self) {
        self.state.command_text.clear();
        self.state.output.clear();
        self.state.error_output.clear();
    }

    #[cfg(test)]
    fn executing_flag(&self) -> BusyFlag {
        self.state.executing.clone()
    }
}
