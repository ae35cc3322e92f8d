//! Out-of-band interaction with the operator: confirmations, secrets and the
//! post-restart reconnect.

use crate::api;
use crate::notify::Notifier;
use crate::transport::RpcTransport;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{BufRead, IsTerminal, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Modal questions put to the operator. Both calls block until answered.
pub trait Prompter: Send + Sync {
    fn confirm(&self, question: &str) -> bool;
    /// Ask for a secret; `None` when the operator gave nothing.
    fn prompt_secret(&self, prompt: &str) -> Option<String>;
}

/// Re-establishes the client's view of the backend after the service restarted.
pub trait ReloadScheduler: Send + Sync {
    fn schedule_reload(&self, after: Duration);
}

pub struct ConsolePrompter {
    pub assume_yes: bool,
}

impl Prompter for ConsolePrompter {
    fn confirm(&self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{question} [y/N] ");
        let _ = std::io::stderr().flush();
        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(0) => {
                eprintln!();
                eprintln!("No answer on stdin; treating it as no (pass --yes to confirm non-interactively)");
                return false;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "could not read confirmation");
                return false;
            }
        }
        matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }

    fn prompt_secret(&self, prompt: &str) -> Option<String> {
        eprint!("{prompt} ");
        let _ = std::io::stderr().flush();
        let secret = if std::io::stdin().is_terminal() {
            read_hidden()
        } else {
            let mut line = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut line)
                .map(|_| line.trim_end_matches(['\r', '\n']).to_string())
        };
        match secret {
            Ok(s) if !s.is_empty() => Some(s),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read secret");
                None
            }
        }
    }
}

/// Read a line from the terminal without echoing it. Esc or Ctrl+C abandon the input.
fn read_hidden() -> std::io::Result<String> {
    enable_raw_mode()?;
    let mut secret = String::new();
    let res = loop {
        match event::read() {
            Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => match (k.modifiers, k.code) {
                (_, KeyCode::Enter) => break Ok(()),
                (_, KeyCode::Esc) | (KeyModifiers::CONTROL, KeyCode::Char('c')) => {
                    secret.clear();
                    break Ok(());
                }
                (_, KeyCode::Backspace) => {
                    secret.pop();
                }
                (_, KeyCode::Char(c)) => secret.push(c),
                _ => {}
            },
            Ok(_) => {}
            Err(e) => break Err(e),
        }
    };
    disable_raw_mode()?;
    eprintln!();
    res.map(|()| secret)
}

const RECONNECT_ATTEMPTS: u32 = 20;
const RECONNECT_INTERVAL: Duration = Duration::from_secs(2);

/// Terminal stand-in for a page reload: wait, then poll until the backend answers again.
pub struct ReconnectWatcher {
    rpc: Arc<dyn RpcTransport>,
    notifier: Arc<dyn Notifier>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectWatcher {
    pub fn new(rpc: Arc<dyn RpcTransport>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            rpc,
            notifier,
            handle: Mutex::new(None),
        }
    }

    /// Wait for a scheduled reconnect, if any, to finish.
    pub async fn wait(&self) {
        let handle = self.handle.lock().ok().and_then(|mut slot| slot.take());
        if let Some(h) = handle {
            let _ = h.await;
        }
    }
}

impl ReloadScheduler for ReconnectWatcher {
    fn schedule_reload(&self, after: Duration) {
        let rpc = self.rpc.clone();
        let notifier = self.notifier.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            for attempt in 1..=RECONNECT_ATTEMPTS {
                match api::get_env_info(rpc.as_ref()).await {
                    Ok(_) => {
                        notifier.success("Reconnected to the restarted backend");
                        return;
                    }
                    Err(e) => tracing::debug!(attempt, error = %e, "backend not reachable yet"),
                }
                tokio::time::sleep(RECONNECT_INTERVAL).await;
            }
            notifier.warning("Backend did not come back after the restart");
        });
        if let Ok(mut slot) = self.handle.lock() {
            if let Some(previous) = slot.replace(handle) {
                previous.abort();
            }
        }
    }
}
