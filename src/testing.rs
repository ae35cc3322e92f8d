//! In-memory collaborators for controller tests.

use crate::error::TransportError;
use crate::notify::{Level, Notification, Notifier};
use crate::operator::{Prompter, ReloadScheduler};
use crate::transport::{LocalFile, ProgressSink, RawReply, RpcTransport, UploadTransport};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Handler = Box<dyn Fn(&Value) -> Result<Value, TransportError> + Send + Sync>;

/// What a scripted upload does: report progress ticks, then finish with `outcome`.
pub(crate) struct UploadScript {
    pub ticks: Vec<(u64, u64)>,
    pub outcome: Result<RawReply, TransportError>,
}

/// Route-keyed fake backend that records every call it receives.
#[derive(Default)]
pub(crate) struct MockTransport {
    handlers: Mutex<HashMap<String, Handler>>,
    calls: Mutex<Vec<(String, Value)>>,
    upload: Mutex<Option<UploadScript>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        self,
        route: &str,
        handler: impl Fn(&Value) -> Result<Value, TransportError> + Send + Sync + 'static,
    ) -> Self {
        self.handlers
            .lock()
            .unwrap()
            .insert(route.to_string(), Box::new(handler));
        self
    }

    pub fn reply(self, route: &str, value: Value) -> Self {
        self.on(route, move |_| Ok(value.clone()))
    }

    pub fn upload_script(self, script: UploadScript) -> Self {
        *self.upload.lock().unwrap() = Some(script);
        self
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, route: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|(r, _)| r == route)
            .map(|(_, v)| v)
            .collect()
    }
}

#[async_trait]
impl RpcTransport for MockTransport {
    async fn call(&self, route: &str, params: Value) -> Result<Value, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((route.to_string(), params.clone()));
        let handlers = self.handlers.lock().unwrap();
        match handlers.get(route) {
            Some(h) => h(&params),
            None => Err(TransportError::Network(format!("no handler for {route}"))),
        }
    }
}

#[async_trait]
impl UploadTransport for MockTransport {
    async fn send_file(
        &self,
        file: &LocalFile,
        progress: Arc<dyn ProgressSink>,
        cancel: Arc<AtomicBool>,
    ) -> Result<RawReply, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push(("upload_addon".to_string(), json!({ "filename": file.name })));
        let script = self
            .upload
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| TransportError::Network("no upload scripted".into()))?;
        for (sent, total) in script.ticks {
            if cancel.load(Ordering::Relaxed) {
                return Err(TransportError::Aborted);
            }
            progress.report(sent, total);
        }
        script.outcome
    }
}

#[derive(Default)]
pub(crate) struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }

    pub fn levels(&self) -> Vec<Level> {
        self.all().into_iter().map(|n| n.level).collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn last(&self) -> Option<Notification> {
        self.all().pop()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

/// Answers confirmations with a fixed value and secrets from a queue.
pub(crate) struct ScriptedPrompter {
    pub confirm: bool,
    secrets: Mutex<VecDeque<Option<String>>>,
    pub questions: Mutex<Vec<String>>,
    /// Notification count observed at each secret prompt, when a notifier is attached.
    watch: Option<Arc<RecordingNotifier>>,
    pub notified_before_prompt: Mutex<Vec<usize>>,
}

impl ScriptedPrompter {
    pub fn new(confirm: bool, secrets: Vec<Option<&str>>) -> Self {
        Self {
            confirm,
            secrets: Mutex::new(secrets.into_iter().map(|s| s.map(String::from)).collect()),
            questions: Mutex::new(Vec::new()),
            watch: None,
            notified_before_prompt: Mutex::new(Vec::new()),
        }
    }

    pub fn watching(mut self, notifier: Arc<RecordingNotifier>) -> Self {
        self.watch = Some(notifier);
        self
    }
}

impl Prompter for ScriptedPrompter {
    fn confirm(&self, question: &str) -> bool {
        self.questions.lock().unwrap().push(question.to_string());
        self.confirm
    }

    fn prompt_secret(&self, prompt: &str) -> Option<String> {
        self.questions.lock().unwrap().push(prompt.to_string());
        if let Some(n) = &self.watch {
            self.notified_before_prompt.lock().unwrap().push(n.len());
        }
        self.secrets.lock().unwrap().pop_front().flatten()
    }
}

#[derive(Default)]
pub(crate) struct RecordingReloader {
    pub scheduled: Mutex<Vec<Duration>>,
}

impl ReloadScheduler for RecordingReloader {
    fn schedule_reload(&self, after: Duration) {
        self.scheduled.lock().unwrap().push(after);
    }
}

pub(crate) fn ok_reply(body: Value) -> Result<RawReply, TransportError> {
    Ok(RawReply {
        status: 200,
        body: body.to_string().into(),
    })
}
