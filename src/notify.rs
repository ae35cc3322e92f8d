//! User-facing notifications (the toast equivalent for a terminal client).

use crossterm::style::{Color, Stylize};
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Info,
    Success,
    Warning,
    Danger,
}

impl Level {
    fn tag(self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Success => "ok",
            Level::Warning => "warn",
            Level::Danger => "error",
        }
    }

    fn color(self) -> Color {
        match self {
            Level::Info => Color::Cyan,
            Level::Success => Color::Green,
            Level::Warning => Color::Yellow,
            Level::Danger => Color::Red,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: Level,
    pub message: String,
    /// Sticky notifications stay until dismissed; they may carry follow-up instructions.
    pub sticky: bool,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);

    fn info(&self, message: &str) {
        self.notify(Notification {
            level: Level::Info,
            message: message.to_string(),
            sticky: false,
        });
    }

    fn success(&self, message: &str) {
        self.notify(Notification {
            level: Level::Success,
            message: message.to_string(),
            sticky: false,
        });
    }

    fn warning(&self, message: &str) {
        self.notify(Notification {
            level: Level::Warning,
            message: message.to_string(),
            sticky: false,
        });
    }

    fn danger(&self, message: &str) {
        self.notify(Notification {
            level: Level::Danger,
            message: message.to_string(),
            sticky: false,
        });
    }
}

/// Prints notifications to stderr with a coloured level tag.
#[derive(Debug, Default)]
pub struct ConsoleNotifier {
    pub color: bool,
}

impl Notifier for ConsoleNotifier {
    fn notify(&self, n: Notification) {
        let tag = format!("[{}]", n.level.tag());
        let tag = if self.color {
            tag.with(n.level.color()).bold().to_string()
        } else {
            tag
        };
        let stderr = std::io::stderr();
        let mut err = stderr.lock();
        let mut lines = n.message.lines();
        let first = lines.next().unwrap_or_default();
        let _ = writeln!(err, "{tag} {first}");
        for line in lines {
            let _ = writeln!(err, "      {line}");
        }
        // Sticky messages are set apart so they are not lost in later output.
        if n.sticky {
            let _ = writeln!(err);
        }
    }
}
