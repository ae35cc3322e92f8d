use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Kind of command the backend should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CommandType {
    #[default]
    Shell,
    /// Python console with the backend's ORM environment bound as `env`.
    #[value(alias = "orm")]
    Python,
    Package,
    #[serde(other)]
    #[value(skip)]
    Other,
}

impl CommandType {
    pub fn as_str(self) -> &'static str {
        match self {
            CommandType::Shell => "shell",
            CommandType::Python => "python",
            CommandType::Package => "package",
            CommandType::Other => "other",
        }
    }

    /// Next kind in the selector, used by the interactive shell's Tab key.
    pub fn cycle(self) -> Self {
        match self {
            CommandType::Shell => CommandType::Python,
            CommandType::Python => CommandType::Package,
            CommandType::Package | CommandType::Other => CommandType::Shell,
        }
    }
}

/// One executed command as recorded by the backend. Most recent first in listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub command: String,
    #[serde(default)]
    pub command_type: CommandType,
    #[serde(default, deserialize_with = "false_as_none")]
    pub state: Option<String>,
    #[serde(rename = "create_date", default)]
    pub timestamp: String,
}

impl CommandRecord {
    pub fn executed_at(&self) -> Option<OffsetDateTime> {
        parse_backend_timestamp(&self.timestamp)
    }
}

/// Outcome of one `execute` call. The presence of `error` marks a failed run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, deserialize_with = "false_as_none")]
    pub output: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub message: Option<String>,
    #[serde(rename = "execution_time", default)]
    pub execution_time_seconds: Option<f64>,
    #[serde(default)]
    pub return_code: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecuteRequest {
    pub command: String,
    pub command_type: CommandType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub history: Vec<CommandRecord>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub message: Option<String>,
}

/// An uploaded addon as recorded by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub name: Option<String>,
    pub filename: String,
    #[serde(rename = "file_size", default)]
    pub size_bytes: u64,
    #[serde(rename = "state", default)]
    pub status: String,
    #[serde(default, deserialize_with = "false_as_none")]
    pub upload_path: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub error_message: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub user: Option<String>,
    #[serde(rename = "create_date", default)]
    pub timestamp: String,
}

impl UploadRecord {
    pub fn uploaded_at(&self) -> Option<OffsetDateTime> {
        parse_backend_timestamp(&self.timestamp)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadHistoryResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub uploads: Vec<UploadRecord>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub message: Option<String>,
}

/// Body returned by the addon upload endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "false_as_none")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub module_name: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub module_path: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

/// Credentials sent with a restart attempt. Unset fields are omitted from the request.
#[derive(Clone, Default, Serialize)]
pub struct RestartRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sudo_password: Option<String>,
}

impl std::fmt::Debug for RestartRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestartRequest")
            .field("username", &self.username)
            .field("sudo_password", &self.sudo_password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestartResponse {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub message: Option<String>,
    #[serde(default)]
    pub is_docker: Option<bool>,
    #[serde(default)]
    pub need_password: Option<bool>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub output: Option<String>,
}

/// Error kind the backend uses when passwordless sudo was not available.
pub const SUDO_PASSWORD_REQUIRED: &str = "Sudo Password Required";

impl RestartResponse {
    /// Whether the backend asked for a credential.
    ///
    /// The backend signals this two ways: the `need_password` flag, or an error whose
    /// kind is exactly [`SUDO_PASSWORD_REQUIRED`]. Both are honoured here and nowhere else.
    pub fn requires_password(&self) -> bool {
        self.need_password.unwrap_or(false) || self.error.as_deref() == Some(SUDO_PASSWORD_REQUIRED)
    }

    pub fn is_containerized(&self) -> bool {
        self.is_docker.unwrap_or(false)
    }

    /// `"<error>: <message>"`, the form used for every application-level failure.
    pub fn error_summary(&self) -> Option<String> {
        self.error
            .as_deref()
            .map(|e| join_error(e, self.message.as_deref()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OsInfo {
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub release: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub machine: String,
    #[serde(default)]
    pub processor: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// System and runtime details reported by the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvInfo {
    #[serde(default)]
    pub python_version: String,
    #[serde(default)]
    pub python_executable: String,
    #[serde(default)]
    pub odoo_version: String,
    #[serde(default)]
    pub os_info: OsInfo,
    #[serde(default)]
    pub packages: Vec<PackageInfo>,
    #[serde(default)]
    pub total_packages: usize,
    #[serde(default)]
    pub environment_vars: BTreeMap<String, String>,
    #[serde(default)]
    pub terminal_config: serde_json::Value,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvInfoResponse {
    #[serde(default)]
    pub info: Option<EnvInfo>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub error: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClearLogsResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, deserialize_with = "false_as_none")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "false_as_none")]
    pub error: Option<String>,
}

pub(crate) fn join_error(error: &str, message: Option<&str>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!("{error}: {m}"),
        _ => error.to_string(),
    }
}

/// Parse `YYYY-MM-DD HH:MM:SS` as written by the backend (always UTC).
pub fn parse_backend_timestamp(s: &str) -> Option<OffsetDateTime> {
    let fmt = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    PrimitiveDateTime::parse(s.trim(), &fmt)
        .ok()
        .map(PrimitiveDateTime::assume_utc)
}

/// The backend writes unset text fields as `false`; treat those as absent.
fn false_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum TextOrFlag {
        Text(String),
        Flag(bool),
    }

    Ok(match Option::<TextOrFlag>::deserialize(deserializer)? {
        Some(TextOrFlag::Text(s)) => Some(s),
        Some(TextOrFlag::Flag(flag)) => {
            tracing::trace!(flag, "text field sent as a flag");
            None
        }
        None => None,
    })
}
