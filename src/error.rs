use thiserror::Error;

pub type Result<T> = std::result::Result<T, TransportError>;

/// Failures below the application layer: the request never produced a usable reply.
///
/// Application errors (a well-formed reply carrying an `error` field) are not represented
/// here; they travel inside the typed responses in [`crate::model`].
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request failed with status {0}")]
    Status(u16),

    #[error("Invalid response from server: {0}")]
    Decode(String),

    #[error("Server error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Upload cancelled")]
    Aborted,

    #[error("Could not read `{path}`: {original}")]
    Io {
        path: String,
        original: std::io::Error,
    },
}

impl TransportError {
    pub fn io_error(path: impl Into<String>, original: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            original,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Decode(e.to_string());
        }
        if let Some(status) = e.status() {
            return Self::Status(status.as_u16());
        }
        Self::Network(e.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
