use serde::Serialize;

/// Every error surfaced to the UI layer. Payloads are plain strings so the
/// error can be cloned into every caller sharing one pending request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    #[error("Not in project: {0}")]
    NotInProject(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Extraction job failed: {0}")]
    Job(String),

    #[error("Operation already in progress for {0}")]
    Busy(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Unexpected response: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl AppError {
    pub fn capture(self) -> Self {
        tracing::error!(error = %self, "operation failed");
        self
    }

    /// Message to show the user. Server errors show the backend's own text.
    pub fn user_message(&self) -> String {
        match self {
            Self::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode(err.to_string());
        }
        Self::Transport(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
