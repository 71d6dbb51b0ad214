use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("No files selected")]
    NoFiles,

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Invalid file: {0}")]
    InvalidFile(String),

    #[error("Server error: status code {status_code}, message: {message}")]
    Server {
        status_code: u16,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("An import is already in progress")]
    Busy,

    #[error("Import was reset before the upload finished")]
    Abandoned,

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Channel not connected")]
    NotConnected,

    #[error("Manager shutdown")]
    ManagerShutdown,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ImportError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status_code,
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Text for a transient user notification. Server rejections show the
    /// backend's own message rather than the status line.
    pub fn user_message(&self) -> String {
        match self {
            Self::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Error alias
pub type Result<T, E = ImportError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_error_user_message_is_backend_text() {
        let err = ImportError::server_error(422, "Row 3: phone number missing");
        assert_eq!(err.user_message(), "Row 3: phone number missing");
        assert!(err.to_string().contains("422"));
    }

    #[test]
    fn test_other_errors_use_display() {
        assert_eq!(ImportError::NoFiles.user_message(), "No files selected");
        assert_eq!(
            ImportError::UnsupportedFileType("leads.pdf".to_string()).user_message(),
            "Unsupported file type: leads.pdf"
        );
    }
}
