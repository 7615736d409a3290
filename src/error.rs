//! Application error types with MCP protocol conversion.

use rmcp::model::ErrorCode;
use thiserror::Error;

/// Application-level errors for Skyport.
#[derive(Error, Debug)]
pub enum AppError {
    // Session errors
    #[error(
        "No workspace set. Prompt the user to select a workspace. Do NOT try to select a \
         workspace for them, as it may be destructive"
    )]
    NoWorkspaceSelected,

    #[error("Session store unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Session store operation timed out after {0} attempts")]
    Timeout(u32),

    #[error("Request cancelled")]
    Cancelled,

    // Credential errors
    #[error("Not authenticated; either set SKYPORT_API_KEY or use the `login` tool")]
    AuthenticationRequired,

    // Persisted config errors
    #[error("Config file unavailable: {0}")]
    PersistenceUnavailable(#[from] std::io::Error),

    #[error("Config file is malformed: {0}")]
    MalformedConfig(#[from] toml::de::Error),

    #[error("Config file could not be encoded: {0}")]
    EncodeConfig(#[from] toml::ser::Error),

    // Platform API errors
    #[error("Platform API error: {0}")]
    Upstream(String),

    #[error("Validation error: {0}")]
    Validation(String),

    // Server config errors
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Upstream(err.to_string())
    }
}

impl From<AppError> for rmcp::model::ErrorData {
    fn from(err: AppError) -> Self {
        let (code, app_code) = match &err {
            AppError::NoWorkspaceSelected => (ErrorCode::INVALID_REQUEST, "NO_WORKSPACE_SELECTED"),
            AppError::AuthenticationRequired => {
                (ErrorCode::INVALID_REQUEST, "AUTHENTICATION_REQUIRED")
            }
            AppError::BackendUnavailable(_) => (ErrorCode::INTERNAL_ERROR, "BACKEND_UNAVAILABLE"),
            AppError::Timeout(_) => (ErrorCode::INTERNAL_ERROR, "TIMEOUT"),
            AppError::Cancelled => (ErrorCode::INTERNAL_ERROR, "CANCELLED"),
            AppError::PersistenceUnavailable(_) => {
                (ErrorCode::INTERNAL_ERROR, "PERSISTENCE_UNAVAILABLE")
            }
            AppError::MalformedConfig(_) => (ErrorCode::INTERNAL_ERROR, "MALFORMED_CONFIG"),
            AppError::EncodeConfig(_) => (ErrorCode::INTERNAL_ERROR, "MALFORMED_CONFIG"),
            AppError::Upstream(_) => (ErrorCode::INTERNAL_ERROR, "UPSTREAM_ERROR"),
            AppError::Validation(_) => (ErrorCode::INVALID_PARAMS, "VALIDATION_ERROR"),
            AppError::Config(_) => (ErrorCode::INTERNAL_ERROR, "CONFIG_ERROR"),
        };

        rmcp::model::ErrorData::new(code, format!("[{}] {}", app_code, err), None)
    }
}
