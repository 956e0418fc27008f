//! Error types for Crosspost

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CrosspostError>;

/// Result of a single vendor API call
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

#[derive(Error, Debug)]
pub enum CrosspostError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl CrosspostError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CrosspostError::Validation(_) => 3,
            CrosspostError::Platform(PlatformError::NotConnected(_))
            | CrosspostError::Platform(PlatformError::TokenExpired(_)) => 2,
            CrosspostError::Platform(_) => 1,
            CrosspostError::Config(_) => 1,
            CrosspostError::Database(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Per-platform failure taxonomy
///
/// Adapters convert every one of these into a failed outcome entry; they only
/// surface as errors from `resolve_handle`, `connect` and the vendor-level
/// `Platform` calls.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Token expired: {0}")]
    TokenExpired(String),

    #[error("Media download failed: {0}")]
    MediaDownload(String),

    #[error("Media upload failed: {0}")]
    MediaUpload(String),

    #[error("Posting failed: {0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Stable machine-readable name for the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PlatformError::NotConnected(_) => "not_connected",
            PlatformError::TokenExpired(_) => "token_expired",
            PlatformError::MediaDownload(_) => "media_download_failed",
            PlatformError::MediaUpload(_) => "media_upload_failed",
            PlatformError::Posting(_) => "post_failed",
            PlatformError::Network(_) => "network",
            PlatformError::RateLimit(_) => "rate_limited",
            PlatformError::Unsupported(_) => "unsupported",
            PlatformError::Internal(_) => "internal",
        }
    }
}

impl CrosspostError {
    /// Borrow the platform error, if this is one
    pub fn as_platform(&self) -> Option<&PlatformError> {
        match self {
            CrosspostError::Platform(e) => Some(e),
            _ => None,
        }
    }

    /// Collapse into the per-platform taxonomy
    ///
    /// Storage and configuration failures become `Internal`.
    pub fn into_platform(self) -> PlatformError {
        match self {
            CrosspostError::Platform(e) => e,
            other => PlatformError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_validation() {
        let error = CrosspostError::Validation("no targets".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_not_connected_and_expired() {
        let not_connected =
            CrosspostError::Platform(PlatformError::NotConnected("twitter".to_string()));
        let expired = CrosspostError::Platform(PlatformError::TokenExpired("code 190".to_string()));
        assert_eq!(not_connected.exit_code(), 2);
        assert_eq!(expired.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_platform_errors() {
        for error in [
            PlatformError::MediaDownload("x".to_string()),
            PlatformError::MediaUpload("x".to_string()),
            PlatformError::Posting("x".to_string()),
            PlatformError::Network("x".to_string()),
            PlatformError::RateLimit("x".to_string()),
            PlatformError::Unsupported("x".to_string()),
            PlatformError::Internal("x".to_string()),
        ] {
            assert_eq!(CrosspostError::Platform(error).exit_code(), 1);
        }
    }

    #[test]
    fn test_error_message_formatting() {
        let error = CrosspostError::Platform(PlatformError::TokenExpired(
            "Facebook rejected the page token (code 190)".to_string(),
        ));
        assert_eq!(
            error.to_string(),
            "Platform error: Token expired: Facebook rejected the page token (code 190)"
        );

        let error = CrosspostError::Validation("instagram requires media".to_string());
        assert_eq!(error.to_string(), "Validation failed: instagram requires media");
    }

    #[test]
    fn test_config_error_formatting() {
        let error = CrosspostError::Config(ConfigError::InvalidValue {
            field: "server.bind".to_string(),
            reason: "not a socket address".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "Configuration error: Invalid value for server.bind: not a socket address"
        );
    }

    #[test]
    fn test_platform_error_kinds_are_distinct() {
        let kinds = [
            PlatformError::NotConnected(String::new()).kind(),
            PlatformError::TokenExpired(String::new()).kind(),
            PlatformError::MediaDownload(String::new()).kind(),
            PlatformError::MediaUpload(String::new()).kind(),
            PlatformError::Posting(String::new()).kind(),
            PlatformError::Network(String::new()).kind(),
            PlatformError::RateLimit(String::new()).kind(),
            PlatformError::Unsupported(String::new()).kind(),
            PlatformError::Internal(String::new()).kind(),
        ];
        let unique: std::collections::HashSet<_> = kinds.iter().collect();
        assert_eq!(unique.len(), kinds.len());
    }

    #[test]
    fn test_into_platform() {
        let error = CrosspostError::Validation("bad".to_string());
        assert_eq!(
            error.into_platform(),
            PlatformError::Internal("Validation failed: bad".to_string())
        );

        let error: CrosspostError = PlatformError::RateLimit("slow down".to_string()).into();
        assert_eq!(
            error.into_platform(),
            PlatformError::RateLimit("slow down".to_string())
        );
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let error: CrosspostError = PlatformError::Posting("boom".to_string()).into();
        assert_eq!(
            error.as_platform(),
            Some(&PlatformError::Posting("boom".to_string()))
        );
    }
}
