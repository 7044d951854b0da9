//! Error types for Socialcast

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SocialcastError>;

#[derive(Error, Debug)]
pub enum SocialcastError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl SocialcastError {
    /// Classify this error for health and backoff bookkeeping
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            SocialcastError::Platform(platform_error) => platform_error.failure_kind(),
            other => FailureKind::from_message(&other.to_string()),
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

    #[error("Invalid value: {0}")]
    Invalid(String),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Publishing failed: {0}")]
    Publishing(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

impl PlatformError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            PlatformError::Authentication(_) => FailureKind::Auth,
            PlatformError::RateLimit(_) => FailureKind::Throttled,
            PlatformError::Validation(msg)
            | PlatformError::Publishing(msg)
            | PlatformError::Network(msg)
            | PlatformError::NotImplemented(msg)
            | PlatformError::UnsupportedPlatform(msg) => FailureKind::from_message(msg),
        }
    }
}

/// Coarse classification of a failed platform call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 401/403: credentials must be re-authorized
    Auth,
    /// 429: the platform asked us to slow down
    Throttled,
    /// Anything else (5xx, network, validation)
    Generic,
}

impl FailureKind {
    /// Classify a free-text failure by the HTTP status signal it carries
    ///
    /// Codes only count as whole numbers: "4030ms" or "id 14290" carry no signal.
    pub fn from_message(message: &str) -> Self {
        let codes: Vec<&str> = message
            .split(|c: char| !c.is_ascii_digit())
            .filter(|run| !run.is_empty())
            .collect();

        if codes.iter().any(|code| *code == "401" || *code == "403") {
            FailureKind::Auth
        } else if codes.contains(&"429") {
            FailureKind::Throttled
        } else {
            FailureKind::Generic
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_formatting_invalid_input() {
        let error = SocialcastError::InvalidInput("Post not found: abc".to_string());
        assert_eq!(format!("{}", error), "Invalid input: Post not found: abc");
    }

    #[test]
    fn test_error_message_formatting_authentication() {
        let error = SocialcastError::Platform(PlatformError::Authentication(
            "token revoked".to_string(),
        ));
        assert_eq!(
            format!("{}", error),
            "Platform error: Authentication failed: token revoked"
        );
    }

    #[test]
    fn test_error_message_formatting_config() {
        let error = SocialcastError::Config(ConfigError::MissingField("database.path".to_string()));
        assert_eq!(
            format!("{}", error),
            "Configuration error: Missing required field: database.path"
        );
    }

    #[test]
    fn test_error_conversion_from_platform_error() {
        let error: SocialcastError = PlatformError::Network("reset".to_string()).into();
        assert!(matches!(error, SocialcastError::Platform(PlatformError::Network(_))));
    }

    #[test]
    fn test_error_conversion_from_db_error() {
        let db_error = DbError::IoError(std::io::Error::new(std::io::ErrorKind::NotFound, "test"));
        let error: SocialcastError = db_error.into();
        assert!(matches!(error, SocialcastError::Database(_)));
    }

    #[test]
    fn test_failure_kind_from_status_signals() {
        assert_eq!(FailureKind::from_message("HTTP 401 Unauthorized"), FailureKind::Auth);
        assert_eq!(FailureKind::from_message("403 forbidden"), FailureKind::Auth);
        assert_eq!(FailureKind::from_message("429 Too Many Requests"), FailureKind::Throttled);
        assert_eq!(FailureKind::from_message("status=401; retry"), FailureKind::Auth);
        assert_eq!(FailureKind::from_message("(429)"), FailureKind::Throttled);
    }

    #[test]
    fn test_failure_kind_ignores_codes_inside_larger_numbers() {
        assert_eq!(
            FailureKind::from_message("upload timed out after 4030ms"),
            FailureKind::Generic
        );
        assert_eq!(FailureKind::from_message("media id 14290 rejected"), FailureKind::Generic);
        assert_eq!(FailureKind::from_message("chunk 1401 of 2000"), FailureKind::Generic);
        assert_eq!(FailureKind::from_message("4291 bytes over limit"), FailureKind::Generic);
        assert_eq!(FailureKind::from_message("500 server error"), FailureKind::Generic);
        assert_eq!(FailureKind::from_message(""), FailureKind::Generic);
    }

    #[test]
    fn test_failure_kind_structured_variants() {
        assert_eq!(
            PlatformError::Authentication("expired".to_string()).failure_kind(),
            FailureKind::Auth
        );
        assert_eq!(
            PlatformError::RateLimit("slow down".to_string()).failure_kind(),
            FailureKind::Throttled
        );
        assert_eq!(
            PlatformError::Network("connection refused".to_string()).failure_kind(),
            FailureKind::Generic
        );
        // Free-text variants still honor embedded status codes
        assert_eq!(
            PlatformError::Publishing("upstream said 429".to_string()).failure_kind(),
            FailureKind::Throttled
        );
    }

    #[test]
    fn test_failure_kind_through_top_level_error() {
        let error: SocialcastError = PlatformError::Authentication("bad token".to_string()).into();
        assert_eq!(error.failure_kind(), FailureKind::Auth);

        let error = SocialcastError::InvalidInput("nothing to see".to_string());
        assert_eq!(error.failure_kind(), FailureKind::Generic);
    }

    #[test]
    fn test_platform_error_clone() {
        let original = PlatformError::Network("Connection failed".to_string());
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }
}
