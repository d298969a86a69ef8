use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the script supervisor
#[derive(Debug, Error)]
pub enum WardenError {
    // Scripts file errors
    #[error("Scripts file not found: {}", .0.display())]
    MissingScriptsFile(PathBuf),

    #[error("Invalid scripts file: {0}")]
    InvalidScriptsFile(String),

    #[error("Invalid script entry: {0}")]
    InvalidEntry(String),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    // Record validation errors
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid operating directory: {0}")]
    InvalidDirectory(String),

    #[error("Invalid script path: {0}")]
    InvalidScriptPath(String),

    #[error("Invalid executing path: {0}")]
    InvalidExecutingPath(String),

    #[error("Invalid save path: {0}")]
    InvalidSavePath(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("Invalid last execution date: {0}")]
    InvalidLastTime(String),

    // Process errors
    #[error("Invalid process ID: {0}")]
    InvalidPid(String),

    #[error("Process error: {0}")]
    ProcessError(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid configuration file: {0}")]
    InvalidConfig(String),

    #[error("Notification failed: {0}")]
    NotificationError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WardenError {
    /// Whether the error makes the whole scripts document unusable
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            WardenError::MissingScriptsFile(_) | WardenError::InvalidScriptsFile(_)
        )
    }
}

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_classified() {
        assert!(WardenError::MissingScriptsFile(PathBuf::from("x.json")).is_store_error());
        assert!(WardenError::InvalidScriptsFile("bad".to_string()).is_store_error());
        assert!(!WardenError::InvalidPid("-1".to_string()).is_store_error());
    }

    #[test]
    fn test_missing_scripts_file_message() {
        let err = WardenError::MissingScriptsFile(PathBuf::from("/tmp/none.json"));
        assert_eq!(err.to_string(), "Scripts file not found: /tmp/none.json");
    }
}
