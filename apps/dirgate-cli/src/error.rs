//! CLI error types and exit codes

use dirgate_directory::config::ConfigError;
use dirgate_directory::error::DirectoryError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Success
/// - 1: General error
/// - 3: Directory unreachable or failed
/// - 4: Validation error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("I/O error: {0}")]
    Io(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Validation(_) => 4,
            CliError::Config(_) | CliError::Io(_) => 1,
            CliError::Directory(e) if e.is_client_error() => 4,
            CliError::Directory(_) => 3,
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();

        if use_color {
            eprintln!("\x1b[31mError:\x1b[0m {self}");
        } else {
            eprintln!("Error: {self}");
        }

        if let Some(suggestion) = self.suggestion() {
            if use_color {
                eprintln!("\n\x1b[33mSuggestion:\x1b[0m {suggestion}");
            } else {
                eprintln!("\nSuggestion: {suggestion}");
            }
        }
    }

    fn suggestion(&self) -> Option<&'static str> {
        match self {
            CliError::Config(_) => Some("Set DIRGATE_DOMAINS and the DIRGATE_<KEY>_* variables, or add them to .env."),
            CliError::Directory(DirectoryError::DomainNotFound { .. }) => {
                Some("Check the domain key against DIRGATE_DOMAINS.")
            }
            CliError::Directory(DirectoryError::UnknownAttribute { .. }) => {
                Some("Attribute names must exist in the directory schema.")
            }
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        CliError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        CliError::Validation(format!("invalid JSON: {err}"))
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CliError::Validation("x".into()).exit_code(), 4);
        assert_eq!(CliError::Config("x".into()).exit_code(), 1);
        assert_eq!(
            CliError::from(DirectoryError::malformed("bad")).exit_code(),
            4
        );
        assert_eq!(
            CliError::from(DirectoryError::transport("refused")).exit_code(),
            3
        );
    }

    #[test]
    fn test_from_json_error() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let cli: CliError = err.into();
        assert!(matches!(cli, CliError::Validation(_)));
    }

    #[test]
    fn test_suggestions() {
        let err = CliError::from(DirectoryError::DomainNotFound {
            domain: "apac".into(),
        });
        assert!(err.suggestion().is_some());
        assert!(CliError::Io("disk".into()).suggestion().is_none());
    }
}
